pub mod constants;
pub mod error;
pub mod model;
pub mod segment;
pub mod signer;
pub mod types;

pub use error::{
    AuthError, BalanceChainError, ConfigError, IntegrityError, Severity, StoreError,
    TransportError, ValidationError,
};
pub use model::{
    CapsRecord, Capsule, CapsuleStatus, Category, Direction, MessageView, NonceLogEntry,
    ReadOnlyLatch, ScoreProjection, TvmBalance,
};
pub use segment::{
    LivenessAssertion, LivenessKind, LivenessProof, LivenessVerifier, Segment, SegmentType,
    SignableSegment,
};
pub use signer::Signer;
pub use types::{AuthorRecord, Hid, NonceHex, Seq, SegmentRef, TimestampMs};
