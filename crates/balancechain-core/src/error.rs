use thiserror::Error;

/// One of the nine validator rule failures, plus the two structural kinds
/// the commit boundary also has to report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rule 1 (counter relationship): {0}")]
    CounterOrder(&'static str),
    #[error("rule 1 (counter relationship): missing referenced segment")]
    MissingRefs,
    #[error("rule 2 (caps): daily cap exceeded")]
    DailyCapExceeded,
    #[error("rule 2 (caps): monthly cap exceeded")]
    MonthlyCapExceeded,
    #[error("rule 2 (caps): yearly cap exceeded")]
    YearlyCapExceeded,
    #[error("rule 3 (rate limit): segments from the same author too close together")]
    RateLimit,
    #[error("rule 4 (liveness): proof failed verification")]
    LivenessFailed,
    #[error("rule 5 (owner transition): previous_owner missing for a transfer")]
    MissingPreviousOwner,
    #[error("rule 5 (owner transition): previous_owner equals current_owner")]
    SameOwner,
    #[error("rule 6 (history hash): prev_hash does not match chain head")]
    BadPrevHash,
    #[error("rule 7 (sequence): seq does not match chain_len + 1")]
    BadSeq,
    #[error("rule 8 (signature): signature does not verify")]
    BadSignature,
    #[error("rule 9 (nonce): nonce already present in the nonce log")]
    ReplayNonce,
    #[error("segment failed structural validation: {0}")]
    InvalidStructure(&'static str),
    #[error("segment timestamp drifted outside tolerance")]
    TimestampDrift,
}

impl ValidationError {
    /// The 1-based rule number this failure corresponds to, where applicable.
    pub fn rule_number(&self) -> Option<u8> {
        match self {
            ValidationError::CounterOrder(_) | ValidationError::MissingRefs => Some(1),
            ValidationError::DailyCapExceeded
            | ValidationError::MonthlyCapExceeded
            | ValidationError::YearlyCapExceeded => Some(2),
            ValidationError::RateLimit => Some(3),
            ValidationError::LivenessFailed => Some(4),
            ValidationError::MissingPreviousOwner | ValidationError::SameOwner => Some(5),
            ValidationError::BadPrevHash => Some(6),
            ValidationError::BadSeq => Some(7),
            ValidationError::BadSignature => Some(8),
            ValidationError::ReplayNonce => Some(9),
            ValidationError::InvalidStructure(_) | ValidationError::TimestampDrift => None,
        }
    }

    /// The short reason code used in `{ok:false, reason}` results.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationError::CounterOrder(_) => "counter_order",
            ValidationError::MissingRefs => "missing_refs",
            ValidationError::DailyCapExceeded => "daily_cap_exceeded",
            ValidationError::MonthlyCapExceeded => "monthly_cap_exceeded",
            ValidationError::YearlyCapExceeded => "yearly_cap_exceeded",
            ValidationError::RateLimit => "rate_limit",
            ValidationError::LivenessFailed => "liveness_failed",
            ValidationError::MissingPreviousOwner => "missing_previous_owner",
            ValidationError::SameOwner => "same_owner",
            ValidationError::BadPrevHash => "bad_prev_hash",
            ValidationError::BadSeq => "bad_seq",
            ValidationError::BadSignature => "bad_signature",
            ValidationError::ReplayNonce => "replay_nonce",
            ValidationError::InvalidStructure(_) => "invalid_structure",
            ValidationError::TimestampDrift => "timestamp_drift",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("store I/O failure: {0}")]
    Io(String),
    #[error("schema mismatch: expected collection `{0}`")]
    SchemaMismatch(String),
    #[error("store is locked for a version change")]
    VersionChangeLockout,
    #[error("serialization failure: {0}")]
    Codec(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("segment missing at seq={0}")]
    MissingSegment(u64),
    #[error("seq mismatch at position {expected}: found {found}")]
    SeqMismatch { expected: u64, found: u64 },
    #[error("hash chain broken at seq={0}")]
    HashChainBroken(u64),
    #[error("signature invalid at seq={0}")]
    InvalidSignature(u64),
    #[error("signature verification errored at seq={seq}: {message}")]
    SignatureError { seq: u64, message: String },
    #[error("hash computation failed at seq={seq}: {message}")]
    HashComputeError { seq: u64, message: String },
    #[error("computed head does not match stored head")]
    HeadMismatch,
}

impl IntegrityError {
    pub fn code(&self) -> &'static str {
        match self {
            IntegrityError::MissingSegment(_) => "MISSING_SEGMENT",
            IntegrityError::SeqMismatch { .. } => "SEQ_MISMATCH",
            IntegrityError::HashChainBroken(_) => "HASH_CHAIN_BROKEN",
            IntegrityError::InvalidSignature(_) => "INVALID_SIGNATURE",
            IntegrityError::SignatureError { .. } => "SIGNATURE_ERROR",
            IntegrityError::HashComputeError { .. } => "HASH_COMPUTE_ERROR",
            IntegrityError::HeadMismatch => "HEAD_MISMATCH",
        }
    }

    /// Critical errors latch read-only mode outright; major errors
    /// (signature-related) also latch it.
    pub fn severity(&self) -> Severity {
        match self {
            IntegrityError::HashChainBroken(_)
            | IntegrityError::HeadMismatch
            | IntegrityError::MissingSegment(_)
            | IntegrityError::SeqMismatch { .. } => Severity::Critical,
            IntegrityError::InvalidSignature(_)
            | IntegrityError::SignatureError { .. }
            | IntegrityError::HashComputeError { .. } => Severity::Major,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Major,
    Critical,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("webauthn unavailable on this host")]
    WebauthnUnavailable,
    #[error("no credential registered for this identity")]
    CredentialNotRegistered,
    #[error("biometric challenge failed")]
    ChallengeFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown plan id: {0}")]
    BadPlanId(String),
    #[error("unsupported payment provider: {0}")]
    UnsupportedProvider(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("ai worker request failed: {0}")]
    AiWorkerFailed(String),
    #[error("network failure: {0}")]
    Network(String),
}

/// The umbrella error type re-exported by every BalanceChain crate, so a
/// caller at the commit boundary has one type to match on instead of six.
#[derive(Error, Debug)]
pub enum BalanceChainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("chain is in read-only mode: {0}")]
    ReadOnlyMode(String),
    #[error("commit conflicted with a concurrent writer, retry")]
    CommitConflict,
}
