//! Protocol constants. These are consensus-critical: changing any value here
//! changes what a valid chain looks like for every identity that adopts it.

/// Current segment protocol version.
pub const PROTOCOL_VERSION: u32 = 2;

/// Hash value standing in for an empty chain's head.
pub const GENESIS_HASH: &str = "GENESIS";

/// `unlocked_balance = INITIAL_UNLOCKED + caps.total`.
pub const INITIAL_UNLOCKED: i64 = 1_200;

/// Daily cap-affecting-segment quota.
pub const DAILY_CAP: u32 = 3_600;
/// Monthly cap-affecting-segment quota.
pub const MONTHLY_CAP: u32 = 36_000;
/// Yearly cap-affecting-segment quota.
pub const YEARLY_CAP: u32 = 120_000;

/// Minimum milliseconds between two segments from the same author.
pub const MIN_BLOCK_INTERVAL_MS: i64 = 1_000;

/// Allowed backward clock drift between adjacent same-author segments.
pub const UTC_TOLERANCE_MS: i64 = 720_000;

/// Minimum rich score for capsule eligibility.
pub const MIN_RICH_SCORE: f64 = 70.0;
/// Minimum business score for capsule eligibility.
pub const MIN_BUSINESS_SCORE: f64 = 70.0;
/// Minimum ECF score for capsule eligibility.
pub const MIN_ECF_SCORE: f64 = 0.1;

/// Similarity score at/above which a minted capsule marks a candidate recyclable.
pub const CAPSULE_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Minimum message count for capsule eligibility.
pub const SESSION_MESSAGE_LIMIT: usize = 12;

/// TVM credited per successfully minted capsule.
pub const TVM_PER_CAPSULE_MILLI: i64 = 1_000;

/// Nonce length in bytes (before hex-encoding to 32 hex chars).
pub const NONCE_LEN_BYTES: usize = 16;

/// Nonces older than this may be purged from the nonce log.
pub const NONCE_PURGE_AGE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Rich-score theme bands.
pub const THEME_COAL_MAX: f64 = 25.0;
pub const THEME_EMBER_MAX: f64 = 50.0;
pub const THEME_BRONZE_MAX: f64 = 80.0;

/// Capsule similarity weights, normalized by this total.
pub const SIMILARITY_WEIGHT_MOTIVATOR: f64 = 3.0;
pub const SIMILARITY_WEIGHT_CATEGORY: f64 = 2.0;
pub const SIMILARITY_WEIGHT_RICH: f64 = 2.0;
pub const SIMILARITY_WEIGHT_BUSINESS: f64 = 2.0;
pub const SIMILARITY_WEIGHT_ECF: f64 = 1.0;
pub const SIMILARITY_WEIGHT_TOTAL: f64 = SIMILARITY_WEIGHT_MOTIVATOR
    + SIMILARITY_WEIGHT_CATEGORY
    + SIMILARITY_WEIGHT_RICH
    + SIMILARITY_WEIGHT_BUSINESS
    + SIMILARITY_WEIGHT_ECF;

/// PBKDF2-SHA256 iteration count for encrypted identity backups.
pub const BACKUP_PBKDF2_ITERATIONS: u32 = 100_000;
/// Salt length for encrypted identity backups.
pub const BACKUP_SALT_LEN: usize = 16;
/// AES-GCM nonce length for encrypted identity backups.
pub const BACKUP_NONCE_LEN: usize = 12;
/// Framing version byte for encrypted identity backups.
pub const BACKUP_FRAME_VERSION: u8 = 1;

/// Theme band for a rich score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeBand {
    Coal,
    Ember,
    Bronze,
    Gold,
}

pub fn theme_band(rich_score: f64) -> ThemeBand {
    if rich_score < THEME_COAL_MAX {
        ThemeBand::Coal
    } else if rich_score < THEME_EMBER_MAX {
        ThemeBand::Ember
    } else if rich_score < THEME_BRONZE_MAX {
        ThemeBand::Bronze
    } else {
        ThemeBand::Gold
    }
}
