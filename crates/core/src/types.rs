/// Ordinal of a status poll within a single tracking run (1-based).
pub type PollAttempt = u32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
