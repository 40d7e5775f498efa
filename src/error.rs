use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed id list in column {column}: {value:?}")]
    MalformedIdList { column: &'static str, value: String },
    #[error("Malformed members blob: {0}")]
    MalformedMembers(#[from] serde_json::Error),
    #[error("Invalid stored member {user_id}: {reason}")]
    InvalidMember { user_id: u64, reason: String },
    #[error("XP value {xp} may not be above {max}")]
    XpOutOfRange { xp: u64, max: u64 },
    #[error("Member {0} has not been initialized")]
    MemberNotInitialized(u64),
    #[error("Custom prefix may not be empty")]
    InvalidPrefix,
    #[error("Guild {0} row is missing")]
    GuildVanished(u64),
    #[error("Member cannot level past {0}")]
    LevelOverflow(u32),
    #[error("Blocking task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
