use super::codec::IdList;
use crate::leveling::{xp_for_next_level, Progress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Members keyed by user id; serialized with string keys.
pub type Members = BTreeMap<u64, MemberProgress>;

/// Per-member progression stored inside the guild's `users` blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProgress {
    /// Roles to restore on rejoin. Not pruned when the guild's sticky list shrinks.
    pub sticky_roles: IdList,
    pub level: u32,
    pub xp_to_next: i64,
}

impl MemberProgress {
    pub fn new() -> Self {
        Self {
            sticky_roles: IdList::new(),
            level: 1,
            xp_to_next: xp_for_next_level(1) as i64,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            level: self.level,
            xp_to_next: self.xp_to_next,
        }
    }
}

impl Default for MemberProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory image of one `guilds` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildRecord {
    pub guild_id: u64,
    pub sticky_role_ids: IdList,
    pub members: Members,
    pub custom_prefix: String,
    /// Empty means no restriction has been configured.
    pub allowed_channel_ids: IdList,
    pub admin_role_ids: IdList,
}

impl GuildRecord {
    pub fn new(guild_id: u64, allowed_channel_ids: IdList, custom_prefix: &str) -> Self {
        Self {
            guild_id,
            sticky_role_ids: IdList::new(),
            members: Members::new(),
            custom_prefix: custom_prefix.to_string(),
            allowed_channel_ids,
            admin_role_ids: IdList::new(),
        }
    }
}
