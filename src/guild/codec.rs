//! Text encodings for the guild row: `;`-joined id lists and the JSON members blob.

use super::record::{GuildRecord, MemberProgress, Members};
use crate::db::schema::Column;
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

const DELIMITER: char = ';';

/// Insertion-ordered set of snowflake ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct IdList(Vec<u64>);

impl IdList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` unless already present. Returns whether it was added.
    pub fn insert(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id);
        true
    }

    /// Removes `id` if present. Returns whether it was removed.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.0.iter().position(|&existing| existing == id) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u64> {
        self.0.clone()
    }

    /// `"1;2;3"`, or `""` for an empty list.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(&DELIMITER.to_string())
    }

    /// Parses a delimited list. Empty segments are skipped, so `""` and a
    /// leading `;` are accepted. Any other non-integer segment is an error.
    pub fn decode(column: Column, raw: &str) -> Result<Self> {
        let mut list = Self::new();
        for segment in raw.split(DELIMITER).map(str::trim).filter(|s| !s.is_empty()) {
            let id = segment.parse().map_err(|_| StoreError::MalformedIdList {
                column: column.name(),
                value: raw.to_string(),
            })?;
            list.insert(id);
        }
        Ok(list)
    }
}

impl FromIterator<u64> for IdList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut list = Self::new();
        for id in iter {
            list.insert(id);
        }
        list
    }
}

impl From<Vec<u64>> for IdList {
    fn from(ids: Vec<u64>) -> Self {
        ids.into_iter().collect()
    }
}

impl From<IdList> for Vec<u64> {
    fn from(list: IdList) -> Self {
        list.0
    }
}

/// Raw column values of one `guilds` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRow {
    pub guild_id: u64,
    pub sticky_role_ids: String,
    pub users: String,
    pub custom_prefix: String,
    pub allowed_channel_ids: String,
    pub admin_roles: Option<String>,
}

pub fn encode_members(members: &Members) -> Result<String> {
    Ok(serde_json::to_string(members)?)
}

pub fn decode_members(raw: &str) -> Result<Members> {
    let members: Members = serde_json::from_str(raw)?;
    for (&user_id, member) in &members {
        validate_member(user_id, member)?;
    }
    Ok(members)
}

fn validate_member(user_id: u64, member: &MemberProgress) -> Result<()> {
    if member.level < 1 {
        return Err(StoreError::InvalidMember {
            user_id,
            reason: format!("level {} is below 1", member.level),
        });
    }
    if member.xp_to_next < 0 {
        return Err(StoreError::InvalidMember {
            user_id,
            reason: format!("xp_to_next {} is negative", member.xp_to_next),
        });
    }
    Ok(())
}

impl GuildRow {
    pub fn decode(self) -> Result<GuildRecord> {
        Ok(GuildRecord {
            guild_id: self.guild_id,
            sticky_role_ids: IdList::decode(Column::StickyRoleIds, &self.sticky_role_ids)?,
            members: decode_members(&self.users)?,
            custom_prefix: self.custom_prefix,
            allowed_channel_ids: IdList::decode(
                Column::AllowedChannelIds,
                &self.allowed_channel_ids,
            )?,
            admin_role_ids: IdList::decode(
                Column::AdminRoles,
                self.admin_roles.as_deref().unwrap_or_default(),
            )?,
        })
    }

    pub fn encode(record: &GuildRecord) -> Result<Self> {
        Ok(Self {
            guild_id: record.guild_id,
            sticky_role_ids: record.sticky_role_ids.encode(),
            users: encode_members(&record.members)?,
            custom_prefix: record.custom_prefix.clone(),
            allowed_channel_ids: record.allowed_channel_ids.encode(),
            admin_roles: Some(record.admin_role_ids.encode()),
        })
    }
}

/// Encoded value of a single column of `record`.
pub fn encode_column(record: &GuildRecord, column: Column) -> Result<String> {
    Ok(match column {
        Column::StickyRoleIds => record.sticky_role_ids.encode(),
        Column::Users => encode_members(&record.members)?,
        Column::CustomPrefix => record.custom_prefix.clone(),
        Column::AllowedChannelIds => record.allowed_channel_ids.encode(),
        Column::AdminRoles => record.admin_role_ids.encode(),
    })
}
