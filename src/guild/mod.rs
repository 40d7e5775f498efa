pub mod codec;
pub mod record;

use crate::db::schema::Column;
use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::leveling;
use codec::{encode_column, IdList};
use record::{GuildRecord, MemberProgress};
use tracing::{debug, info};

/// A loaded guild row bound to the database it came from.
///
/// Every mutating call writes the changed column back before returning. A
/// call that fails leaves the in-memory record as it was before the call.
pub struct Guild {
    db: Database,
    record: GuildRecord,
}

impl Guild {
    pub(crate) fn new(db: Database, record: GuildRecord) -> Self {
        Self { db, record }
    }

    pub fn guild_id(&self) -> u64 {
        self.record.guild_id
    }

    pub fn record(&self) -> &GuildRecord {
        &self.record
    }

    pub fn into_record(self) -> GuildRecord {
        self.record
    }

    /// Applies `op` to the record and, if it reports a change, persists
    /// `column`. `Ok(None)` from `op` means nothing changed and skips the write.
    fn apply<T, F>(&mut self, column: Column, op: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut GuildRecord) -> Result<Option<T>>,
    {
        let snapshot = self.record.clone();
        let outcome = match op(&mut self.record) {
            Ok(Some(value)) => self.persist(column).map(|_| Some(value)),
            other => other,
        };
        if outcome.is_err() {
            self.record = snapshot;
        }
        outcome
    }

    fn persist(&self, column: Column) -> Result<()> {
        let value = encode_column(&self.record, column)?;
        self.db.update_column(self.record.guild_id, column, &value)
    }

    fn insert_id<S>(&mut self, column: Column, select: S, id: u64) -> Result<Option<Vec<u64>>>
    where
        S: FnOnce(&mut GuildRecord) -> &mut IdList,
    {
        self.apply(column, |record| {
            let list = select(record);
            Ok(list.insert(id).then(|| list.to_vec()))
        })
    }

    fn remove_id<S>(&mut self, column: Column, select: S, id: u64) -> Result<Option<Vec<u64>>>
    where
        S: FnOnce(&mut GuildRecord) -> &mut IdList,
    {
        self.apply(column, |record| {
            let list = select(record);
            Ok(list.remove(id).then(|| list.to_vec()))
        })
    }

    // --- Sticky roles ---

    /// Marks `role_id` as sticky. Returns the new sticky list, or `None` if it
    /// was already sticky.
    pub fn create_sticky_role(&mut self, role_id: u64) -> Result<Option<Vec<u64>>> {
        let updated = self.insert_id(Column::StickyRoleIds, |r| &mut r.sticky_role_ids, role_id)?;
        if updated.is_some() {
            info!("Guild {}: role {} is now sticky", self.guild_id(), role_id);
        }
        Ok(updated)
    }

    /// Members that already recorded `role_id` keep it.
    pub fn remove_sticky_role(&mut self, role_id: u64) -> Result<Option<Vec<u64>>> {
        let updated = self.remove_id(Column::StickyRoleIds, |r| &mut r.sticky_role_ids, role_id)?;
        if updated.is_some() {
            info!("Guild {}: role {} is no longer sticky", self.guild_id(), role_id);
        }
        Ok(updated)
    }

    /// Creates a level 1 record for `user_id` if there is none. Returns whether
    /// one was created.
    pub fn init_user(&mut self, user_id: u64) -> Result<bool> {
        let created = self.apply(Column::Users, |record| {
            if record.members.contains_key(&user_id) {
                return Ok(None);
            }
            record.members.insert(user_id, MemberProgress::new());
            Ok(Some(()))
        })?;
        if created.is_some() {
            debug!("Guild {}: initialized member {}", self.guild_id(), user_id);
        }
        Ok(created.is_some())
    }

    /// Records `role_id` against the member so it can be restored on rejoin.
    /// The member is initialized first in every case. Returns the updated
    /// member, or `None` if the role is not sticky or already recorded.
    pub fn add_sticky_role_to_user(
        &mut self,
        user_id: u64,
        role_id: u64,
    ) -> Result<Option<MemberProgress>> {
        self.init_user(user_id)?;
        self.apply(Column::Users, |record| {
            if !record.sticky_role_ids.contains(role_id) {
                return Ok(None);
            }
            let member = record
                .members
                .get_mut(&user_id)
                .ok_or(StoreError::MemberNotInitialized(user_id))?;
            if !member.sticky_roles.insert(role_id) {
                return Ok(None);
            }
            Ok(Some(member.clone()))
        })
    }

    pub fn member(&self, user_id: u64) -> Option<&MemberProgress> {
        self.record.members.get(&user_id)
    }

    /// Roles recorded for the member. May include roles that have since
    /// stopped being sticky for the guild.
    pub fn sticky_roles_for(&self, user_id: u64) -> Vec<u64> {
        self.member(user_id)
            .map(|m| m.sticky_roles.to_vec())
            .unwrap_or_default()
    }

    // --- XP ---

    /// Grants `xp` to an initialized member. Returns the member's new level if
    /// the grant crossed at least one threshold, `0` otherwise.
    pub fn give_user_xp(&mut self, user_id: u64, xp: u64) -> Result<u32> {
        leveling::check_grant(xp)?;
        let guild_id = self.guild_id();
        let level = self.apply(Column::Users, |record| {
            let member = record
                .members
                .get_mut(&user_id)
                .ok_or(StoreError::MemberNotInitialized(user_id))?;
            let before = member.level;
            let after = member.progress().grant(xp)?;
            member.level = after.level;
            member.xp_to_next = after.xp_to_next;

            if after.level > before {
                info!(
                    "Guild {}: member {} leveled up {} -> {}",
                    guild_id, user_id, before, after.level
                );
                Ok(Some(after.level))
            } else {
                Ok(Some(0))
            }
        })?;
        Ok(level.unwrap_or(0))
    }

    // --- Channels, prefix, admin roles ---

    pub fn channel_valid(&self, channel_id: u64) -> bool {
        self.record.allowed_channel_ids.contains(channel_id)
    }

    pub fn role_admin(&self, role_id: u64) -> bool {
        self.record.admin_role_ids.contains(role_id)
    }

    pub fn allow_channel(&mut self, channel_id: u64) -> Result<Option<Vec<u64>>> {
        self.insert_id(Column::AllowedChannelIds, |r| &mut r.allowed_channel_ids, channel_id)
    }

    pub fn disallow_channel(&mut self, channel_id: u64) -> Result<Option<Vec<u64>>> {
        self.remove_id(Column::AllowedChannelIds, |r| &mut r.allowed_channel_ids, channel_id)
    }

    pub fn add_admin_role(&mut self, role_id: u64) -> Result<Option<Vec<u64>>> {
        self.insert_id(Column::AdminRoles, |r| &mut r.admin_role_ids, role_id)
    }

    pub fn remove_admin_role(&mut self, role_id: u64) -> Result<Option<Vec<u64>>> {
        self.remove_id(Column::AdminRoles, |r| &mut r.admin_role_ids, role_id)
    }

    /// Returns `false` if the prefix was already `prefix`.
    pub fn set_custom_prefix(&mut self, prefix: &str) -> Result<bool> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(StoreError::InvalidPrefix);
        }
        let changed = self.apply(Column::CustomPrefix, |record| {
            if record.custom_prefix == prefix {
                return Ok(None);
            }
            record.custom_prefix = prefix.to_string();
            Ok(Some(()))
        })?;
        Ok(changed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leveling::xp_for_next_level;
    use crate::store::GuildStore;

    const GUILD: u64 = 1001;
    const USER: u64 = 42;

    fn test_store() -> GuildStore {
        let store = GuildStore::open(":memory:", "!").unwrap();
        store.init_db().unwrap();
        store
    }

    fn reload(store: &GuildStore) -> GuildRecord {
        store.get_guild(GUILD).unwrap().unwrap().into_record()
    }

    #[test]
    fn test_create_sticky_role_is_idempotent() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();

        assert_eq!(guild.create_sticky_role(7).unwrap(), Some(vec![7]));
        assert_eq!(guild.create_sticky_role(7).unwrap(), None);
        assert_eq!(guild.create_sticky_role(3).unwrap(), Some(vec![7, 3]));

        assert_eq!(reload(&store).sticky_role_ids.as_slice(), &[7, 3]);
    }

    #[test]
    fn test_remove_sticky_role() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.create_sticky_role(7).unwrap();
        guild.create_sticky_role(8).unwrap();

        assert_eq!(guild.remove_sticky_role(9).unwrap(), None);
        assert_eq!(guild.remove_sticky_role(7).unwrap(), Some(vec![8]));
        assert_eq!(reload(&store).sticky_role_ids.as_slice(), &[8]);
    }

    #[test]
    fn test_init_user() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();

        assert!(guild.init_user(USER).unwrap());
        assert!(!guild.init_user(USER).unwrap());

        let record = reload(&store);
        let member = &record.members[&USER];
        assert_eq!(member.level, 1);
        assert_eq!(member.xp_to_next, xp_for_next_level(1) as i64);
        assert!(member.sticky_roles.is_empty());
    }

    #[test]
    fn test_add_sticky_role_to_user() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.create_sticky_role(7).unwrap();

        let member = guild.add_sticky_role_to_user(USER, 7).unwrap().unwrap();
        assert_eq!(member.sticky_roles.as_slice(), &[7]);
        assert!(guild.add_sticky_role_to_user(USER, 7).unwrap().is_none());

        assert_eq!(reload(&store).members[&USER].sticky_roles.as_slice(), &[7]);
    }

    #[test]
    fn test_non_sticky_role_still_initializes_member() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();

        assert!(guild.add_sticky_role_to_user(USER, 99).unwrap().is_none());

        let record = reload(&store);
        assert!(record.members[&USER].sticky_roles.is_empty());
    }

    #[test]
    fn test_removed_sticky_role_stays_on_member() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.create_sticky_role(7).unwrap();
        guild.add_sticky_role_to_user(USER, 7).unwrap();
        guild.remove_sticky_role(7).unwrap();

        assert_eq!(guild.sticky_roles_for(USER), vec![7]);
        assert_eq!(reload(&store).members[&USER].sticky_roles.as_slice(), &[7]);
    }

    #[test]
    fn test_give_user_xp_without_level_up() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.init_user(USER).unwrap();

        assert_eq!(guild.give_user_xp(USER, 10).unwrap(), 0);
        let member = &reload(&store).members[&USER];
        assert_eq!(member.level, 1);
        assert_eq!(member.xp_to_next, xp_for_next_level(1) as i64 - 10);
    }

    #[test]
    fn test_give_user_xp_exact_threshold() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.init_user(USER).unwrap();

        assert_eq!(guild.give_user_xp(USER, xp_for_next_level(1)).unwrap(), 2);
        let member = &reload(&store).members[&USER];
        assert_eq!(member.level, 2);
        assert_eq!(member.xp_to_next, xp_for_next_level(2) as i64);
    }

    #[test]
    fn test_give_user_xp_multiple_levels() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.init_user(USER).unwrap();

        let xp = xp_for_next_level(1) + xp_for_next_level(2);
        assert_eq!(guild.give_user_xp(USER, xp).unwrap(), 3);
        let member = &reload(&store).members[&USER];
        assert_eq!(member.level, 3);
        assert_eq!(member.xp_to_next, xp_for_next_level(3) as i64);
    }

    #[test]
    fn test_give_user_xp_out_of_range_leaves_member() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        guild.init_user(USER).unwrap();
        guild.give_user_xp(USER, 20).unwrap();

        let err = guild.give_user_xp(USER, 1_000_001).unwrap_err();
        assert!(matches!(err, StoreError::XpOutOfRange { .. }));

        let expected = xp_for_next_level(1) as i64 - 20;
        assert_eq!(guild.member(USER).unwrap().xp_to_next, expected);
        let member = &reload(&store).members[&USER];
        assert_eq!(member.level, 1);
        assert_eq!(member.xp_to_next, expected);
    }

    #[test]
    fn test_give_user_xp_requires_member() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();

        let err = guild.give_user_xp(USER, 5).unwrap_err();
        assert!(matches!(err, StoreError::MemberNotInitialized(USER)));
        assert!(guild.member(USER).is_none());
    }

    #[test]
    fn test_give_user_xp_at_top_level_fails_cleanly() {
        let store = test_store();
        store.init_guild(GUILD, &[], None).unwrap();
        let users = format!(
            r#"{{"{}":{{"sticky_roles":[],"level":{},"xp_to_next":5}}}}"#,
            USER,
            u32::MAX
        );
        store
            .database()
            .update_column(GUILD, Column::Users, &users)
            .unwrap();

        let mut guild = store.get_guild(GUILD).unwrap().unwrap();
        let err = guild.give_user_xp(USER, 5).unwrap_err();
        assert!(matches!(err, StoreError::LevelOverflow(u32::MAX)));
        assert_eq!(guild.member(USER).unwrap().level, u32::MAX);
        assert_eq!(reload(&store).members[&USER].xp_to_next, 5);
    }

    #[test]
    fn test_write_to_deleted_guild_keeps_record() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();
        store
            .database()
            .scoped(|conn| {
                conn.execute("DELETE FROM guilds WHERE guild_id = ?1", [GUILD])?;
                Ok(())
            })
            .unwrap();

        let err = guild.create_sticky_role(7).unwrap_err();
        assert!(matches!(err, StoreError::GuildVanished(GUILD)));
        assert!(guild.record().sticky_role_ids.is_empty());
    }

    #[test]
    fn test_channel_and_admin_checks() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[11, 12], None).unwrap();

        assert!(guild.channel_valid(11));
        assert!(!guild.channel_valid(13));
        assert!(!guild.role_admin(5));

        assert_eq!(guild.add_admin_role(5).unwrap(), Some(vec![5]));
        assert_eq!(guild.add_admin_role(5).unwrap(), None);
        assert_eq!(guild.allow_channel(13).unwrap(), Some(vec![11, 12, 13]));
        assert_eq!(guild.disallow_channel(11).unwrap(), Some(vec![12, 13]));

        let record = reload(&store);
        assert_eq!(record.admin_role_ids.as_slice(), &[5]);
        assert_eq!(record.allowed_channel_ids.as_slice(), &[12, 13]);

        assert_eq!(guild.remove_admin_role(5).unwrap(), Some(vec![]));
        assert!(reload(&store).admin_role_ids.is_empty());
    }

    #[test]
    fn test_set_custom_prefix() {
        let store = test_store();
        let mut guild = store.init_guild(GUILD, &[], None).unwrap();

        assert!(!guild.set_custom_prefix("!").unwrap());
        assert!(guild.set_custom_prefix(" $ ").unwrap());
        assert!(matches!(
            guild.set_custom_prefix("  "),
            Err(StoreError::InvalidPrefix)
        ));
        assert_eq!(reload(&store).custom_prefix, "$");
    }
}
