use crate::error::Result;
use crate::guild::record::GuildRecord;
use crate::store::GuildStore;
use tracing::debug;

/// Async facade used by event handlers. Every call initializes the guild with
/// defaults if needed and runs under the guild's lock.
#[derive(Clone)]
pub struct GuildService {
    store: GuildStore,
}

impl GuildService {
    pub fn new(store: GuildStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &GuildStore {
        &self.store
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&GuildStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        self.store.database().run_blocking(move |_| f(&store)).await
    }

    /// Records the leaving member's roles that are sticky in the guild.
    /// Returns the roles newly recorded by this call.
    pub async fn member_left(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: Vec<u64>,
    ) -> Result<Vec<u64>> {
        self.run_blocking(move |store| {
            store.with_guild_or_init(guild_id, |guild| {
                guild.init_user(user_id)?;
                let mut recorded = Vec::new();
                for role_id in roles {
                    if guild.add_sticky_role_to_user(user_id, role_id)?.is_some() {
                        recorded.push(role_id);
                    }
                }
                debug!(
                    "Guild {}: recorded {} sticky roles for departing member {}",
                    guild_id,
                    recorded.len(),
                    user_id
                );
                Ok(recorded)
            })
        })
        .await
    }

    /// Roles to give back to a returning member.
    pub async fn member_joined(&self, guild_id: u64, user_id: u64) -> Result<Vec<u64>> {
        self.run_blocking(move |store| {
            store.with_guild_or_init(guild_id, |guild| Ok(guild.sticky_roles_for(user_id)))
        })
        .await
    }

    /// Initializes the member if needed, then grants `xp`. Returns the new
    /// level on level-up, `0` otherwise.
    pub async fn award_xp(&self, guild_id: u64, user_id: u64, xp: u64) -> Result<u32> {
        self.run_blocking(move |store| {
            store.with_guild_or_init(guild_id, |guild| {
                guild.init_user(user_id)?;
                guild.give_user_xp(user_id, xp)
            })
        })
        .await
    }

    pub async fn channel_valid(&self, guild_id: u64, channel_id: u64) -> Result<bool> {
        self.run_blocking(move |store| {
            store.with_guild_or_init(guild_id, |guild| Ok(guild.channel_valid(channel_id)))
        })
        .await
    }

    pub async fn guild(&self, guild_id: u64) -> Result<GuildRecord> {
        self.run_blocking(move |store| {
            store.with_guild_or_init(guild_id, |guild| Ok(guild.record().clone()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::leveling::xp_for_next_level;

    fn test_service() -> GuildService {
        let store = GuildStore::open(":memory:", "!").unwrap();
        store.init_db().unwrap();
        GuildService::new(store)
    }

    #[tokio::test]
    async fn test_sticky_roles_survive_rejoin() {
        let service = test_service();
        service
            .store()
            .with_guild_or_init(1, |guild| guild.create_sticky_role(10).map(|_| ()))
            .unwrap();

        let recorded = service.member_left(1, 2, vec![10, 11]).await.unwrap();
        assert_eq!(recorded, vec![10]);
        assert!(service.member_left(1, 2, vec![10]).await.unwrap().is_empty());

        assert_eq!(service.member_joined(1, 2).await.unwrap(), vec![10]);
        assert!(service.member_joined(1, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_award_xp_initializes_member() {
        let service = test_service();
        assert_eq!(service.award_xp(1, 2, 1).await.unwrap(), 0);

        let level = service
            .award_xp(1, 2, xp_for_next_level(1) - 1)
            .await
            .unwrap();
        assert_eq!(level, 2);

        let record = service.guild(1).await.unwrap();
        assert_eq!(record.members[&2].level, 2);
        assert_eq!(record.members[&2].xp_to_next, xp_for_next_level(2) as i64);
    }

    #[tokio::test]
    async fn test_award_xp_out_of_range() {
        let service = test_service();
        let err = service.award_xp(1, 2, 2_000_000).await.unwrap_err();
        assert!(matches!(err, StoreError::XpOutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_channel_valid_unconfigured_guild() {
        let service = test_service();
        assert!(!service.channel_valid(1, 5).await.unwrap());
        assert_eq!(service.guild(1).await.unwrap().custom_prefix, "!");
    }
}
