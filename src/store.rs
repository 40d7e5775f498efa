use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::guild::codec::{GuildRow, IdList};
use crate::guild::record::GuildRecord;
use crate::guild::Guild;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Fetch/create entry point for guild records.
#[derive(Clone)]
pub struct GuildStore {
    db: Database,
    default_prefix: String,
    locks: Arc<Mutex<HashMap<u64, Arc<Mutex<()>>>>>,
}

impl GuildStore {
    pub fn new(db: Database, default_prefix: &str) -> Self {
        Self {
            db,
            default_prefix: default_prefix.to_string(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Database::new(config)?, &config.default_prefix))
    }

    pub fn open(database_url: &str, default_prefix: &str) -> Result<Self> {
        Ok(Self::new(Database::open(database_url)?, default_prefix))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn default_prefix(&self) -> &str {
        &self.default_prefix
    }

    pub fn init_db(&self) -> Result<()> {
        self.db.execute_init()
    }

    /// Loads the guild, or `None` if it was never initialized.
    pub fn get_guild(&self, guild_id: u64) -> Result<Option<Guild>> {
        let Some(row) = self.db.fetch_guild_row(guild_id)? else {
            return Ok(None);
        };
        Ok(Some(Guild::new(self.db.clone(), row.decode()?)))
    }

    /// Creates the guild row with default settings. An existing row is
    /// returned as-is and the given defaults are ignored.
    pub fn init_guild(
        &self,
        guild_id: u64,
        allowed_channels: &[u64],
        custom_prefix: Option<&str>,
    ) -> Result<Guild> {
        let prefix = custom_prefix.unwrap_or(self.default_prefix.as_str());
        let allowed: IdList = allowed_channels.iter().copied().collect();
        let row = GuildRow::encode(&GuildRecord::new(guild_id, allowed, prefix))?;

        let (stored, created) = self.db.insert_or_fetch_guild_row(&row)?;
        if created {
            info!("Guild {}: initialized with prefix {:?}", guild_id, prefix);
        } else {
            debug!("Guild {}: already initialized", guild_id);
        }
        Ok(Guild::new(self.db.clone(), stored.decode()?))
    }

    fn guild_lock(&self, guild_id: u64) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(locks.entry(guild_id).or_default().clone())
    }

    /// Fetches the guild and runs `f` on it while holding the guild's lock, so
    /// concurrent callers going through this method never overwrite each
    /// other's changes. Returns `None` if the guild does not exist.
    pub fn with_guild<T, F>(&self, guild_id: u64, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Guild) -> Result<T>,
    {
        let lock = self.guild_lock(guild_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.get_guild(guild_id)? {
            Some(mut guild) => f(&mut guild).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`GuildStore::with_guild`], initializing the guild with defaults first.
    pub fn with_guild_or_init<T, F>(&self, guild_id: u64, f: F) -> Result<T>
    where
        F: FnOnce(&mut Guild) -> Result<T>,
    {
        let lock = self.guild_lock(guild_id)?;
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guild = self.init_guild(guild_id, &[], None)?;
        f(&mut guild)
    }
}
