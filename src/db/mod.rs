pub mod schema;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::guild::codec::GuildRow;
use rusqlite::{Connection, DropBehavior, ErrorCode, OptionalExtension};
use schema::Column;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const IN_MEMORY: &str = ":memory:";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(database_url: &str) -> Result<Self> {
        let conn = if database_url == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(database_url)?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` inside a transaction that is committed when the scope ends,
    /// whether `f` succeeded, failed, or panicked. The connection lock is
    /// released with it.
    pub fn scoped<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        // A panic inside `f` still commits on drop, so a poisoned lock holds a
        // consistent connection.
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tx = conn.transaction()?;
        tx.set_drop_behavior(DropBehavior::Commit);
        let outcome = f(&tx);
        tx.commit()?;
        outcome
    }

    /// Moves a database call off the async runtime.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Creates the `guilds` table, adding `admin_roles` to databases created
    /// before that column existed.
    pub fn execute_init(&self) -> Result<()> {
        info!("Database: Initializing schema...");
        self.scoped(|conn| {
            conn.execute_batch(schema::CREATE_GUILDS)?;

            let columns = {
                let mut stmt = conn.prepare("PRAGMA table_info(guilds)")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(1))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                names
            };
            if !columns.iter().any(|c| c == Column::AdminRoles.name()) {
                info!("Database: Adding admin_roles column to existing guilds table");
                conn.execute(schema::ADD_ADMIN_ROLES, [])?;
            }
            Ok(())
        })?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    pub fn fetch_guild_row(&self, guild_id: u64) -> Result<Option<GuildRow>> {
        self.scoped(|conn| select_guild(conn, guild_id))
    }

    /// Inserts `row` unless a row with the same id exists. Returns the stored
    /// row and whether this call created it.
    pub fn insert_or_fetch_guild_row(&self, row: &GuildRow) -> Result<(GuildRow, bool)> {
        self.scoped(|conn| {
            let inserted = conn.execute(
                "INSERT INTO guilds (guild_id, sticky_role_ids, users, custom_prefix, allowed_channel_ids, admin_roles)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    row.guild_id,
                    &row.sticky_role_ids,
                    &row.users,
                    &row.custom_prefix,
                    &row.allowed_channel_ids,
                    row.admin_roles.as_deref().unwrap_or_default(),
                ),
            );

            match inserted {
                Ok(_) => Ok((row.clone(), true)),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    debug!("Database: Guild {} already present", row.guild_id);
                    let existing = select_guild(conn, row.guild_id)?
                        .ok_or(StoreError::GuildVanished(row.guild_id))?;
                    Ok((existing, false))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn update_column(&self, guild_id: u64, column: Column, value: &str) -> Result<()> {
        debug!(
            "Database: Writing {} for guild {} ({} bytes)",
            column.name(),
            guild_id,
            value.len()
        );
        let sql = format!("UPDATE guilds SET {} = ?1 WHERE guild_id = ?2", column.name());
        self.scoped(|conn| {
            if conn.execute(&sql, (value, guild_id))? == 0 {
                return Err(StoreError::GuildVanished(guild_id));
            }
            Ok(())
        })
    }
}

fn select_guild(conn: &Connection, guild_id: u64) -> Result<Option<GuildRow>> {
    let row = conn
        .query_row(
            // Legacy tables declare these columns STRING (NUMERIC affinity), so a
            // lone id like "123" comes back as an INTEGER unless cast.
            "SELECT guild_id,
                    COALESCE(CAST(sticky_role_ids AS TEXT), ''),
                    CAST(users AS TEXT),
                    CAST(custom_prefix AS TEXT),
                    COALESCE(CAST(allowed_channel_ids AS TEXT), ''),
                    CAST(admin_roles AS TEXT)
             FROM guilds WHERE guild_id = ?1",
            [guild_id],
            |row| {
                Ok(GuildRow {
                    guild_id: row.get(0)?,
                    sticky_role_ids: row.get(1)?,
                    users: row.get(2)?,
                    custom_prefix: row.get(3)?,
                    allowed_channel_ids: row.get(4)?,
                    admin_roles: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
