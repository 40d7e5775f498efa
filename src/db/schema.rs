//! Layout of the single `guilds` table.

pub const CREATE_GUILDS: &str = "
    CREATE TABLE IF NOT EXISTS guilds (
        guild_id INTEGER PRIMARY KEY UNIQUE,
        sticky_role_ids TEXT NOT NULL DEFAULT '',
        users TEXT NOT NULL DEFAULT '{}',
        custom_prefix TEXT NOT NULL,
        allowed_channel_ids TEXT NOT NULL DEFAULT '',
        admin_roles TEXT NOT NULL DEFAULT ''
    );
";

/// Added after the first schema revision; older databases are migrated in place.
pub const ADD_ADMIN_ROLES: &str =
    "ALTER TABLE guilds ADD COLUMN admin_roles TEXT NOT NULL DEFAULT ''";

/// Mutable columns of a guild row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    StickyRoleIds,
    Users,
    CustomPrefix,
    AllowedChannelIds,
    AdminRoles,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::StickyRoleIds => "sticky_role_ids",
            Column::Users => "users",
            Column::CustomPrefix => "custom_prefix",
            Column::AllowedChannelIds => "allowed_channel_ids",
            Column::AdminRoles => "admin_roles",
        }
    }
}
