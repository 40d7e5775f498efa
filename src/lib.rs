pub mod config;
pub mod db;
pub mod error;
pub mod guild;
pub mod leveling;
pub mod services;
pub mod store;

pub use error::{Result, StoreError};
pub use guild::codec::IdList;
pub use guild::record::{GuildRecord, MemberProgress};
pub use guild::Guild;
pub use leveling::xp_for_next_level;
pub use store::GuildStore;
