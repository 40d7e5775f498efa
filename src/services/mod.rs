pub mod guild;

pub use guild::GuildService;
