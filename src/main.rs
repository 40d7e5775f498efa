use anyhow::Context;
use clap::{Parser, Subcommand};
use guildkeeper::{config::Config, Guild, GuildStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "guildkeeper", about = "Inspect and maintain guild progression state")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the guilds table
    InitDb,
    /// Initialize a guild with default settings
    InitGuild {
        guild_id: u64,
        #[arg(long)]
        prefix: Option<String>,
        /// Channel the bot may respond in (repeatable)
        #[arg(long = "channel")]
        channels: Vec<u64>,
    },
    /// Print a guild's stored state as JSON
    Show { guild_id: u64 },
    /// Manage a guild's sticky roles
    Sticky {
        #[command(subcommand)]
        action: StickyAction,
    },
    /// Grant XP to a member, initializing them if needed
    GrantXp { guild_id: u64, user_id: u64, xp: u64 },
}

#[derive(Subcommand)]
enum StickyAction {
    Add { guild_id: u64, role_id: u64 },
    Remove { guild_id: u64, role_id: u64 },
}

fn print_record(guild: &Guild) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(guild.record())?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let store = GuildStore::from_config(&config)
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    store.init_db().context("Failed to initialize database")?;

    match cli.command {
        Command::InitDb => info!("Database ready at {}", config.database_url),
        Command::InitGuild {
            guild_id,
            prefix,
            channels,
        } => {
            let guild = store.init_guild(guild_id, &channels, prefix.as_deref())?;
            print_record(&guild)?;
        }
        Command::Show { guild_id } => match store.get_guild(guild_id)? {
            Some(guild) => print_record(&guild)?,
            None => anyhow::bail!("Guild {} is not initialized", guild_id),
        },
        Command::Sticky { action } => {
            let (guild_id, changed) = match action {
                StickyAction::Add { guild_id, role_id } => (
                    guild_id,
                    store.with_guild_or_init(guild_id, |g| g.create_sticky_role(role_id))?,
                ),
                StickyAction::Remove { guild_id, role_id } => (
                    guild_id,
                    store.with_guild_or_init(guild_id, |g| g.remove_sticky_role(role_id))?,
                ),
            };
            match changed {
                Some(roles) => println!("Sticky roles for {}: {:?}", guild_id, roles),
                None => println!("No change"),
            }
        }
        Command::GrantXp {
            guild_id,
            user_id,
            xp,
        } => {
            let level = store.with_guild_or_init(guild_id, |guild| {
                guild.init_user(user_id)?;
                guild.give_user_xp(user_id, xp)
            })?;
            if level > 0 {
                println!("Member {} reached level {}", user_id, level);
            } else {
                println!("Granted {} XP to member {}", xp, user_id);
            }
        }
    }

    Ok(())
}
