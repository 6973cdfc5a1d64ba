//! `parley ban`: manage the ban list.

use chrono::{Duration, Utc};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum BanAction {
    /// Ban a user
    Add {
        discord_id: String,
        #[arg(long, default_value = "")]
        reason: String,
        /// Lift the ban automatically after this many minutes
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// Lift a ban
    Remove { discord_id: String },
    /// Show a user's ban status
    Status { discord_id: String },
}

pub async fn run(action: BanAction) -> Result<(), Box<dyn std::error::Error>> {
    let (_, services) = super::services().await?;
    let store = &services.store;

    match action {
        BanAction::Add {
            discord_id,
            reason,
            minutes,
        } => {
            let expires_at = minutes.map(|m| Utc::now() + Duration::minutes(m));
            store.ban_user(&discord_id, &reason, expires_at).await?;
            match expires_at {
                Some(at) => println!("Banned {discord_id} until {}", at.to_rfc3339()),
                None => println!("Banned {discord_id} permanently"),
            }
        }
        BanAction::Remove { discord_id } => {
            if store.unban_user(&discord_id).await? {
                println!("Unbanned {discord_id}");
            } else {
                println!("{discord_id} was not banned");
            }
        }
        BanAction::Status { discord_id } => {
            let status = store.get_ban(&discord_id).await?;
            if status.banned {
                println!(
                    "{discord_id} is banned: {}",
                    status.reason.as_deref().unwrap_or("(no reason)")
                );
            } else {
                println!("{discord_id} is not banned");
            }
        }
    }

    Ok(())
}
