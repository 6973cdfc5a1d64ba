//! `parley pool`: manage the provider pool.

use clap::Subcommand;
use parley_core::ProviderEntry;
use parley_providers::EntryPatch;

#[derive(Subcommand)]
pub enum PoolAction {
    /// List pool entries and the primary provider
    List,

    /// Add an OpenAI-compatible endpoint
    Add {
        #[arg(long)]
        base_url: String,
        #[arg(long, env = "PARLEY_POOL_API_KEY")]
        api_key: String,
        #[arg(long)]
        model: String,
        /// Display name (defaults to the model)
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Change fields of an existing entry
    Update {
        index: usize,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove an entry by index
    Remove { index: usize },

    /// Enable an entry
    Enable { index: usize },

    /// Disable an entry
    Disable { index: usize },

    /// Zero every request counter
    Reset,

    /// Set the attempt budget per request (1-10)
    Retry {
        count: u32,
        /// Turn failover off entirely
        #[arg(long)]
        off: bool,
    },
}

pub async fn run(action: PoolAction) -> Result<(), Box<dyn std::error::Error>> {
    let (_, services) = super::services().await?;
    let pool = &services.pool;
    pool.load(services.store.as_ref())
        .await
        .map_err(|e| format!("Failed to read the provider pool: {e}"))?;

    match action {
        PoolAction::List => {
            println!("Provider pool");
            println!(
                "   retry: {} attempts, failover {}",
                pool.retry_count(),
                if pool.retry_on_error() { "on" } else { "off" }
            );
            let entries = pool.entries();
            if entries.is_empty() {
                println!("   (no pool entries)");
            }
            for (i, entry) in entries.iter().enumerate() {
                println!("   {}", describe(i, entry));
            }
            match pool.primary() {
                Some(primary) => println!("   primary: {} {}", primary.model, primary.base_url),
                None => println!("   primary: (not configured)"),
            }
            return Ok(());
        }
        PoolAction::Add {
            base_url,
            api_key,
            model,
            name,
        } => {
            let index = pool.add(ProviderEntry::new(name, base_url, api_key, model));
            println!("Added entry {index}");
        }
        PoolAction::Update {
            index,
            base_url,
            api_key,
            model,
            name,
        } => {
            pool.update(
                index,
                EntryPatch {
                    base_url,
                    api_key,
                    model,
                    name,
                },
            )?;
            println!("Updated entry {index}");
        }
        PoolAction::Remove { index } => {
            let removed = pool.remove(index)?;
            println!("Removed {}", removed.label());
        }
        PoolAction::Enable { index } => {
            pool.toggle(index, true)?;
            println!("Enabled entry {index}");
        }
        PoolAction::Disable { index } => {
            pool.toggle(index, false)?;
            println!("Disabled entry {index}");
        }
        PoolAction::Reset => {
            pool.reset_request_counts();
            println!("Request counters reset");
        }
        PoolAction::Retry { count, off } => {
            let applied = pool.set_retry_count(count);
            pool.set_retry_on_error(!off);
            println!("Retry count set to {applied}");
        }
    }

    pool.save(services.store.as_ref()).await?;
    Ok(())
}

fn describe(index: usize, entry: &ProviderEntry) -> String {
    format!(
        "[{index}] {} {} model={} requests={}{}",
        entry.label(),
        entry.base_url,
        entry.model,
        entry.request_count,
        if entry.enabled { "" } else { " (disabled)" }
    )
}
