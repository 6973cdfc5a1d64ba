pub mod ask;
pub mod ban;
pub mod config_cmd;
pub mod knowledge;
pub mod pool;
pub mod reindex;
pub mod serve;
pub mod words;

use parley_config::AppConfig;
use parley_gateway::Services;

/// Load configuration and open the record store it names.
pub async fn services() -> Result<(AppConfig, Services), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let services = Services::from_config(&config).await?;
    Ok((config, services))
}
