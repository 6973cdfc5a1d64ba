//! `parley config`: configuration inspection.

use clap::Subcommand;
use parley_config::AppConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

pub async fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => show(),
        ConfigAction::Path => {
            println!("{}", config_path().display());
            Ok(())
        }
        ConfigAction::Init => init(),
    }
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some("[REDACTED]".into());
    }
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}
