//! Configuration management commands

use super::ConfigArgs;
use crate::config::Config;
use anyhow::Result;

pub async fn execute(args: ConfigArgs) -> Result<()> {
    if args.show {
        let config = Config::load().await?;
        println!("{}", toml::to_string_pretty(&config.redacted())?);
        if !config.auth_enabled() {
            eprintln!("note: no API key set, the server will accept unauthenticated requests");
        }
        return Ok(());
    }

    match Config::global_config_path() {
        Some(path) => println!("Global config: {}", path.display()),
        None => println!("Global config: unavailable (no home directory)"),
    }
    println!("Project config: ./repo-relay.toml or ./.repo-relay/config.toml");
    println!("Use --show to print the effective configuration");
    Ok(())
}
