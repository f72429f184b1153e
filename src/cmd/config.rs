//! Configuration view and validation commands: `temple-bridge config`.

use anyhow::{Result, bail};

use temple_bridge::config::BridgeConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config: &BridgeConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Temple Bridge Configuration");
            println!("===========================");
            println!();
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No config file found; using defaults with env/CLI overrides."),
            }
            println!();
            print!("{}", config.to_toml_string()?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid.");
                println!();
                return Ok(());
            }

            println!("Configuration problems:");
            for problem in &problems {
                println!("  - {}", problem);
            }
            println!();
            bail!("{} configuration problem(s) found", problems.len());
        }
    }

    Ok(())
}
