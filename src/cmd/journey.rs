//! Journey log replay: `temple-bridge journey`.

use std::path::Path;

use anyhow::{Result, bail};

use temple_bridge::config::BridgeConfig;
use temple_bridge::witness::JourneyReplay;

pub fn cmd_journey(config: &BridgeConfig, log: Option<&Path>, last: usize) -> Result<()> {
    let path = log.unwrap_or(config.journey_log.as_path());
    if !path.exists() {
        bail!("No journey log found at {}", path.display());
    }

    let replay = JourneyReplay::load(path)?;
    println!("Journey log: {}", path.display());
    println!();
    print!("{}", replay.digest(last));
    Ok(())
}
