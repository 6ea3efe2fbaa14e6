//! Check-config CLI command.
//!
//! Prints the configuration the other commands would run with, after file
//! and environment overrides, and optionally validates a strategy config.

use anyhow::{Context, Result};
use clap::Args;
use optdesk_core::AppConfig;
use std::path::Path;

use super::load_strategy_config;

/// Arguments for the check-config command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    /// Strategy config to validate, inline JSON or a path to a JSON file
    #[arg(long)]
    pub strategy_config: Option<String>,
}

/// Runs the check-config command.
///
/// # Errors
/// Returns an error if the strategy config cannot be parsed or is invalid.
pub fn run_check_config(args: CheckConfigArgs, config: &AppConfig, path: &Path) -> Result<()> {
    println!();
    println!("{}", "=".repeat(60));
    println!("EFFECTIVE CONFIGURATION");
    println!(
        "Source: {}{}",
        path.display(),
        if path.exists() { "" } else { " (not found, defaults)" }
    );
    println!("{}", "=".repeat(60));
    println!("{}", serde_json::to_string_pretty(config)?);

    if let Some(raw) = &args.strategy_config {
        let strategy = load_strategy_config(raw)?;
        strategy
            .validate()
            .context("strategy config failed validation")?;
        println!();
        println!("STRATEGY CONFIG ({})", strategy.strategy_type().as_str());
        println!("{}", "-".repeat(60));
        println!("{}", serde_json::to_string_pretty(&strategy)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_strategy_config_fails() {
        let args = CheckConfigArgs {
            strategy_config: Some(
                r#"{"underlying":"NIFTY","lots":0,"policy":{"type":"STRADDLE"}}"#.to_string(),
            ),
        };

        let err = run_check_config(args, &AppConfig::default(), Path::new("missing.toml"))
            .unwrap_err();

        assert!(err.to_string().contains("validation"));
    }

    #[test]
    fn test_defaults_only() {
        let args = CheckConfigArgs {
            strategy_config: None,
        };
        assert!(run_check_config(args, &AppConfig::default(), Path::new("missing.toml")).is_ok());
    }
}
