//! CLI commands for the options strategy desk.

pub mod check_config;
pub mod reconcile;
pub mod simulate;

pub use check_config::{run_check_config, CheckConfigArgs};
pub use reconcile::{run_reconcile, ReconcileArgs};
pub use simulate::{run_simulate, SimulateArgs};

use anyhow::{Context, Result};
use optdesk_core::StrategyConfig;

/// Parses a strategy config given inline as JSON or as a path to a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or the JSON does not describe
/// a strategy config.
pub fn load_strategy_config(raw: &str) -> Result<StrategyConfig> {
    let trimmed = raw.trim_start();
    let json = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(raw).with_context(|| format!("reading strategy config {raw}"))?
    };
    serde_json::from_str(&json).context("parsing strategy config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use optdesk_core::StrategyType;
    use std::io::Write;

    #[test]
    fn test_load_inline_strategy_config() {
        let config =
            load_strategy_config(r#"{"underlying":"BANKNIFTY","policy":{"type":"STRADDLE"}}"#)
                .unwrap();
        assert_eq!(config.underlying, "BANKNIFTY");
        assert_eq!(config.strategy_type(), StrategyType::Straddle);
    }

    #[test]
    fn test_load_strategy_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"underlying":"NIFTY","lots":2,"policy":{{"type":"STRANGLE","wing_distance":"200"}}}}"#
        )
        .unwrap();

        let config = load_strategy_config(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.lots, 2);
        assert_eq!(config.strategy_type(), StrategyType::Strangle);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_strategy_config("/nonexistent/strategy.json").is_err());
    }
}
