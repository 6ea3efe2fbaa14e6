use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine-wide defaults applied to every strategy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Positions not updated within this window are stale.
    pub stale_data_threshold_secs: u64,
    /// Upper bound on a buy-first-then-sell exit.
    pub exit_timeout_secs: u64,
    /// How often the scheduler ticks.
    pub scheduler_tick_secs: u64,
    /// Upper bound on a single scheduled `evaluate` call.
    pub evaluation_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_data_threshold_secs: 5,
            exit_timeout_secs: 30,
            scheduler_tick_secs: 1,
            evaluation_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn stale_data_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_data_threshold_secs)
    }

    #[must_use]
    pub const fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_timeout_secs)
    }

    #[must_use]
    pub const fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs)
    }

    #[must_use]
    pub const fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/execution_journal.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub slippage_bps: u32,
    /// Symbols the paper broker rejects, for exercising failure paths.
    pub reject_symbols: Vec<String>,
    pub latency_ms: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 10,
            reject_symbols: Vec::new(),
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}
