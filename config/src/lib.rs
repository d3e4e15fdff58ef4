//! Agent configuration: one file describing instruments, bar series,
//! strategies and allocators, plus the control loop settings.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use market::{BarSeriesRegistry, SeriesConfig, ShadowConfig};
use portfolio::AllocatorConfig;
use ratchet::{AgentError, Instrument, InstrumentLoader, InstrumentRegistry, Period};
use risk::Guardrails;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strategy::BreakoutConfig;

/// What to do with the venue session after an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndingProcess {
    /// Cancel orders and data requests, keep the session open.
    #[default]
    Cancel,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    pub min_balance: f64,
    pub min_portfolio_pnl: f64,
    #[serde(default = "default_sleep_time")]
    pub sleep_time: Period,
    #[serde(default = "default_buffer_time")]
    pub buffer_time: Period,
    #[serde(default = "default_loop_interval")]
    pub loop_interval: Period,
    #[serde(default)]
    pub ending_process: EndingProcess,
    #[serde(default = "default_run_for")]
    pub run_for: Period,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_base_currency() -> String {
    "USD".to_string()
}

fn default_sleep_time() -> Period {
    Period::seconds(2)
}

fn default_buffer_time() -> Period {
    Period::seconds(5)
}

fn default_loop_interval() -> Period {
    Period::minutes(1)
}

fn default_run_for() -> Period {
    Period::weeks(1)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentSettings {
    pub fn guardrails(&self) -> Guardrails {
        Guardrails::new(self.min_balance, self.min_portfolio_pnl)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if !self.min_balance.is_finite() || !self.min_portfolio_pnl.is_finite() {
            return Err(AgentError::Config("guardrail floors must be finite".to_string()));
        }
        if self.loop_interval.as_seconds() <= 0 {
            return Err(AgentError::Config("loop_interval must be positive".to_string()));
        }
        if self.sleep_time.as_seconds() < 0 {
            return Err(AgentError::Config("sleep_time must not be negative".to_string()));
        }
        if !(0..60).contains(&self.buffer_time.as_seconds()) {
            return Err(AgentError::Config("buffer_time must be within a minute".to_string()));
        }
        if self.run_for.as_seconds() <= 0 {
            return Err(AgentError::Config("run_for must be positive".to_string()));
        }
        Ok(())
    }
}

/// Paper venue used by the `live` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSettings {
    pub start: DateTime<Utc>,
    pub cash: f64,
    /// instrument id → csv file with its bars.
    #[serde(default)]
    pub data: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSettings,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub instrument_file: Option<PathBuf>,
    #[serde(default)]
    pub market_data: Vec<SeriesConfig>,
    #[serde(default)]
    pub shadow_data: Vec<ShadowConfig>,
    #[serde(default)]
    pub strategies: Vec<BreakoutConfig>,
    #[serde(default)]
    pub allocators: Vec<AllocatorConfig>,
    #[serde(default)]
    pub paper: Option<PaperSettings>,
}

impl AgentConfig {
    /// Reads a `.yaml`/`.yml` or `.json` file, pulls in `instrument_file` and
    /// validates the result. Relative paths resolve against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|x| x.to_str()) {
            Some("json") => parse_json(&text)?,
            Some("yaml") | Some("yml") => parse_yaml(&text)?,
            _ => {
                return Err(AgentError::Config(format!(
                    "unsupported config file format: {}",
                    path.display()
                )));
            }
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(file) = config.instrument_file.take() {
            let file = base.join(file);
            let loaded = InstrumentLoader::load(&file)?;
            tracing::info!(file = %file.display(), count = loaded.len(), "instruments loaded");
            config.instruments.extend(loaded);
            config.instrument_file = Some(file);
        }
        if let Some(paper) = config.paper.as_mut() {
            for file in paper.data.values_mut() {
                *file = base.join(&*file);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, AgentError> {
        let config: Self = parse_yaml(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, AgentError> {
        let config: Self = parse_json(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn instrument_registry(&self) -> Result<InstrumentRegistry, AgentError> {
        InstrumentRegistry::from_instruments(self.instruments.iter().cloned())
    }

    pub fn series_registry(&self) -> Result<BarSeriesRegistry, AgentError> {
        BarSeriesRegistry::new(self.market_data.clone(), self.shadow_data.clone())
    }

    /// Checks ranges and that every cross reference resolves.
    pub fn validate(&self) -> Result<(), AgentError> {
        self.agent.validate()?;
        let instruments = self.instrument_registry()?;
        self.series_registry()?;

        for series in &self.market_data {
            known_instrument(&instruments, &series.id, &series.instrument_id)?;
        }
        for shadow in &self.shadow_data {
            known_instrument(&instruments, &shadow.id, &shadow.instrument_id)?;
        }

        let series_ids = self
            .market_data
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.shadow_data.iter().map(|s| s.id.as_str()))
            .collect::<HashSet<_>>();

        let mut allocator_ids = HashSet::new();
        for allocator in &self.allocators {
            allocator.validate()?;
            if !allocator_ids.insert(allocator.id.as_str()) {
                return Err(AgentError::Config(format!("duplicate allocator id {}", allocator.id)));
            }
            for id in &allocator.universe {
                known_instrument(&instruments, &allocator.id, id)?;
            }
        }

        let mut strategy_ids = HashSet::new();
        for strategy in &self.strategies {
            strategy.validate()?;
            if !strategy_ids.insert(strategy.strategy_id.as_str()) {
                return Err(AgentError::Config(format!(
                    "duplicate strategy id {}",
                    strategy.strategy_id
                )));
            }
            known_instrument(&instruments, &strategy.strategy_id, &strategy.instrument_id)?;
            if !series_ids.contains(strategy.series_id.as_str()) {
                return Err(AgentError::Config(format!(
                    "{}: unknown series {}",
                    strategy.strategy_id, strategy.series_id
                )));
            }
            if !allocator_ids.contains(strategy.tag.as_str()) {
                return Err(AgentError::Config(format!(
                    "{}: tag {} names no allocator",
                    strategy.strategy_id, strategy.tag
                )));
            }
        }

        if let Some(paper) = &self.paper {
            if !paper.cash.is_finite() || paper.cash <= 0.0 {
                return Err(AgentError::Config("paper cash must be positive".to_string()));
            }
            for id in paper.data.keys() {
                known_instrument(&instruments, "paper", id)?;
            }
        }
        Ok(())
    }
}

fn known_instrument(instruments: &InstrumentRegistry, owner: &str, id: &str) -> Result<(), AgentError> {
    if instruments.exists(id) {
        Ok(())
    } else {
        Err(AgentError::Config(format!("{owner}: unknown instrument {id}")))
    }
}

fn parse_yaml<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    Ok(serde_yaml::from_str(text)?)
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
agent:
  min_balance: 100000
  min_portfolio_pnl: -10000
  sleep_time: 2 secs
  buffer_time: 5 secs
  loop_interval: 1 min
  ending_process: disconnect
  log_level: debug
instruments:
  - { id: EUR.USD, symbol: EURUSD, exchange: IDEALPRO, sec_type: CASH, currency: USD }
  - { id: EUR.USD_CFD, symbol: EURUSD, exchange: SMART, sec_type: CFD, currency: USD }
market_data:
  - id: EUR.USD
    instrument_id: EUR.USD
    bar_size: 1 min
    lookback: 1 day
    option: live_updating
    keep_up_to_date: true
shadow_data:
  - { id: EUR.USD_CFD, instrument_id: EUR.USD_CFD, parent: EUR.USD }
strategies:
  - strategy_id: ATRTrailing1
    instrument_id: EUR.USD_CFD
    series_id: EUR.USD_CFD
    tag: EW1
    window: 14
    multiplier: 3
    range_type: full
    signal_valid_latency: 1 min
    signal_valid_survival: 1 day
    send_initial_signal: true
allocators:
  - id: EW1
    scope: by_signals
    min_cash: 0.2
    max_weight: 0.1
    universe: [EUR.USD_CFD]
    min_weight_diff: 0.02
"#;

    #[test]
    fn parses_full_yaml() {
        let config = AgentConfig::from_yaml_str(SAMPLE).expect("valid config");
        assert_eq!(config.agent.base_currency, "USD");
        assert_eq!(config.agent.ending_process, EndingProcess::Disconnect);
        assert_eq!(config.agent.loop_interval, Period::minutes(1));
        assert_eq!(config.agent.run_for, Period::weeks(1));
        assert_eq!(config.market_data[0].max_len, 100_000);
        assert_eq!(config.strategies[0].signal_valid_survival, Period::days(1));
        assert!(config.strategies[0].send_initial_signal);
        assert_eq!(config.allocators[0].scope, portfolio::ScopePolicy::BySignals);
        assert_eq!(config.agent.guardrails(), Guardrails::new(100_000.0, -10_000.0));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let text = SAMPLE.replace("tag: EW1", "tag: EW2");
        let err = AgentConfig::from_yaml_str(&text).expect_err("bad tag");
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("EW2")));
    }

    #[test]
    fn unknown_series_is_rejected() {
        let text = SAMPLE.replace("series_id: EUR.USD_CFD", "series_id: GBP.USD");
        assert!(matches!(
            AgentConfig::from_yaml_str(&text),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn shadow_parent_must_exist() {
        let text = SAMPLE.replace("parent: EUR.USD }", "parent: USD.JPY }");
        assert!(matches!(
            AgentConfig::from_yaml_str(&text),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn bad_period_is_a_parse_error() {
        let text = SAMPLE.replace("bar_size: 1 min", "bar_size: 1 fortnight");
        assert!(matches!(
            AgentConfig::from_yaml_str(&text),
            Err(AgentError::Parse(_))
        ));
    }

    #[test]
    fn min_cash_range_is_checked() {
        let text = SAMPLE.replace("min_cash: 0.2", "min_cash: 1.0");
        assert!(matches!(
            AgentConfig::from_yaml_str(&text),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn loads_file_with_instrument_file() {
        let dir = std::env::temp_dir().join(format!("agent-config-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        fs::write(
            dir.join("instruments.yaml"),
            "GBP.USD: { symbol: GBPUSD, exchange: IDEALPRO, sec_type: CASH, currency: USD }\n",
        )
        .expect("write instruments");
        let text = format!("{SAMPLE}instrument_file: instruments.yaml\n");
        fs::write(dir.join("agent.yaml"), text).expect("write config");

        let config = AgentConfig::load(dir.join("agent.yaml")).expect("load");
        fs::remove_dir_all(&dir).ok();

        assert_eq!(config.instruments.len(), 3);
        assert!(config.instruments.iter().any(|i| i.id == "GBP.USD"));
    }

    #[test]
    fn json_files_are_accepted() {
        let config = AgentConfig::from_yaml_str(SAMPLE).expect("valid config");
        let text = serde_json::to_string(&config).expect("serialize");
        let parsed = AgentConfig::from_json_str(&text).expect("json config");
        assert_eq!(parsed, config);
    }
}
