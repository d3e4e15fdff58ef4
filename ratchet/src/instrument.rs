use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

use crate::error::AgentError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(default)]
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub sec_type: String,
    pub currency: String,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub tick_size: Option<f64>,
}

impl Instrument {
    pub fn multiplier(&self) -> f64 {
        self.multiplier.filter(|m| *m > 0.0).unwrap_or(1.0)
    }

    pub fn round_price(&self, price: f64) -> f64 {
        match self.tick_size {
            Some(tick) if tick > 0.0 => (price / tick).round() * tick,
            _ => price,
        }
    }
}

pub trait InstrumentResolver {
    fn resolve(&self, id: &str) -> Result<Instrument, AgentError>;

    fn resolve_all(&self, ids: &[String]) -> Result<Vec<Instrument>, AgentError> {
        ids.iter().map(|id| self.resolve(id)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: HashMap<String, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instruments(items: impl IntoIterator<Item = Instrument>) -> Result<Self, AgentError> {
        let mut registry = Self::new();
        for instrument in items {
            registry.register(instrument)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, instrument: Instrument) -> Result<(), AgentError> {
        if instrument.id.is_empty() {
            return Err(AgentError::Config(format!(
                "instrument {} has no id",
                instrument.symbol
            )));
        }
        if self.instruments.contains_key(&instrument.id) {
            return Err(AgentError::Config(format!(
                "duplicate instrument id {}",
                instrument.id
            )));
        }
        self.instruments.insert(instrument.id.clone(), instrument);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Instrument> {
        self.instruments.get(id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.instruments.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// All instruments ordered by id.
    pub fn all(&self) -> Vec<Instrument> {
        let mut items = self.instruments.values().cloned().collect::<Vec<_>>();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }
}

impl InstrumentResolver for InstrumentRegistry {
    fn resolve(&self, id: &str) -> Result<Instrument, AgentError> {
        self.get(id)
            .cloned()
            .ok_or_else(|| AgentError::not_found("instrument", id))
    }
}

pub struct InstrumentLoader;

impl InstrumentLoader {
    /// Loads a map of id → instrument from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<Instrument>, AgentError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        let items: HashMap<String, Instrument> = match path.extension().and_then(|x| x.to_str()) {
            Some("json") => {
                let value: JsonValue = serde_json::from_str(&text)?;
                serde_json::from_value(value)?
            }
            Some("yaml") | Some("yml") => {
                let value: YamlValue = serde_yaml::from_str(&text)?;
                serde_yaml::from_value(value)?
            }
            _ => {
                return Err(AgentError::Config(format!(
                    "unsupported instrument file format: {}",
                    path.display()
                )));
            }
        };

        let mut out = items
            .into_iter()
            .map(|(key, mut instrument)| {
                if instrument.id.is_empty() {
                    instrument.id = key;
                }
                instrument
            })
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}
