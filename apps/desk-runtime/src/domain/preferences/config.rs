//! Screener and comparison panel settings.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::alerts::decimal_from_value;
use crate::domain::quote::{Symbol, normalize_symbol};

const SCREEN_PRESETS: [&str; 4] = ["momentum", "value", "gainers", "losers"];
const COMPARE_RANGES: [&str; 5] = ["1M", "3M", "6M", "1Y", "5Y"];
const MAX_SCREEN_LIMIT: u32 = 200;
const MAX_COMPARE_SYMBOLS: usize = 6;

/// Screener panel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenConfig {
    /// Named screen preset.
    pub preset: String,
    /// Minimum market capitalization filter.
    pub min_market_cap: Option<Decimal>,
    /// Sector filter; empty means all sectors.
    pub sectors: Vec<String>,
    /// Result sort key.
    pub sort_by: String,
    /// Maximum number of rows.
    pub limit: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            preset: "momentum".to_string(),
            min_market_cap: None,
            sectors: Vec::new(),
            sort_by: "changePct".to_string(),
            limit: 25,
        }
    }
}

impl ScreenConfig {
    /// Parse leniently, field by field.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(object) = value.as_object() else {
            return config;
        };

        if let Some(preset) = object.get("preset").and_then(Value::as_str) {
            config.preset = preset.to_string();
        }
        config.min_market_cap = object.get("minMarketCap").and_then(decimal_from_value);
        if let Some(sectors) = object.get("sectors").and_then(Value::as_array) {
            config.sectors = sectors
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(sort_by) = object.get("sortBy").and_then(Value::as_str) {
            config.sort_by = sort_by.to_string();
        }
        if let Some(limit) = object.get("limit").and_then(Value::as_u64) {
            config.limit = u32::try_from(limit).unwrap_or(MAX_SCREEN_LIMIT);
        }

        config.normalize();
        config
    }

    /// Clamp and clean every field.
    pub fn normalize(&mut self) {
        if !SCREEN_PRESETS.contains(&self.preset.as_str()) {
            self.preset = Self::default().preset;
        }
        if self.sort_by.trim().is_empty() {
            self.sort_by = Self::default().sort_by;
        }
        self.min_market_cap = self.min_market_cap.filter(|cap| cap.is_sign_positive());
        let mut seen = HashSet::new();
        self.sectors = self
            .sectors
            .iter()
            .map(|sector| sector.trim().to_string())
            .filter(|sector| !sector.is_empty() && seen.insert(sector.clone()))
            .collect();
        self.limit = self.limit.clamp(1, MAX_SCREEN_LIMIT);
    }
}

/// Comparison chart settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareConfig {
    /// Compared symbols.
    pub symbols: Vec<Symbol>,
    /// Look-back range.
    pub range: String,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["SPY".to_string(), "QQQ".to_string()],
            range: "6M".to_string(),
        }
    }
}

impl CompareConfig {
    /// Parse leniently, field by field.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(object) = value.as_object() else {
            return config;
        };

        if let Some(symbols) = object.get("symbols").and_then(Value::as_array) {
            config.symbols = symbols
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(range) = object.get("range").and_then(Value::as_str) {
            config.range = range.to_ascii_uppercase();
        }

        config.normalize();
        config
    }

    /// Clamp and clean every field.
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.symbols = self
            .symbols
            .iter()
            .filter_map(|symbol| normalize_symbol(symbol))
            .filter(|symbol| seen.insert(symbol.clone()))
            .take(MAX_COMPARE_SYMBOLS)
            .collect();
        if !COMPARE_RANGES.contains(&self.range.as_str()) {
            self.range = Self::default().range;
        }
    }
}
