//! Price Alerts
//!
//! A price alert fires when a live tick crosses its threshold. The
//! [`AlertMonitor`] remembers which side of the threshold each alert was last
//! seen on, so an alert fires at most once per crossing and re-arms only
//! after the price moves back.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::quote::{Quote, Symbol, normalize_symbol};

/// Which side of the threshold triggers the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    /// Fires when price rises to or above the threshold.
    Above,
    /// Fires when price falls to or below the threshold.
    Below,
}

impl AlertDirection {
    /// Whether `price` satisfies this direction against `threshold`.
    #[must_use]
    pub fn is_satisfied(self, price: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Above => price >= threshold,
            Self::Below => price <= threshold,
        }
    }
}

/// A user-defined price alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    /// Alert identifier.
    pub id: String,
    /// Watched symbol.
    pub symbol: Symbol,
    /// Trigger direction.
    pub direction: AlertDirection,
    /// Threshold price.
    pub threshold: Decimal,
}

impl PriceAlert {
    /// Create an alert with a fresh id.
    #[must_use]
    pub fn new(symbol: Symbol, direction: AlertDirection, threshold: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol,
            direction,
            threshold,
        }
    }

    /// Parse a stored alert, dropping entries without a usable symbol,
    /// direction, or threshold.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let symbol = object.get("symbol").and_then(Value::as_str).and_then(normalize_symbol)?;
        let direction = match object.get("direction").and_then(Value::as_str)? {
            "above" => AlertDirection::Above,
            "below" => AlertDirection::Below,
            _ => return None,
        };
        let threshold = object.get("threshold").and_then(decimal_from_value)?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        Some(Self {
            id,
            symbol,
            direction,
            threshold,
        })
    }
}

/// Parse a decimal from a JSON number or numeric string.
#[must_use]
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// An alert that fired on a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTrigger {
    /// Alert that fired.
    pub alert_id: String,
    /// Symbol.
    pub symbol: Symbol,
    /// Trigger direction.
    pub direction: AlertDirection,
    /// Threshold crossed.
    pub threshold: Decimal,
    /// Price that crossed it.
    pub price: Decimal,
    /// Tick time.
    pub at: DateTime<Utc>,
}

/// Tracks the last observed side of every alert.
#[derive(Debug, Default)]
pub struct AlertMonitor {
    satisfied: HashMap<String, bool>,
}

impl AlertMonitor {
    /// Create an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every alert on the quote's symbol against the quote.
    ///
    /// An alert never seen before counts as unsatisfied, so an alert whose
    /// condition already holds fires on its first tick.
    pub fn evaluate(&mut self, alerts: &[PriceAlert], quote: &Quote) -> Vec<AlertTrigger> {
        let mut triggers = Vec::new();

        for alert in alerts.iter().filter(|a| a.symbol == quote.symbol) {
            let now_satisfied = alert.direction.is_satisfied(quote.price, alert.threshold);
            let was_satisfied = self.satisfied.insert(alert.id.clone(), now_satisfied);

            if now_satisfied && was_satisfied != Some(true) {
                triggers.push(AlertTrigger {
                    alert_id: alert.id.clone(),
                    symbol: alert.symbol.clone(),
                    direction: alert.direction,
                    threshold: alert.threshold,
                    price: quote.price,
                    at: quote.timestamp,
                });
            }
        }

        triggers
    }

    /// Forget alerts that no longer exist.
    pub fn retain(&mut self, alerts: &[PriceAlert]) {
        self.satisfied
            .retain(|id, _| alerts.iter().any(|alert| &alert.id == id));
    }

    /// Number of tracked alerts.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.satisfied.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    fn tick(symbol: &str, price: &str) -> Quote {
        Quote::new(symbol, dec(price), Utc::now())
    }

    fn alert(direction: AlertDirection, threshold: &str) -> PriceAlert {
        PriceAlert {
            id: "a1".to_string(),
            symbol: "NVDA".to_string(),
            direction,
            threshold: dec(threshold),
        }
    }

    #[test]
    fn fires_once_per_crossing() {
        let alerts = vec![alert(AlertDirection::Above, "100")];
        let mut monitor = AlertMonitor::new();

        assert!(monitor.evaluate(&alerts, &tick("NVDA", "99")).is_empty());
        assert_eq!(monitor.evaluate(&alerts, &tick("NVDA", "101")).len(), 1);
        assert!(monitor.evaluate(&alerts, &tick("NVDA", "102")).is_empty());

        // Back below re-arms.
        assert!(monitor.evaluate(&alerts, &tick("NVDA", "98")).is_empty());
        let fired = monitor.evaluate(&alerts, &tick("NVDA", "100"));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].price, dec("100"));
    }

    #[test]
    fn below_direction() {
        let alerts = vec![alert(AlertDirection::Below, "50.5")];
        let mut monitor = AlertMonitor::new();

        let fired = monitor.evaluate(&alerts, &tick("NVDA", "50.25"));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].direction, AlertDirection::Below);
    }

    #[test]
    fn ignores_other_symbols() {
        let alerts = vec![alert(AlertDirection::Above, "1")];
        let mut monitor = AlertMonitor::new();
        assert!(monitor.evaluate(&alerts, &tick("AAPL", "500")).is_empty());
        assert_eq!(monitor.tracked(), 0);
    }

    #[test]
    fn retain_drops_removed_alerts() {
        let alerts = vec![alert(AlertDirection::Above, "1")];
        let mut monitor = AlertMonitor::new();
        monitor.evaluate(&alerts, &tick("NVDA", "2"));

        monitor.retain(&[]);
        assert_eq!(monitor.tracked(), 0);
    }

    #[test]
    fn parses_lenient_alerts() {
        let parsed = PriceAlert::from_value(&json!({
            "symbol": " tsla ",
            "direction": "below",
            "threshold": "180.5"
        }))
        .unwrap();
        assert_eq!(parsed.symbol, "TSLA");
        assert_eq!(parsed.threshold, dec("180.5"));
        assert!(!parsed.id.is_empty());

        assert!(PriceAlert::from_value(&json!({ "symbol": "TSLA", "direction": "sideways", "threshold": 1 })).is_none());
        assert!(PriceAlert::from_value(&json!({ "symbol": "", "direction": "above", "threshold": 1 })).is_none());
    }

    #[test]
    fn decimal_from_numbers_and_strings() {
        assert_eq!(decimal_from_value(&json!(1.25)), Some(dec("1.25")));
        assert_eq!(decimal_from_value(&json!(7)), Some(dec("7")));
        assert_eq!(decimal_from_value(&json!(" 3.5 ")), Some(dec("3.5")));
        assert_eq!(decimal_from_value(&json!(true)), None);
    }
}
