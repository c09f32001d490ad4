//! Quote Types and Read-Side Cache
//!
//! Live ticks, whether pushed or polled, land in a [`QuoteCache`] keyed by
//! symbol. Within a topic ticks apply in arrival order, so the cache keeps
//! whatever arrived last rather than comparing exchange timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A ticker symbol, upper-cased (`AAPL`, `BTC-USD`).
pub type Symbol = String;

/// Longest symbol accepted from user input.
pub const MAX_SYMBOL_LEN: usize = 15;

/// Normalize raw user input into a symbol.
///
/// Trims, upper-cases, and rejects empty or overlong input and characters
/// outside `[A-Z0-9.-^=]`.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    valid.then_some(symbol)
}

/// Whether a symbol names a crypto product (`BASE-QUOTE`).
#[must_use]
pub fn is_crypto_product(symbol: &str) -> bool {
    symbol
        .split_once('-')
        .is_some_and(|(base, quote)| {
            !base.is_empty() && matches!(quote, "USD" | "USDT" | "USDC" | "EUR")
        })
}

/// Latest price observation for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Percent change on the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<Decimal>,
    /// Session volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Create a quote with only a price.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_pct: None,
            volume: None,
            timestamp,
        }
    }
}

/// Latest quote per symbol.
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: HashMap<Symbol, Quote>,
}

impl QuoteCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote, returning the one it replaced.
    pub fn upsert(&mut self, quote: Quote) -> Option<Quote> {
        self.quotes.insert(quote.symbol.clone(), quote)
    }

    /// Latest quote for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// All quotes sorted by symbol.
    #[must_use]
    pub fn sorted(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self.quotes.values().cloned().collect();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        quotes
    }
}
