//! Coin identifier catalog
//!
//! A fixed table of the assets the dump collects, keyed by the upstream
//! API's canonical identifier. Each entry carries a label of the form
//! `Name (TICKER)`, which is split once at load time.

use crate::error::CatalogError;

/// Built-in catalog, in collection order.
pub const BUILTIN_COINS: &[(&str, &str)] = &[
    ("bitcoin", "Bitcoin (BTC)"),
    ("ethereum", "Ethereum (ETH)"),
    ("binancecoin", "BNB (BNB)"),
    ("solana", "Solana (SOL)"),
    ("cardano", "Cardano (ADA)"),
    ("avalanche-2", "Avalanche (AVAX)"),
    ("polkadot", "Polkadot (DOT)"),
    ("chainlink", "Chainlink (LINK)"),
    ("polygon", "Polygon (MATIC)"),
    ("litecoin", "Litecoin (LTC)"),
    ("dogecoin", "Dogecoin (DOGE)"),
    ("shiba-inu", "Shiba Inu (SHIB)"),
    ("uniswap", "Uniswap (UNI)"),
    ("near", "NEAR Protocol (NEAR)"),
    ("cosmos", "Cosmos (ATOM)"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinEntry {
    pub id: String,
    pub display_name: String,
    pub symbol: String,
}

impl CoinEntry {
    pub fn parse(id: &str, label: &str) -> Result<Self, CatalogError> {
        if !is_slug(id) {
            return Err(CatalogError::InvalidId(id.to_string()));
        }

        let invalid_label = || CatalogError::InvalidLabel {
            id: id.to_string(),
            label: label.to_string(),
        };

        let (name, rest) = label.split_once(" (").ok_or_else(invalid_label)?;
        let symbol = rest.strip_suffix(')').ok_or_else(invalid_label)?;

        if name.trim().is_empty() || symbol.contains(['(', ')']) {
            return Err(invalid_label());
        }

        let len = symbol.chars().count();
        if !(2..=6).contains(&len) || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CatalogError::InvalidTicker {
                id: id.to_string(),
                ticker: symbol.to_string(),
            });
        }

        Ok(Self {
            id: id.to_string(),
            display_name: name.trim().to_string(),
            symbol: symbol.to_string(),
        })
    }

    /// `Name (TICKER)`
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.symbol)
    }

    fn matches_exactly(&self, query: &str) -> bool {
        self.id.eq_ignore_ascii_case(query)
            || self.display_name.to_lowercase() == query
            || self.symbol.to_lowercase() == query
    }
}

/// Immutable, ordered set of coins
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CoinEntry>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_pairs(BUILTIN_COINS.iter().copied())
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries: Vec<CoinEntry> = Vec::new();

        for (id, label) in pairs {
            if entries.iter().any(|e| e.id == id) {
                return Err(CatalogError::Duplicate(id.to_string()));
            }
            entries.push(CoinEntry::parse(id, label)?);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CoinEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve free text to a canonical identifier.
    ///
    /// The query is trimmed and compared case-insensitively. Exact matches on
    /// identifier, display name or ticker are tried across the whole catalog
    /// first; only then does containment in a display name count, and the
    /// first entry in catalog order wins. Short queries can therefore land on
    /// an unexpected coin (`"on"` resolves to `polygon`).
    pub fn resolve(&self, query: &str) -> Option<&CoinEntry> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|entry| entry.matches_exactly(&query))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|entry| entry.display_name.to_lowercase().contains(&query))
            })
    }

    pub fn resolve_id(&self, query: &str) -> Option<&str> {
        self.resolve(query).map(|entry| entry.id.as_str())
    }
}

fn is_slug(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('-')
        && !id.ends_with('-')
        && id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
