// Category selection for the bet prompt: per-user weighted preferences with a
// shared default.
use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CATEGORIES: [&str; 4] = ["ELECTION", "SPORTS", "CRYPTO", "TV"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeight {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryWeights(pub Vec<CategoryWeight>);

impl Default for CategoryWeights {
    fn default() -> Self {
        Self::uniform(DEFAULT_CATEGORIES)
    }
}

impl CategoryWeights {
    pub fn uniform<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let weight = if names.is_empty() {
            0.0
        } else {
            1.0 / names.len() as f64
        };
        Self(
            names
                .into_iter()
                .map(|name| CategoryWeight { name, weight })
                .collect(),
        )
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(name, weight)| CategoryWeight {
                    name: name.into(),
                    weight,
                })
                .collect(),
        )
    }

    /// Turns per-category bet counts into probabilities, in first-seen order.
    ///
    /// Repeated names are summed and zero counts dropped, so a user with no
    /// bets yields an empty list.
    pub fn from_bet_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut frequencies: Vec<(String, u64)> = Vec::new();
        for (name, count) in counts {
            let name = name.into();
            match frequencies.iter_mut().find(|(known, _)| *known == name) {
                Some((_, total)) => *total += count,
                None => frequencies.push((name, count)),
            }
        }
        frequencies.retain(|(_, count)| *count > 0);

        let total: u64 = frequencies.iter().map(|(_, count)| count).sum();
        Self(
            frequencies
                .into_iter()
                .map(|(name, count)| CategoryWeight {
                    name,
                    weight: count as f64 / total as f64,
                })
                .collect(),
        )
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|entry| entry.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Category list as stored in session state; renders one name per line.
    pub fn to_state_value(&self) -> Value {
        Value::Array(self.names().map(|name| Value::String(name.to_string())).collect())
    }
}

/// Draws a category with probability proportional to its weight.
///
/// Non-positive weights are never drawn. When no weight is positive the first
/// category is returned; `None` only for an empty list.
pub fn weighted_sample<'a, R: Rng + ?Sized>(
    weights: &'a CategoryWeights,
    rng: &mut R,
) -> Option<&'a str> {
    let first = weights.0.first()?;
    let total: f64 = weights
        .0
        .iter()
        .filter(|entry| entry.weight > 0.0)
        .map(|entry| entry.weight)
        .sum();
    if total <= 0.0 {
        return Some(first.name.as_str());
    }

    let mut remaining = rng.random::<f64>() * total;
    let mut last_positive = first;
    for entry in weights.0.iter().filter(|entry| entry.weight > 0.0) {
        remaining -= entry.weight;
        last_positive = entry;
        if remaining <= 0.0 {
            return Some(entry.name.as_str());
        }
    }
    // Rounding can leave a sliver above zero.
    Some(last_positive.name.as_str())
}

// Address of the local development account, which ships with an
// election-leaning preference.
pub const DEV_ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

// Per-address category preferences, falling back to `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPreferences {
    #[serde(default)]
    pub default: CategoryWeights,
    #[serde(default)]
    pub by_user: BTreeMap<String, CategoryWeights>,
}

impl Default for CategoryPreferences {
    fn default() -> Self {
        let mut by_user = BTreeMap::new();
        by_user.insert(
            DEV_ACCOUNT.to_string(),
            CategoryWeights::from_pairs([
                ("ELECTION", 0.7),
                ("SPORTS", 0.2),
                ("CRYPTO", 0.1),
                ("TV", 0.0),
            ]),
        );
        Self {
            default: CategoryWeights::default(),
            by_user,
        }
    }
}

impl CategoryPreferences {
    // Replaces an address's weights, e.g. with ones derived from its bet history.
    pub fn set_user(&mut self, address: impl Into<String>, weights: CategoryWeights) {
        self.by_user.insert(address.into(), weights);
    }

    pub fn for_user(&self, address: &str) -> &CategoryWeights {
        self.by_user
            .get(address)
            .or_else(|| {
                self.by_user
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(address))
                    .map(|(_, weights)| weights)
            })
            .unwrap_or(&self.default)
    }

    pub fn pick<R: Rng + ?Sized>(&self, address: &str, rng: &mut R) -> Option<String> {
        weighted_sample(self.for_user(address), rng).map(str::to_string)
    }
}

/// `0x` followed by exactly 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
