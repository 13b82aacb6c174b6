use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use strum_macros::Display;

pub const MIN_OUTCOMES: usize = 2;
pub const MAX_CATEGORICAL_OUTCOMES: usize = 9;

// The two market shapes a proposal can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarketType {
    Binary,
    Categorical,
}

impl MarketType {
    // Exact wire names only, plus the older "n-way" spelling of categorical.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "binary" => Some(MarketType::Binary),
            "categorical" | "n-way" => Some(MarketType::Categorical),
            _ => None,
        }
    }

    pub fn outcome_bounds(self) -> RangeInclusive<usize> {
        match self {
            MarketType::Binary => MIN_OUTCOMES..=MIN_OUTCOMES,
            MarketType::Categorical => MIN_OUTCOMES..=MAX_CATEGORICAL_OUTCOMES,
        }
    }
}

/// A validated prediction-market bet proposal.
///
/// Instances built by the validator always satisfy the outcome-count,
/// outcome-uniqueness and future-deadline rules for their market type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketProposal {
    pub question: String,
    #[serde(rename = "type")]
    pub market_type: MarketType,
    pub outcomes: Vec<String>,
    pub tags: Vec<String>,
    pub resolution_source: String,
    pub deadline: NaiveDate,
    pub creator: String,
}

impl MarketProposal {
    pub fn is_binary(&self) -> bool {
        self.market_type == MarketType::Binary
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
