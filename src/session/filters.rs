//! Sidebar filter selection.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::store::PropertyType;

pub const BEDROOM_RANGE: RangeInclusive<i64> = 1..=10;
pub const BATHROOM_RANGE: RangeInclusive<i64> = 1..=6;
pub const PRICE_RANGE: RangeInclusive<i64> = 100_000..=2_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter: {0}")]
pub struct InvalidFilter(pub String);

/// Structured search constraints chosen in the filter form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    /// Forward the filters with each message; otherwise the agent works from chat alone.
    pub use_filters: bool,
    pub location: String,
    pub min_bedrooms: u32,
    pub min_bathrooms: u32,
    pub max_price: u64,
    pub near_mosque: bool,
    pub halal_financing: bool,
    /// `None` means any type.
    pub property_type: Option<PropertyType>,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            use_filters: false,
            location: "Sacramento".to_string(),
            min_bedrooms: 3,
            min_bathrooms: 2,
            max_price: 500_000,
            near_mosque: true,
            halal_financing: true,
            property_type: None,
        }
    }
}

/// Partial update from the filter form. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterUpdate {
    pub use_filters: Option<bool>,
    pub location: Option<String>,
    pub min_bedrooms: Option<i64>,
    pub min_bathrooms: Option<i64>,
    pub max_price: Option<i64>,
    pub near_mosque: Option<bool>,
    pub halal_financing: Option<bool>,
    /// "Any" clears the constraint.
    pub property_type: Option<String>,
}

impl FilterSelection {
    /// Apply `update` to a copy. On error the receiver is untouched.
    pub fn apply(&self, update: FilterUpdate) -> Result<FilterSelection, InvalidFilter> {
        let mut next = self.clone();

        if let Some(v) = update.use_filters {
            next.use_filters = v;
        }
        if let Some(location) = update.location {
            next.location = location.trim().to_string();
        }
        if let Some(v) = update.min_bedrooms {
            next.min_bedrooms = in_range("min_bedrooms", v, BEDROOM_RANGE)? as u32;
        }
        if let Some(v) = update.min_bathrooms {
            next.min_bathrooms = in_range("min_bathrooms", v, BATHROOM_RANGE)? as u32;
        }
        if let Some(v) = update.max_price {
            next.max_price = in_range("max_price", v, PRICE_RANGE)? as u64;
        }
        if let Some(v) = update.near_mosque {
            next.near_mosque = v;
        }
        if let Some(v) = update.halal_financing {
            next.halal_financing = v;
        }
        if let Some(kind) = update.property_type {
            let kind = kind.trim();
            next.property_type = if kind.is_empty() || kind.eq_ignore_ascii_case("any") {
                None
            } else {
                Some(kind.parse().map_err(|e| InvalidFilter(format!("{e}")))?)
            };
        }

        Ok(next)
    }

    /// `search_properties` arguments equivalent to this selection.
    pub fn to_search_args(&self) -> Value {
        let mut args = json!({
            "min_bedrooms": self.min_bedrooms,
            "min_bathrooms": self.min_bathrooms,
            "max_price": self.max_price,
            "near_mosque": self.near_mosque,
            "halal_financing": self.halal_financing,
        });
        let location = self.location.trim();
        if !location.is_empty() {
            args["location"] = json!(location);
        }
        if let Some(kind) = self.property_type {
            args["property_type"] = json!(kind.label());
        }
        args
    }
}

fn in_range(name: &str, value: i64, range: RangeInclusive<i64>) -> Result<i64, InvalidFilter> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(InvalidFilter(format!(
            "{name} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}
