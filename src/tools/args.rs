//! Argument parsing and validation shared by the query tools.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::ToolError;
use crate::store::{PropertyType, SearchCriteria};

/// Upper bound accepted for bedroom/bathroom minimums.
const MAX_ROOMS: i64 = 50;

/// Raw search filters as the model supplies them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub location: Option<String>,
    pub min_bedrooms: Option<i64>,
    pub min_bathrooms: Option<i64>,
    pub max_price: Option<f64>,
    pub near_mosque: Option<bool>,
    pub halal_financing: Option<bool>,
    pub property_type: Option<String>,
}

impl SearchArgs {
    /// Validate ranges and convert into store criteria.
    pub fn into_criteria(self) -> Result<SearchCriteria, ToolError> {
        let location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let property_type = match self.property_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("any") => None,
            Some(s) => Some(
                s.parse::<PropertyType>()
                    .map_err(|e| ToolError::InvalidArgument(e.to_string()))?,
            ),
        };

        Ok(SearchCriteria {
            location,
            min_bedrooms: self
                .min_bedrooms
                .map(|v| room_count("min_bedrooms", v))
                .transpose()?,
            min_bathrooms: self
                .min_bathrooms
                .map(|v| room_count("min_bathrooms", v))
                .transpose()?,
            max_price: self.max_price.map(|v| price("max_price", v)).transpose()?,
            near_mosque: self.near_mosque.unwrap_or(false),
            halal_financing: self.halal_financing.unwrap_or(false),
            property_type,
        })
    }
}

/// JSON Schema properties for the shared search filters.
pub(super) fn filter_properties() -> Map<String, Value> {
    let schema = json!({
        "location": {
            "type": "string",
            "description":
                "City or area; matched case-insensitively as a substring (e.g. 'Sacramento')"
        },
        "min_bedrooms": {
            "type": "integer",
            "minimum": 0,
            "description": "Minimum number of bedrooms"
        },
        "min_bathrooms": {
            "type": "integer",
            "minimum": 0,
            "description": "Minimum number of bathrooms"
        },
        "max_price": {
            "type": "number",
            "minimum": 0,
            "description": "Maximum listing price in dollars"
        },
        "near_mosque": {
            "type": "boolean",
            "description": "If true, only properties near a mosque"
        },
        "halal_financing": {
            "type": "boolean",
            "description": "If true, only properties with halal financing available"
        },
        "property_type": {
            "type": "string",
            "enum": ["Any", "Single Family", "Townhouse", "Condo", "Multi-Family"],
            "description": "Property type; 'Any' for no constraint"
        }
    });
    match schema {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Arguments as an object; `null` (no arguments) is an empty object.
pub(super) fn into_object(args: Value) -> Result<Map<String, Value>, ToolError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(ToolError::InvalidArgument(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}

/// Deserialize a whole argument object.
pub(super) fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let object = into_object(args)?;
    serde_json::from_value(Value::Object(object)).map_err(invalid)
}

/// Split tool-specific keys off the shared search filters.
pub(super) fn split_filters<T: DeserializeOwned>(
    args: Value,
    own_keys: &[&str],
) -> Result<(T, SearchCriteria), ToolError> {
    let mut filters = into_object(args)?;
    let mut own = Map::new();
    for key in own_keys {
        if let Some(value) = filters.remove(*key) {
            own.insert((*key).to_string(), value);
        }
    }

    let own: T = serde_json::from_value(Value::Object(own)).map_err(invalid)?;
    let filters: SearchArgs = serde_json::from_value(Value::Object(filters)).map_err(invalid)?;
    Ok((own, filters.into_criteria()?))
}

pub(super) fn invalid(e: serde_json::Error) -> ToolError {
    ToolError::InvalidArgument(e.to_string())
}

pub(super) fn room_count(name: &str, value: i64) -> Result<u32, ToolError> {
    if !(0..=MAX_ROOMS).contains(&value) {
        return Err(ToolError::InvalidArgument(format!(
            "{name} must be between 0 and {MAX_ROOMS}, got {value}"
        )));
    }
    Ok(value as u32)
}

pub(super) fn price(name: &str, value: f64) -> Result<u64, ToolError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ToolError::InvalidArgument(format!(
            "{name} must be a non-negative amount, got {value}"
        )));
    }
    Ok(value.floor() as u64)
}
