//! Listing search tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::args::{filter_properties, split_filters};
use super::{Tool, ToolError};
use crate::store::PropertyStore;

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Search listings by structured criteria.
pub struct SearchProperties;

#[derive(Debug, Default, Deserialize)]
struct Paging {
    limit: Option<i64>,
}

#[async_trait]
impl Tool for SearchProperties {
    fn name(&self) -> &str {
        "search_properties"
    }

    fn description(&self) -> &str {
        "Search property listings. Every filter is optional; omitted filters impose no \
         constraint. Returns matching listings, cheapest first."
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = filter_properties();
        properties.insert(
            "limit".to_string(),
            json!({
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_SEARCH_LIMIT,
                "description": format!(
                    "Maximum listings to return (default: {DEFAULT_SEARCH_LIMIT})"
                )
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": []
        })
    }

    async fn execute(&self, args: Value, store: &PropertyStore) -> Result<Value, ToolError> {
        let (paging, criteria): (Paging, _) = split_filters(args, &["limit"])?;
        let limit = match paging.limit {
            None => DEFAULT_SEARCH_LIMIT,
            Some(n) if (1..=MAX_SEARCH_LIMIT as i64).contains(&n) => n as usize,
            Some(n) => {
                return Err(ToolError::InvalidArgument(format!(
                    "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {n}"
                )))
            }
        };

        let listings = store.search(&criteria, Some(limit)).await?;
        Ok(json!({
            "count": listings.len(),
            "criteria": criteria,
            "listings": listings,
        }))
    }
}
