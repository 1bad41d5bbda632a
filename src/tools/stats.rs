//! Aggregate statistics over listings.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::args::{filter_properties, split_filters};
use super::{Tool, ToolError};
use crate::store::{Grouping, Metric, PropertyStore};

/// Count, average, minimum or maximum price, optionally grouped.
pub struct PropertyStatistics;

#[derive(Debug, Deserialize)]
struct StatsArgs {
    metric: Option<String>,
    group_by: Option<String>,
}

#[async_trait]
impl Tool for PropertyStatistics {
    fn name(&self) -> &str {
        "property_statistics"
    }

    fn description(&self) -> &str {
        "Compute a statistic (count, average_price, min_price, max_price) over listings \
         matching optional filters, optionally grouped by property_type, location, bedrooms, \
         near_mosque or halal_financing."
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = filter_properties();
        properties.insert(
            "metric".to_string(),
            json!({
                "type": "string",
                "enum": Metric::NAMES,
                "description": "Statistic to compute"
            }),
        );
        properties.insert(
            "group_by".to_string(),
            json!({
                "type": "string",
                "enum": Grouping::NAMES,
                "description": "Optional column to break the statistic down by"
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": ["metric"]
        })
    }

    async fn execute(&self, args: Value, store: &PropertyStore) -> Result<Value, ToolError> {
        let (own, criteria): (StatsArgs, _) = split_filters(args, &["metric", "group_by"])?;

        let metric_name = own
            .metric
            .ok_or_else(|| ToolError::InvalidArgument("missing 'metric' argument".to_string()))?;
        let metric = Metric::parse(&metric_name).ok_or_else(|| {
            ToolError::InvalidArgument(format!(
                "unknown metric '{metric_name}' (expected one of: {})",
                Metric::NAMES.join(", ")
            ))
        })?;
        let grouping = own
            .group_by
            .map(|name| {
                Grouping::parse(&name).ok_or_else(|| {
                    ToolError::InvalidArgument(format!(
                        "unknown group_by '{name}' (expected one of: {})",
                        Grouping::NAMES.join(", ")
                    ))
                })
            })
            .transpose()?;

        match grouping {
            None => {
                let (value, listings) = store.aggregate(&criteria, metric).await?;
                Ok(json!({
                    "metric": metric,
                    "value": metric_value(metric, value),
                    "listings": listings,
                    "criteria": criteria,
                }))
            }
            Some(grouping) => {
                let groups: Vec<Value> = store
                    .aggregate_grouped(&criteria, metric, grouping)
                    .await?
                    .into_iter()
                    .map(|g| {
                        json!({
                            "key": g.key,
                            "value": metric_value(metric, g.value),
                            "listings": g.listings,
                        })
                    })
                    .collect();
                Ok(json!({
                    "metric": metric,
                    "group_by": grouping,
                    "groups": groups,
                    "criteria": criteria,
                }))
            }
        }
    }
}

/// Averages keep two decimals; everything else is a whole number.
fn metric_value(metric: Metric, value: Option<f64>) -> Value {
    match (metric, value) {
        (Metric::Count, v) => json!(v.unwrap_or(0.0).round() as u64),
        (_, None) => Value::Null,
        (Metric::AveragePrice, Some(v)) => json!((v * 100.0).round() / 100.0),
        (_, Some(v)) => json!(v.round() as u64),
    }
}
