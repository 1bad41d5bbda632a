//! Listings table description.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::args::into_object;
use super::{Tool, ToolError};
use crate::store::{PropertyStore, LISTINGS_TABLE};

/// Describe the columns of the listings table.
pub struct DescribeSchema;

#[async_trait]
impl Tool for DescribeSchema {
    fn name(&self) -> &str {
        "describe_schema"
    }

    fn description(&self) -> &str {
        "Describe the columns of the property listings table: name, type, nullability, \
         default value and primary key."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value, store: &PropertyStore) -> Result<Value, ToolError> {
        if let Some(key) = into_object(args)?.keys().next() {
            return Err(ToolError::InvalidArgument(format!(
                "describe_schema takes no arguments, got '{key}'"
            )));
        }

        let columns = store.columns().await?;
        Ok(json!({
            "table": LISTINGS_TABLE,
            "columns": columns,
        }))
    }
}
