//! SQL construction for listing searches and aggregates.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use super::{Listing, PropertyType, StoreError, LISTINGS_TABLE};

/// Structured search constraints. Unset fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchCriteria {
    /// Case-insensitive substring of the listing location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_bedrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_bathrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u64>,
    /// When set, only mosque-adjacent listings match.
    pub near_mosque: bool,
    /// When set, only listings with halal financing match.
    pub halal_financing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
}

impl SearchCriteria {
    /// Build the `WHERE` clause (empty when unconstrained) and its parameters.
    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(location) = self.location.as_deref() {
            conditions.push("location LIKE ? ESCAPE '\\'");
            params.push(SqlValue::Text(format!("%{}%", escape_like(location))));
        }
        if let Some(beds) = self.min_bedrooms {
            conditions.push("bedrooms >= ?");
            params.push(SqlValue::Integer(i64::from(beds)));
        }
        if let Some(baths) = self.min_bathrooms {
            conditions.push("bathrooms >= ?");
            params.push(SqlValue::Integer(i64::from(baths)));
        }
        if let Some(price) = self.max_price {
            conditions.push("price <= ?");
            params.push(SqlValue::Integer(i64::try_from(price).unwrap_or(i64::MAX)));
        }
        if self.near_mosque {
            conditions.push("near_mosque = 1");
        }
        if self.halal_financing {
            conditions.push("halal_financing = 1");
        }
        if let Some(kind) = self.property_type {
            conditions.push("property_type = ?");
            params.push(SqlValue::Text(kind.label().to_string()));
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), params)
        }
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Aggregate statistic over matched listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Count,
    AveragePrice,
    MinPrice,
    MaxPrice,
}

impl Metric {
    pub const NAMES: [&'static str; 4] = ["count", "average_price", "min_price", "max_price"];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "count" => Some(Self::Count),
            "average_price" | "avg_price" => Some(Self::AveragePrice),
            "min_price" => Some(Self::MinPrice),
            "max_price" => Some(Self::MaxPrice),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT(*)",
            Self::AveragePrice => "AVG(price)",
            Self::MinPrice => "MIN(price)",
            Self::MaxPrice => "MAX(price)",
        }
    }
}

/// Column a grouped aggregate is broken down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    PropertyType,
    Location,
    Bedrooms,
    NearMosque,
    HalalFinancing,
}

impl Grouping {
    pub const NAMES: [&'static str; 5] = [
        "property_type",
        "location",
        "bedrooms",
        "near_mosque",
        "halal_financing",
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "property_type" => Some(Self::PropertyType),
            "location" => Some(Self::Location),
            "bedrooms" => Some(Self::Bedrooms),
            "near_mosque" => Some(Self::NearMosque),
            "halal_financing" => Some(Self::HalalFinancing),
            _ => None,
        }
    }

    /// Column name; always one of the fixed identifiers above.
    fn column(self) -> &'static str {
        match self {
            Self::PropertyType => "property_type",
            Self::Location => "location",
            Self::Bedrooms => "bedrooms",
            Self::NearMosque => "near_mosque",
            Self::HalalFinancing => "halal_financing",
        }
    }

    fn key_to_json(self, key: SqlValue) -> serde_json::Value {
        match (self, key) {
            (Self::NearMosque | Self::HalalFinancing, SqlValue::Integer(i)) => {
                serde_json::Value::Bool(i != 0)
            }
            (_, SqlValue::Integer(i)) => serde_json::Value::from(i),
            (_, SqlValue::Real(f)) => serde_json::Value::from(f),
            (_, SqlValue::Text(s)) => serde_json::Value::String(s),
            (_, SqlValue::Null) | (_, SqlValue::Blob(_)) => serde_json::Value::Null,
        }
    }
}

/// One row of a grouped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedValue {
    pub key: serde_json::Value,
    pub value: Option<f64>,
    pub listings: u64,
}

pub(super) fn search(
    conn: &Connection,
    criteria: &SearchCriteria,
    limit: Option<usize>,
) -> Result<Vec<Listing>, StoreError> {
    let (where_sql, mut params) = criteria.where_clause();
    let mut sql = format!(
        "SELECT {} FROM {LISTINGS_TABLE}{where_sql} ORDER BY price ASC, id ASC",
        Listing::COLUMNS
    );
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    tracing::debug!(sql = %sql, params = params.len(), "Searching listings");
    let mut stmt = conn.prepare(&sql)?;
    let listings = stmt
        .query_map(params_from_iter(params), Listing::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(listings)
}

pub(super) fn aggregate(
    conn: &Connection,
    criteria: &SearchCriteria,
    metric: Metric,
) -> Result<(Option<f64>, u64), StoreError> {
    let (where_sql, params) = criteria.where_clause();
    let sql = format!(
        "SELECT {}, COUNT(*) FROM {LISTINGS_TABLE}{where_sql}",
        metric.sql()
    );

    tracing::debug!(sql = %sql, "Aggregating listings");
    let (value, count): (Option<f64>, i64) =
        conn.query_row(&sql, params_from_iter(params), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    Ok((value, count.max(0) as u64))
}

pub(super) fn aggregate_grouped(
    conn: &Connection,
    criteria: &SearchCriteria,
    metric: Metric,
    grouping: Grouping,
) -> Result<Vec<GroupedValue>, StoreError> {
    let (where_sql, params) = criteria.where_clause();
    let column = grouping.column();
    let sql = format!(
        "SELECT {column}, {}, COUNT(*) FROM {LISTINGS_TABLE}{where_sql} \
         GROUP BY {column} ORDER BY {column} ASC",
        metric.sql()
    );

    tracing::debug!(sql = %sql, "Aggregating listings by group");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            let key: SqlValue = row.get(0)?;
            let value: Option<f64> = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok(GroupedValue {
                key: grouping.key_to_json(key),
                value,
                listings: count.max(0) as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::sample_store;
    use super::*;

    #[test]
    fn empty_criteria_has_no_where_clause() {
        let (sql, params) = SearchCriteria::default().where_clause();
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[tokio::test]
    async fn max_price_bounds_every_result() {
        let (_dir, store) = sample_store();
        let criteria = SearchCriteria {
            max_price: Some(500_000),
            ..Default::default()
        };
        let listings = store.search(&criteria, None).await.unwrap();
        assert!(!listings.is_empty());
        assert!(listings.iter().all(|l| l.price <= 500_000));
    }

    #[tokio::test]
    async fn adding_constraints_never_grows_the_result() {
        let (_dir, store) = sample_store();
        let steps = [
            SearchCriteria::default(),
            SearchCriteria {
                location: Some("sacramento".to_string()),
                ..Default::default()
            },
            SearchCriteria {
                location: Some("sacramento".to_string()),
                min_bedrooms: Some(3),
                ..Default::default()
            },
            SearchCriteria {
                location: Some("sacramento".to_string()),
                min_bedrooms: Some(3),
                near_mosque: true,
                ..Default::default()
            },
        ];

        let mut previous = usize::MAX;
        for criteria in &steps {
            let count = store.search(criteria, None).await.unwrap().len();
            assert!(count <= previous, "{criteria:?} grew the result set");
            previous = count;
        }
    }

    #[tokio::test]
    async fn near_mosque_only_constrains_when_set() {
        let (_dir, store) = sample_store();
        let all = store.search(&SearchCriteria::default(), None).await.unwrap();
        let near = store
            .search(
                &SearchCriteria {
                    near_mosque: true,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        for listing in all.iter().filter(|l| l.near_mosque) {
            assert!(near.contains(listing));
        }
        assert!(near.iter().all(|l| l.near_mosque));
        assert!(all.iter().any(|l| !l.near_mosque));
    }

    #[tokio::test]
    async fn mosque_adjacent_three_bedroom_under_budget() {
        let (_dir, store) = sample_store();
        let criteria = SearchCriteria {
            min_bedrooms: Some(3),
            max_price: Some(500_000),
            near_mosque: true,
            property_type: Some(PropertyType::SingleFamily),
            ..Default::default()
        };
        let listings = store.search(&criteria, None).await.unwrap();
        let ids: Vec<_> = listings.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(listings[0].price, 480_000);
    }

    #[tokio::test]
    async fn results_are_cheapest_first_and_limited() {
        let (_dir, store) = sample_store();
        let listings = store.search(&SearchCriteria::default(), Some(3)).await.unwrap();
        assert_eq!(listings.len(), 3);
        assert!(listings.windows(2).all(|w| w[0].price <= w[1].price));
    }

    #[tokio::test]
    async fn average_over_empty_selection_is_none() {
        let (_dir, store) = sample_store();
        let criteria = SearchCriteria {
            max_price: Some(1),
            ..Default::default()
        };
        let (value, count) = store.aggregate(&criteria, Metric::AveragePrice).await.unwrap();
        assert_eq!(value, None);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn grouped_counts_cover_every_listing() {
        let (_dir, store) = sample_store();
        let groups = store
            .aggregate_grouped(&SearchCriteria::default(), Metric::Count, Grouping::NearMosque)
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, serde_json::json!(false));
        assert_eq!(groups[1].key, serde_json::json!(true));
        let total: u64 = groups.iter().map(|g| g.listings).sum();
        assert_eq!(total, store.count().await.unwrap());
    }
}
