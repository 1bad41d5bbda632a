//! Property store - read-only access to the SQLite listings table.
//!
//! Every query opens its own read-only connection on the blocking pool, so the
//! store is cheap to clone and safe to share between sessions.

mod query;
pub mod schema;

#[cfg(test)]
pub(crate) mod fixtures;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::StoreConfig;

pub use query::{Grouping, GroupedValue, Metric, SearchCriteria};

/// Name of the listings table.
pub const LISTINGS_TABLE: &str = "listings";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open listings database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("listings query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("listings query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Category of a listed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyType {
    SingleFamily,
    Townhouse,
    Condo,
    MultiFamily,
}

impl PropertyType {
    pub const ALL: [PropertyType; 4] = [
        PropertyType::SingleFamily,
        PropertyType::Townhouse,
        PropertyType::Condo,
        PropertyType::MultiFamily,
    ];

    /// Label stored in the database and shown to users.
    pub fn label(self) -> &'static str {
        match self {
            Self::SingleFamily => "Single Family",
            Self::Townhouse => "Townhouse",
            Self::Condo => "Condo",
            Self::MultiFamily => "Multi-Family",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unknown property type '{0}' (expected one of: Single Family, Townhouse, Condo, Multi-Family)"
)]
pub struct ParsePropertyTypeError(pub String);

impl FromStr for PropertyType {
    type Err = ParsePropertyTypeError;

    /// Accepts display labels, snake_case and kebab-case, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "singlefamily" | "house" => Ok(Self::SingleFamily),
            "townhouse" | "townhome" => Ok(Self::Townhouse),
            "condo" | "condominium" => Ok(Self::Condo),
            "multifamily" => Ok(Self::MultiFamily),
            _ => Err(ParsePropertyTypeError(s.to_string())),
        }
    }
}

impl Serialize for PropertyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for PropertyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One property record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub location: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    /// Asking price in whole currency units
    pub price: u64,
    pub near_mosque: bool,
    pub halal_financing: bool,
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Listing {
    pub(crate) const COLUMNS: &'static str = "id, location, bedrooms, bathrooms, price, \
         near_mosque, halal_financing, property_type, latitude, longitude";

    /// Map a row selected with [`Listing::COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let type_label: String = row.get(7)?;
        let property_type = type_label
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

        Ok(Self {
            id: row.get(0)?,
            location: row.get(1)?,
            bedrooms: non_negative(row, 2)?,
            bathrooms: non_negative(row, 3)?,
            price: non_negative(row, 4)?,
            near_mosque: row.get(5)?,
            halal_financing: row.get(6)?,
            property_type,
            latitude: row.get(8)?,
            longitude: row.get(9)?,
        })
    }

    /// Both coordinates, when the listing has them.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

fn non_negative<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: TryFrom<i64>,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    let raw: i64 = row.get(idx)?;
    T::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

/// Column description from `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Read-only handle to the listings database.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    path: Arc<PathBuf>,
}

impl PropertyStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self::open(&config.database_path)
    }

    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of listings in the store. Used as a startup probe.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.with_connection(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {LISTINGS_TABLE}"), [], |row| {
                    row.get(0)
                })?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Listings matching `criteria`, cheapest first.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        limit: Option<usize>,
    ) -> Result<Vec<Listing>, StoreError> {
        let criteria = criteria.clone();
        self.with_connection(move |conn| query::search(conn, &criteria, limit))
            .await
    }

    /// A single aggregate over the listings matching `criteria`.
    ///
    /// Returns the metric value (`None` for price metrics over an empty
    /// selection) and the number of matched listings.
    pub async fn aggregate(
        &self,
        criteria: &SearchCriteria,
        metric: Metric,
    ) -> Result<(Option<f64>, u64), StoreError> {
        let criteria = criteria.clone();
        self.with_connection(move |conn| query::aggregate(conn, &criteria, metric))
            .await
    }

    /// The metric computed per group.
    pub async fn aggregate_grouped(
        &self,
        criteria: &SearchCriteria,
        metric: Metric,
        grouping: Grouping,
    ) -> Result<Vec<GroupedValue>, StoreError> {
        let criteria = criteria.clone();
        self.with_connection(move |conn| {
            query::aggregate_grouped(conn, &criteria, metric, grouping)
        })
        .await
    }

    /// Column layout of the listings table.
    pub async fn columns(&self) -> Result<Vec<ColumnInfo>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({LISTINGS_TABLE})"))?;
            let columns = stmt
                .query_map([], |row| {
                    let not_null: i64 = row.get(3)?;
                    let pk: i64 = row.get(5)?;
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                        nullable: not_null == 0,
                        default: row.get(4)?,
                        primary_key: pk > 0,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(columns)
        })
        .await
    }

    async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            f(&conn)
        })
        .await?
    }
}

fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}
