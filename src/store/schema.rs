//! Listings table layout and bulk import.
//!
//! The assistant itself never writes to the store; these helpers exist for
//! whatever seeds the database file.

use std::path::Path;

use rusqlite::{params, Connection};

use super::{Listing, StoreError, LISTINGS_TABLE};

pub const CREATE_LISTINGS_TABLE: &str = "CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY,
    location TEXT NOT NULL,
    bedrooms INTEGER NOT NULL CHECK (bedrooms >= 0),
    bathrooms INTEGER NOT NULL CHECK (bathrooms >= 0),
    price INTEGER NOT NULL CHECK (price >= 0),
    near_mosque INTEGER NOT NULL DEFAULT 0,
    halal_financing INTEGER NOT NULL DEFAULT 0,
    property_type TEXT NOT NULL,
    latitude REAL,
    longitude REAL
)";

/// Create (if needed) the listings table in the database at `path` and insert
/// `listings` in one transaction. Returns the number of rows written.
pub fn import_listings(path: &Path, listings: &[Listing]) -> Result<usize, StoreError> {
    let mut conn = Connection::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.execute(CREATE_LISTINGS_TABLE, [])?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {LISTINGS_TABLE} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            Listing::COLUMNS
        ))?;
        for listing in listings {
            stmt.execute(params![
                listing.id,
                listing.location,
                listing.bedrooms,
                listing.bathrooms,
                i64::try_from(listing.price).unwrap_or(i64::MAX),
                listing.near_mosque,
                listing.halal_financing,
                listing.property_type.label(),
                listing.latitude,
                listing.longitude,
            ])?;
        }
    }
    tx.commit()?;

    tracing::info!(path = %path.display(), rows = listings.len(), "Imported listings");
    Ok(listings.len())
}
