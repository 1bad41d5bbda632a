//! Sample listings shared by the test suites.

use tempfile::TempDir;

use super::schema::import_listings;
use super::{Listing, PropertyStore, PropertyType};

#[allow(clippy::too_many_arguments)]
fn listing(
    id: i64,
    location: &str,
    bedrooms: u32,
    bathrooms: u32,
    price: u64,
    near_mosque: bool,
    halal_financing: bool,
    property_type: PropertyType,
    coordinates: Option<(f64, f64)>,
) -> Listing {
    Listing {
        id,
        location: location.to_string(),
        bedrooms,
        bathrooms,
        price,
        near_mosque,
        halal_financing,
        property_type,
        latitude: coordinates.map(|c| c.0),
        longitude: coordinates.map(|c| c.1),
    }
}

/// Six listings around Sacramento, ordered by id.
#[rustfmt::skip]
pub(crate) fn sample_listings() -> Vec<Listing> {
    use PropertyType::*;
    vec![
        listing(1, "Sacramento, CA", 3, 2, 480_000, true, true, SingleFamily,
                Some((38.5816, -121.4944))),
        listing(2, "Sacramento, CA", 3, 2, 450_000, false, true, SingleFamily,
                Some((38.6000, -121.4500))),
        listing(3, "Elk Grove, CA", 4, 3, 620_000, true, false, SingleFamily,
                Some((38.4088, -121.3716))),
        listing(4, "Sacramento, CA", 2, 1, 310_000, true, true, Condo, Some((38.5750, -121.4800))),
        listing(5, "Davis, CA", 3, 2, 540_000, false, false, Townhouse, None),
        listing(6, "Roseville, CA", 5, 4, 890_000, true, true, MultiFamily,
                Some((38.7521, -121.2880))),
    ]
}

/// A temporary database seeded with [`sample_listings`]. Keep the `TempDir`
/// alive for as long as the store is used.
pub(crate) fn sample_store() -> (TempDir, PropertyStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("listings.db");
    import_listings(&path, &sample_listings()).expect("seed listings");
    (dir, PropertyStore::open(path))
}
