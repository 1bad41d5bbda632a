//! Best-deal search: cheapest listings, optionally near a reference point.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::args::{parse, price, room_count};
use super::{Tool, ToolError};
use crate::store::{PropertyStore, SearchCriteria};

const DEFAULT_MAX_PRICE: u64 = 500_000;
const DEFAULT_MIN_BEDROOMS: u32 = 3;
const DEFAULT_MAX_DISTANCE_KM: f64 = 10.0;
const MAX_DEALS: usize = 10;
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Find the cheapest listings that meet a budget and bedroom count.
pub struct FindBestDeals;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DealsArgs {
    max_price: Option<f64>,
    min_bedrooms: Option<i64>,
    reference_latitude: Option<f64>,
    reference_longitude: Option<f64>,
    max_distance_km: Option<f64>,
}

#[async_trait]
impl Tool for FindBestDeals {
    fn name(&self) -> &str {
        "find_best_deals"
    }

    fn description(&self) -> &str {
        "Find the best deals: the cheapest listings within a budget and bedroom minimum, \
         optionally within a distance of a reference point. Returns up to 10 listings."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_price": {
                    "type": "number",
                    "minimum": 0,
                    "description": format!("Maximum price (default: {DEFAULT_MAX_PRICE})")
                },
                "min_bedrooms": {
                    "type": "integer",
                    "minimum": 0,
                    "description": format!("Minimum bedrooms (default: {DEFAULT_MIN_BEDROOMS})")
                },
                "reference_latitude": {
                    "type": "number",
                    "description": "Latitude of the reference point (requires reference_longitude)"
                },
                "reference_longitude": {
                    "type": "number",
                    "description": "Longitude of the reference point (requires reference_latitude)"
                },
                "max_distance_km": {
                    "type": "number",
                    "description": format!(
                        "Maximum distance from the reference point in km \
                         (default: {DEFAULT_MAX_DISTANCE_KM}, requires a reference point)"
                    )
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, store: &PropertyStore) -> Result<Value, ToolError> {
        let args: DealsArgs = parse(args)?;

        let criteria = SearchCriteria {
            max_price: Some(
                args.max_price
                    .map(|v| price("max_price", v))
                    .transpose()?
                    .unwrap_or(DEFAULT_MAX_PRICE),
            ),
            min_bedrooms: Some(
                args.min_bedrooms
                    .map(|v| room_count("min_bedrooms", v))
                    .transpose()?
                    .unwrap_or(DEFAULT_MIN_BEDROOMS),
            ),
            ..Default::default()
        };

        let reference = match (args.reference_latitude, args.reference_longitude) {
            (None, None) => None,
            (Some(lat), Some(lon)) => Some(validate_point(lat, lon)?),
            _ => {
                return Err(ToolError::InvalidArgument(
                    "reference_latitude and reference_longitude must be given together"
                        .to_string(),
                ))
            }
        };

        let max_distance = match (args.max_distance_km, reference) {
            (Some(_), None) => {
                return Err(ToolError::InvalidArgument(
                    "max_distance_km requires reference_latitude and reference_longitude"
                        .to_string(),
                ))
            }
            (Some(d), Some(_)) if !d.is_finite() || d <= 0.0 => {
                return Err(ToolError::InvalidArgument(format!(
                    "max_distance_km must be positive, got {d}"
                )))
            }
            (distance, _) => distance.unwrap_or(DEFAULT_MAX_DISTANCE_KM),
        };

        let deals: Vec<Value> = match reference {
            None => store
                .search(&criteria, Some(MAX_DEALS))
                .await?
                .into_iter()
                .map(|listing| json!(listing))
                .collect(),
            Some(origin) => store
                .search(&criteria, None)
                .await?
                .into_iter()
                .filter_map(|listing| {
                    let distance = haversine_km(origin, listing.coordinates()?);
                    (distance <= max_distance).then_some((listing, distance))
                })
                .take(MAX_DEALS)
                .map(|(listing, distance)| {
                    let mut value = json!(listing);
                    value["distance_km"] = json!((distance * 100.0).round() / 100.0);
                    value
                })
                .collect(),
        };

        Ok(json!({
            "count": deals.len(),
            "deals": deals,
        }))
    }
}

fn validate_point(lat: f64, lon: f64) -> Result<(f64, f64), ToolError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ToolError::InvalidArgument(format!(
            "reference_latitude must be between -90 and 90, got {lat}"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ToolError::InvalidArgument(format!(
            "reference_longitude must be between -180 and 180, got {lon}"
        )));
    }
    Ok((lat, lon))
}

/// Great-circle distance between two `(latitude, longitude)` points in km.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}
