//! Loading a Yelp business-search export into the record store and
//! producing the matching bulk-index file for the search cluster.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use concierge_core::domain::restaurant::{BusinessId, Coordinates, RestaurantRecord};

use crate::repositories::{RepositoryError, SqlRestaurantRepository};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("dataset is not valid business-search JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("category must not be empty")]
    EmptyCategory,
    #[error("business at position {position} has an empty id")]
    MissingBusinessId { position: usize },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Deserialize)]
struct Dataset {
    data: DatasetData,
}

#[derive(Debug, Deserialize)]
struct DatasetData {
    search: DatasetSearch,
}

#[derive(Debug, Deserialize)]
struct DatasetSearch {
    #[serde(default)]
    business: Vec<Business>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Business {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: BusinessLocation,
    pub coordinates: BusinessCoordinates,
    pub rating: Decimal,
    #[serde(default)]
    pub review_count: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BusinessLocation {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BusinessCoordinates {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub parsed: usize,
    pub written: usize,
}

pub fn parse_dataset(raw: &str) -> Result<Vec<Business>, IngestError> {
    let dataset: Dataset = serde_json::from_str(raw)?;
    Ok(dataset.data.search.business)
}

/// Every record in one dataset carries the same category; the export is
/// produced per cuisine.
pub fn to_records(
    businesses: &[Business],
    category: &str,
    inserted_at: DateTime<Utc>,
) -> Result<Vec<RestaurantRecord>, IngestError> {
    let category = category.trim();
    if category.is_empty() {
        return Err(IngestError::EmptyCategory);
    }

    businesses
        .iter()
        .enumerate()
        .map(|(position, business)| {
            if business.id.trim().is_empty() {
                return Err(IngestError::MissingBusinessId { position });
            }
            Ok(RestaurantRecord {
                business_id: BusinessId(business.id.clone()),
                name: business.name.clone(),
                address: business.location.address1.clone().unwrap_or_default(),
                coordinates: Coordinates {
                    latitude: business.coordinates.latitude,
                    longitude: business.coordinates.longitude,
                },
                rating: business.rating,
                number_of_reviews: business.review_count,
                zip_code: business.location.postal_code.clone().unwrap_or_default(),
                categories: category.to_string(),
                inserted_at,
            })
        })
        .collect()
}

/// Newline-delimited bulk body: an action line then a source line per
/// record, with document ids counting up from `id_offset`.
pub fn bulk_index_ndjson(records: &[RestaurantRecord], index: &str, id_offset: u64) -> String {
    let mut output = String::new();
    for (position, record) in records.iter().enumerate() {
        let action = json!({ "index": { "_index": index, "_id": id_offset + position as u64 } });
        let source = json!({
            "business_id": record.business_id.0,
            "categories": record.categories,
        });
        let _ = writeln!(output, "{action}");
        let _ = writeln!(output, "{source}");
    }
    output
}

pub async fn load_dataset(
    repository: &SqlRestaurantRepository,
    raw: &str,
    category: &str,
    inserted_at: DateTime<Utc>,
) -> Result<(IngestReport, Vec<RestaurantRecord>), IngestError> {
    let businesses = parse_dataset(raw)?;
    let records = to_records(&businesses, category, inserted_at)?;
    let written = repository.upsert_many(&records).await?;
    Ok((IngestReport { parsed: businesses.len(), written }, records))
}
