use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusinessId(pub String);

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRecord {
    pub business_id: BusinessId,
    pub name: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub rating: Decimal,
    pub number_of_reviews: Option<u32>,
    pub zip_code: String,
    pub categories: String,
    pub inserted_at: DateTime<Utc>,
}

/// A single ranked hit from the search index. Only the key is needed to
/// enrich it from the record store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub business_id: BusinessId,
    #[serde(default)]
    pub categories: Option<String>,
}
