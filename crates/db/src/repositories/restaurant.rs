use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::restaurant::{BusinessId, Coordinates, RestaurantRecord, SearchHit};
use concierge_core::ports::{
    Collaborator, CollaboratorError, RecordStore, SearchIndex, SearchQuery,
};

use super::{format_timestamp, parse_timestamp, parse_u32, RepositoryError};
use crate::DbPool;

/// SQLite-backed record store. It doubles as a local search index that
/// matches the query value as a case-insensitive substring of one column.
pub struct SqlRestaurantRepository {
    pool: DbPool,
}

impl SqlRestaurantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<RestaurantRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                business_id,
                name,
                address,
                latitude,
                longitude,
                rating,
                number_of_reviews,
                zip_code,
                categories,
                inserted_at
             FROM restaurant
             WHERE business_id = ?",
        )
        .bind(&business_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(restaurant_from_row).transpose()
    }

    pub async fn upsert(&self, record: &RestaurantRecord) -> Result<(), RepositoryError> {
        upsert_query(record).execute(&self.pool).await?;
        Ok(())
    }

    /// Writes every record in one transaction; either all land or none do.
    pub async fn upsert_many(&self, records: &[RestaurantRecord]) -> Result<usize, RepositoryError> {
        let mut transaction = self.pool.begin().await?;
        for record in records {
            upsert_query(record).execute(&mut *transaction).await?;
        }
        transaction.commit().await?;
        Ok(records.len())
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        let count = sqlx::query("SELECT COUNT(*) AS count FROM restaurant")
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("count")?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    pub async fn search_candidates(
        &self,
        match_field: &str,
        value: &str,
        size: u32,
    ) -> Result<Vec<SearchHit>, RepositoryError> {
        let sql = match match_field {
            "categories" => {
                "SELECT business_id, categories FROM restaurant
                 WHERE lower(categories) LIKE '%' || lower(?) || '%'
                 ORDER BY business_id ASC
                 LIMIT ?"
            }
            "name" => {
                "SELECT business_id, categories FROM restaurant
                 WHERE lower(name) LIKE '%' || lower(?) || '%'
                 ORDER BY business_id ASC
                 LIMIT ?"
            }
            other => {
                return Err(RepositoryError::Decode(format!(
                    "unsupported match field `{other}` (expected categories|name)"
                )))
            }
        };

        let rows =
            sqlx::query(sql).bind(value.trim()).bind(i64::from(size)).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                Ok(SearchHit {
                    business_id: BusinessId(row.try_get("business_id")?),
                    categories: row.try_get("categories")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RecordStore for SqlRestaurantRepository {
    async fn get_by_key(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<RestaurantRecord>, CollaboratorError> {
        self.find_by_id(business_id)
            .await
            .map_err(|error| error.into_collaborator(Collaborator::RecordStore))
    }
}

#[async_trait]
impl SearchIndex for SqlRestaurantRepository {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CollaboratorError> {
        self.search_candidates(&query.match_field, &query.value, query.size)
            .await
            .map_err(|error| error.into_collaborator(Collaborator::Search))
    }
}

fn upsert_query(
    record: &RestaurantRecord,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        "INSERT INTO restaurant (
            business_id,
            name,
            address,
            latitude,
            longitude,
            rating,
            number_of_reviews,
            zip_code,
            categories,
            inserted_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(business_id) DO UPDATE SET
            name = excluded.name,
            address = excluded.address,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            rating = excluded.rating,
            number_of_reviews = excluded.number_of_reviews,
            zip_code = excluded.zip_code,
            categories = excluded.categories,
            inserted_at = excluded.inserted_at",
    )
    .bind(&record.business_id.0)
    .bind(&record.name)
    .bind(&record.address)
    .bind(record.coordinates.latitude.to_string())
    .bind(record.coordinates.longitude.to_string())
    .bind(record.rating.to_string())
    .bind(record.number_of_reviews.map(i64::from))
    .bind(&record.zip_code)
    .bind(&record.categories)
    .bind(format_timestamp(record.inserted_at))
}

fn restaurant_from_row(row: SqliteRow) -> Result<RestaurantRecord, RepositoryError> {
    Ok(RestaurantRecord {
        business_id: BusinessId(row.try_get("business_id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        coordinates: Coordinates {
            latitude: parse_decimal("latitude", row.try_get("latitude")?)?,
            longitude: parse_decimal("longitude", row.try_get("longitude")?)?,
        },
        rating: parse_decimal("rating", row.try_get("rating")?)?,
        number_of_reviews: row
            .try_get::<Option<i64>, _>("number_of_reviews")?
            .map(|value| parse_u32("number_of_reviews", value))
            .transpose()?,
        zip_code: row.try_get("zip_code")?,
        categories: row.try_get("categories")?,
        inserted_at: parse_timestamp("inserted_at", row.try_get("inserted_at")?)?,
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use concierge_core::domain::restaurant::{BusinessId, Coordinates, RestaurantRecord};
    use concierge_core::ports::{Collaborator, RecordStore, SearchIndex, SearchQuery};

    use super::SqlRestaurantRepository;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_record(id: &str, name: &str, categories: &str) -> RestaurantRecord {
        RestaurantRecord {
            business_id: BusinessId(id.to_string()),
            name: name.to_string(),
            address: "51 Grove St".to_string(),
            coordinates: Coordinates {
                latitude: Decimal::new(407335, 4),
                longitude: Decimal::new(-740037, 4),
            },
            rating: Decimal::new(45, 1),
            number_of_reviews: Some(1820),
            zip_code: "10014".to_string(),
            categories: categories.to_string(),
            inserted_at: parse_ts("2026-02-23T12:00:00.000Z"),
        }
    }

    #[tokio::test]
    async fn sql_restaurant_repo_round_trip_and_upsert() {
        let pool = setup_pool().await;
        let repo = SqlRestaurantRepository::new(pool.clone());
        let record = sample_record("via-carota", "Via Carota", "Italian");

        repo.upsert(&record).await.expect("insert record");
        assert_eq!(repo.find_by_id(&record.business_id).await.expect("find"), Some(record.clone()));

        let mut updated = record.clone();
        updated.rating = Decimal::new(40, 1);
        updated.number_of_reviews = None;
        repo.upsert(&updated).await.expect("update record");

        let found = repo.get_by_key(&record.business_id).await.expect("get by key");
        assert_eq!(found, Some(updated));
        assert_eq!(repo.count().await.expect("count"), 1);

        let missing = repo.get_by_key(&BusinessId("nope".to_string())).await.expect("get missing");
        assert_eq!(missing, None);

        pool.close().await;
    }

    #[tokio::test]
    async fn search_matches_category_case_insensitively_within_window() {
        let pool = setup_pool().await;
        let repo = SqlRestaurantRepository::new(pool.clone());
        let written = repo
            .upsert_many(&[
                sample_record("a-italian", "Lupa", "Italian"),
                sample_record("b-italian", "Via Carota", "Italian"),
                sample_record("c-french", "Balthazar", "French"),
                sample_record("d-italian", "L'Artusi", "Italian"),
            ])
            .await
            .expect("bulk insert");
        assert_eq!(written, 4);

        let hits = repo
            .search(&SearchQuery {
                match_field: "categories".to_string(),
                value: "italian".to_string(),
                size: 2,
            })
            .await
            .expect("search");

        let ids = hits.iter().map(|hit| hit.business_id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a-italian", "b-italian"]);
        assert_eq!(hits[0].categories.as_deref(), Some("Italian"));

        pool.close().await;
    }

    #[tokio::test]
    async fn search_rejects_unknown_match_fields() {
        let pool = setup_pool().await;
        let repo = SqlRestaurantRepository::new(pool.clone());

        let error = repo
            .search(&SearchQuery {
                match_field: "zip_code; DROP TABLE restaurant".to_string(),
                value: "10014".to_string(),
                size: 10,
            })
            .await
            .expect_err("unknown field should fail");

        assert_eq!(error.service(), Collaborator::Search);
        pool.close().await;
    }
}
