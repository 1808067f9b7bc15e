use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};

use super::HolderSource;
use crate::models::{CardType, HolderSnapshot, Location};
use crate::store::StoreResult;

/// Columns shared by the `farmers` and `employees` tables, aliased to one shape
#[derive(Debug, FromRow)]
struct HolderRow {
    id: i64,
    first_name: Option<String>,
    middle_name: Option<String>,
    last_name: Option<String>,
    photo_file_name: Option<String>,
    village: Option<String>,
    district: Option<String>,
    state: Option<String>,
    country: Option<String>,
    date_of_birth: Option<NaiveDate>,
    gender: Option<String>,
}

impl From<HolderRow> for HolderSnapshot {
    fn from(row: HolderRow) -> Self {
        Self {
            id: row.id.to_string(),
            display_name: HolderSnapshot::join_name([
                row.first_name.as_deref(),
                row.middle_name.as_deref(),
                row.last_name.as_deref(),
            ]),
            photo_ref: row.photo_file_name.filter(|p| !p.trim().is_empty()),
            location: Location {
                village: row.village,
                district: row.district,
                state: row.state,
                country: row.country,
            },
            date_of_birth: row.date_of_birth,
            gender: row.gender,
        }
    }
}

/// Reads holders straight from the administration platform's tables
#[derive(Clone)]
pub struct PgHolderSource {
    pool: PgPool,
}

impl PgHolderSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HolderSource for PgHolderSource {
    #[tracing::instrument(skip(self))]
    async fn fetch_holder(
        &self,
        holder_id: &str,
        card_type: CardType,
    ) -> StoreResult<Option<HolderSnapshot>> {
        // Holder ids are numeric in both tables; anything else cannot exist
        let Ok(id) = holder_id.trim().parse::<i64>() else {
            tracing::debug!("Holder id is not numeric");
            return Ok(None);
        };

        let query = match card_type {
            CardType::Farmer => {
                r#"
                SELECT id, first_name, middle_name, last_name, photo_file_name,
                       village, district, state, country, date_of_birth, gender
                FROM farmers WHERE id = $1
                "#
            }
            CardType::Employee => {
                r#"
                SELECT id, first_name, middle_name, last_name, photo_file_name,
                       village, district, state, country, dob AS date_of_birth, gender
                FROM employees WHERE id = $1
                "#
            }
        };

        let row = sqlx::query_as::<_, HolderRow>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(HolderSnapshot::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_snapshot() {
        let row = HolderRow {
            id: 42,
            first_name: Some("Ravi".to_string()),
            middle_name: None,
            last_name: Some("Kumar".to_string()),
            photo_file_name: Some("  ".to_string()),
            village: Some("Alur".to_string()),
            district: Some("Chennai".to_string()),
            state: Some("Tamil Nadu".to_string()),
            country: Some("India".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1985, 1, 20),
            gender: Some("Male".to_string()),
        };

        let snapshot = HolderSnapshot::from(row);

        assert_eq!(snapshot.id, "42");
        assert_eq!(snapshot.display_name, "Ravi Kumar");
        assert_eq!(snapshot.photo_ref, None);
        assert_eq!(snapshot.location.district.as_deref(), Some("Chennai"));
    }
}
