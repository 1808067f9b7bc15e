use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, PgPool, Row};

use super::{CardStore, Conflict, StoreError, StoreResult};
use crate::models::{CardStatus, CardType, IdCard, Page, PageRequest};

const CODE_CONSTRAINT: &str = "id_cards_code_key";
const ACTIVE_HOLDER_CONSTRAINT: &str = "id_cards_one_active_per_holder";

impl<'r> FromRow<'r, PgRow> for IdCard {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let card_type: String = row.try_get("card_type")?;
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            card_type: card_type.parse().map_err(decode_error("card_type"))?,
            holder_id: row.try_get("holder_id")?,
            holder_name: row.try_get("holder_name")?,
            photo_ref: row.try_get("photo_ref")?,
            village: row.try_get("village")?,
            district: row.try_get("district")?,
            state: row.try_get("state")?,
            country: row.try_get("country")?,
            age: row.try_get("age")?,
            gender: row.try_get("gender")?,
            date_of_birth: row.try_get("date_of_birth")?,
            status: status.parse().map_err(decode_error("status"))?,
            generated_at: row.try_get("generated_at")?,
            expires_at: row.try_get("expires_at")?,
            png_ref: row.try_get("png_ref")?,
            pdf_ref: row.try_get("pdf_ref")?,
            revoked_at: row.try_get("revoked_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn decode_error(column: &'static str) -> impl Fn(String) -> sqlx::Error {
    move |message| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

/// Maps unique violations on the two card indexes to [`Conflict`]
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            match db_err.constraint() {
                Some(CODE_CONSTRAINT) => return StoreError::Conflict(Conflict::Code),
                Some(ACTIVE_HOLDER_CONSTRAINT) => {
                    return StoreError::Conflict(Conflict::ActiveHolder)
                }
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

/// Postgres-backed card store
#[derive(Clone)]
pub struct PgCardStore {
    pool: PgPool,
}

impl PgCardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CardStore for PgCardStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<IdCard>> {
        let card = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    async fn find_by_holder(&self, holder_id: &str) -> StoreResult<Vec<IdCard>> {
        let cards = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            WHERE holder_id = $1
            ORDER BY generated_at DESC
            "#,
        )
        .bind(holder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn find_active_by_holder(
        &self,
        holder_id: &str,
        card_type: CardType,
    ) -> StoreResult<Vec<IdCard>> {
        let cards = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            WHERE holder_id = $1 AND card_type = $2 AND status = 'ACTIVE'
            ORDER BY generated_at DESC
            "#,
        )
        .bind(holder_id)
        .bind(card_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn find_by_type(
        &self,
        card_type: CardType,
        page: PageRequest,
    ) -> StoreResult<Page<IdCard>> {
        let items = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            WHERE card_type = $1
            ORDER BY generated_at DESC, code
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(card_type.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total = self.count_by_type(card_type).await?;

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn find_all(&self, page: PageRequest) -> StoreResult<Page<IdCard>> {
        let items = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            ORDER BY generated_at DESC, code
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total = self.count().await?;

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn find_by_name_contains(
        &self,
        query: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>> {
        let cards = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            WHERE holder_name ILIKE '%' || $1 || '%'
              AND ($2::TEXT IS NULL OR card_type = $2)
            ORDER BY holder_name, code
            "#,
        )
        .bind(escape_like(query))
        .bind(card_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn find_by_state(
        &self,
        state: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>> {
        let cards = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            WHERE LOWER(state) = LOWER($1)
              AND ($2::TEXT IS NULL OR card_type = $2)
            ORDER BY code
            "#,
        )
        .bind(state.trim())
        .bind(card_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn find_by_district(
        &self,
        district: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>> {
        let cards = sqlx::query_as::<_, IdCard>(
            r#"
            SELECT * FROM id_cards
            WHERE LOWER(district) = LOWER($1)
              AND ($2::TEXT IS NULL OR card_type = $2)
            ORDER BY code
            "#,
        )
        .bind(district.trim())
        .bind(card_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn insert(&self, card: &IdCard) -> StoreResult<IdCard> {
        let card = sqlx::query_as::<_, IdCard>(
            r#"
            INSERT INTO id_cards (
                id, code, card_type, holder_id, holder_name, photo_ref,
                village, district, state, country, age, gender, date_of_birth,
                status, generated_at, expires_at, png_ref, pdf_ref, revoked_at,
                created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, NOW(), NOW()
            )
            RETURNING *
            "#,
        )
        .bind(card.id)
        .bind(&card.code)
        .bind(card.card_type.as_str())
        .bind(&card.holder_id)
        .bind(&card.holder_name)
        .bind(&card.photo_ref)
        .bind(&card.village)
        .bind(&card.district)
        .bind(&card.state)
        .bind(&card.country)
        .bind(card.age)
        .bind(&card.gender)
        .bind(card.date_of_birth)
        .bind(card.status.as_str())
        .bind(card.generated_at)
        .bind(card.expires_at)
        .bind(&card.png_ref)
        .bind(&card.pdf_ref)
        .bind(card.revoked_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(card)
    }

    async fn update(&self, card: &IdCard) -> StoreResult<IdCard> {
        // code, card_type, holder_id and generated_at are fixed at issuance.
        // The status guard keeps REVOKED terminal even if a stale copy is written back.
        let updated = sqlx::query_as::<_, IdCard>(
            r#"
            UPDATE id_cards
            SET
                holder_name = $2,
                photo_ref = $3,
                village = $4,
                district = $5,
                state = $6,
                country = $7,
                age = $8,
                gender = $9,
                date_of_birth = $10,
                status = CASE WHEN status = 'REVOKED' THEN status ELSE $11 END,
                png_ref = $12,
                pdf_ref = $13,
                revoked_at = COALESCE(revoked_at, $14),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(card.id)
        .bind(&card.holder_name)
        .bind(&card.photo_ref)
        .bind(&card.village)
        .bind(&card.district)
        .bind(&card.state)
        .bind(&card.country)
        .bind(card.age)
        .bind(&card.gender)
        .bind(card.date_of_birth)
        .bind(card.status.as_str())
        .bind(&card.png_ref)
        .bind(&card.pdf_ref)
        .bind(card.revoked_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        updated.ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM id_cards WHERE code = $1)
            "#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn next_sequence(&self, key: &str) -> StoreResult<u32> {
        // Single-row upsert: concurrent callers on any instance serialize on the row lock
        let value: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO card_sequences (allocator_key, last_value, updated_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (allocator_key)
            DO UPDATE SET last_value = card_sequences.last_value + 1, updated_at = NOW()
            RETURNING last_value
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(value.max(0) as u32)
    }

    async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM id_cards"#)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_by_status(&self, status: CardStatus) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM id_cards WHERE status = $1
            "#,
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_by_type(&self, card_type: CardType) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM id_cards WHERE card_type = $1
            "#,
        )
        .bind(card_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM id_cards
            WHERE status = 'ACTIVE' AND expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Escapes LIKE wildcards so user input matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
