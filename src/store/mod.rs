// Store module - Persistence seam for issued cards and allocator counters

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CardStatus, CardType, IdCard, Page, PageRequest};

pub mod memory;
pub mod postgres;

pub use memory::MemoryCardStore;
pub use postgres::PgCardStore;

/// Which unique constraint a write ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Another card already carries this code
    Code,
    /// The holder already has an ACTIVE card of this type
    ActiveHolder,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::Code => f.write_str("card code already exists"),
            Conflict::ActiveHolder => f.write_str("holder already has an active card"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    Conflict(Conflict),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persisted source of truth for cards.
///
/// Implementations must enforce uniqueness of `code` and at most one ACTIVE
/// card per `(holder_id, card_type)`, reporting violations as
/// [`StoreError::Conflict`].
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<IdCard>>;

    async fn find_by_holder(&self, holder_id: &str) -> StoreResult<Vec<IdCard>>;

    async fn find_active_by_holder(
        &self,
        holder_id: &str,
        card_type: CardType,
    ) -> StoreResult<Vec<IdCard>>;

    async fn find_by_type(&self, card_type: CardType, page: PageRequest)
        -> StoreResult<Page<IdCard>>;

    async fn find_all(&self, page: PageRequest) -> StoreResult<Page<IdCard>>;

    /// Case-insensitive substring match on the holder name
    async fn find_by_name_contains(
        &self,
        query: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>>;

    async fn find_by_state(
        &self,
        state: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>>;

    async fn find_by_district(
        &self,
        district: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>>;

    async fn insert(&self, card: &IdCard) -> StoreResult<IdCard>;

    async fn update(&self, card: &IdCard) -> StoreResult<IdCard>;

    async fn code_exists(&self, code: &str) -> StoreResult<bool>;

    /// Atomically advances the counter for `key` and returns the new value.
    /// The first call for a key returns 1.
    async fn next_sequence(&self, key: &str) -> StoreResult<u32>;

    async fn count(&self) -> StoreResult<i64>;

    async fn count_by_status(&self, status: CardStatus) -> StoreResult<i64>;

    async fn count_by_type(&self, card_type: CardType) -> StoreResult<i64>;

    /// ACTIVE cards with `expires_at < now`
    async fn count_expired(&self, now: DateTime<Utc>) -> StoreResult<i64>;
}
