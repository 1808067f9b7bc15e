// Holders module - Read-only view of the farmer/employee records cards are issued for

use async_trait::async_trait;

use crate::models::{CardType, HolderSnapshot};
use crate::store::StoreResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryHolderSource;
pub use postgres::PgHolderSource;

/// Resolves the current state of a card holder from the owning domain
#[async_trait]
pub trait HolderSource: Send + Sync {
    async fn fetch_holder(
        &self,
        holder_id: &str,
        card_type: CardType,
    ) -> StoreResult<Option<HolderSnapshot>>;
}
