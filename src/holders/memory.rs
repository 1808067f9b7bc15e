use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::HolderSource;
use crate::models::{CardType, HolderSnapshot};
use crate::store::StoreResult;

/// Holder records kept in memory, keyed by `(card_type, holder_id)`
#[derive(Default)]
pub struct MemoryHolderSource {
    holders: Mutex<HashMap<(CardType, String), HolderSnapshot>>,
}

impl MemoryHolderSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a holder record
    pub fn upsert(&self, card_type: CardType, holder: HolderSnapshot) {
        self.holders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((card_type, holder.id.clone()), holder);
    }

    pub fn remove(&self, card_type: CardType, holder_id: &str) {
        self.holders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(card_type, holder_id.to_string()));
    }
}

#[async_trait]
impl HolderSource for MemoryHolderSource {
    async fn fetch_holder(
        &self,
        holder_id: &str,
        card_type: CardType,
    ) -> StoreResult<Option<HolderSnapshot>> {
        Ok(self
            .holders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(card_type, holder_id.to_string()))
            .cloned())
    }
}
