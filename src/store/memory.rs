use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CardStore, Conflict, StoreError, StoreResult};
use crate::models::{CardStatus, CardType, IdCard, Page, PageRequest};

#[derive(Default)]
struct Inner {
    cards: Vec<IdCard>,
    sequences: HashMap<String, u32>,
}

/// In-process card store with the same uniqueness rules as the Postgres schema.
///
/// Counters live in this process only, so this store is only correct for a
/// single running instance. Used for tests and local development.
#[derive(Default)]
pub struct MemoryCardStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    fail_inserts: AtomicBool,
    insert_conflicts: Mutex<VecDeque<Conflict>>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail as if the database were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes only inserts fail, leaving reads and counters working
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes the next insert fail with `conflict`, as if another instance won the race.
    /// Repeated calls queue one conflict per insert.
    pub fn set_next_insert_conflict(&self, conflict: Conflict) {
        self.insert_conflicts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(conflict);
    }

    /// Inserts a row directly, bypassing the constraint checks (for seeding legacy data)
    pub fn seed(&self, card: IdCard) {
        self.lock().cards.push(card);
    }

    pub fn len(&self) -> usize {
        self.lock().cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the Vec half-written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn filter<F>(&self, predicate: F) -> StoreResult<Vec<IdCard>>
    where
        F: Fn(&IdCard) -> bool,
    {
        self.check_available()?;
        Ok(self
            .lock()
            .cards
            .iter()
            .filter(|c| predicate(c))
            .cloned()
            .collect())
    }

    fn paged<F>(&self, page: PageRequest, predicate: F) -> StoreResult<Page<IdCard>>
    where
        F: Fn(&IdCard) -> bool,
    {
        let mut matching = self.filter(predicate)?;
        matching.sort_by(|a, b| {
            b.generated_at
                .cmp(&a.generated_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total,
        })
    }
}

fn matches_type(card: &IdCard, card_type: Option<CardType>) -> bool {
    card_type.map_or(true, |t| card.card_type == t)
}

fn eq_ignore_case(stored: &Option<String>, value: &str) -> bool {
    stored
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case(value.trim()))
}

#[async_trait]
impl CardStore for MemoryCardStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<IdCard>> {
        Ok(self.filter(|c| c.code == code)?.into_iter().next())
    }

    async fn find_by_holder(&self, holder_id: &str) -> StoreResult<Vec<IdCard>> {
        self.filter(|c| c.holder_id == holder_id)
    }

    async fn find_active_by_holder(
        &self,
        holder_id: &str,
        card_type: CardType,
    ) -> StoreResult<Vec<IdCard>> {
        self.filter(|c| c.holder_id == holder_id && c.card_type == card_type && c.is_active())
    }

    async fn find_by_type(
        &self,
        card_type: CardType,
        page: PageRequest,
    ) -> StoreResult<Page<IdCard>> {
        self.paged(page, |c| c.card_type == card_type)
    }

    async fn find_all(&self, page: PageRequest) -> StoreResult<Page<IdCard>> {
        self.paged(page, |_| true)
    }

    async fn find_by_name_contains(
        &self,
        query: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>> {
        let needle = query.trim().to_lowercase();
        self.filter(|c| {
            matches_type(c, card_type) && c.holder_name.to_lowercase().contains(&needle)
        })
    }

    async fn find_by_state(
        &self,
        state: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>> {
        self.filter(|c| matches_type(c, card_type) && eq_ignore_case(&c.state, state))
    }

    async fn find_by_district(
        &self,
        district: &str,
        card_type: Option<CardType>,
    ) -> StoreResult<Vec<IdCard>> {
        self.filter(|c| matches_type(c, card_type) && eq_ignore_case(&c.district, district))
    }

    async fn insert(&self, card: &IdCard) -> StoreResult<IdCard> {
        self.check_available()?;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert rejected".to_string()));
        }
        if let Some(conflict) = self
            .insert_conflicts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(StoreError::Conflict(conflict));
        }

        let mut inner = self.lock();
        if inner.cards.iter().any(|c| c.code == card.code) {
            return Err(StoreError::Conflict(Conflict::Code));
        }
        if card.is_active()
            && inner.cards.iter().any(|c| {
                c.is_active() && c.holder_id == card.holder_id && c.card_type == card.card_type
            })
        {
            return Err(StoreError::Conflict(Conflict::ActiveHolder));
        }

        let now = Utc::now();
        let mut stored = card.clone();
        stored.created_at = now;
        stored.updated_at = now;
        inner.cards.push(stored.clone());

        Ok(stored)
    }

    async fn update(&self, card: &IdCard) -> StoreResult<IdCard> {
        self.check_available()?;

        let mut inner = self.lock();
        let existing = inner
            .cards
            .iter_mut()
            .find(|c| c.id == card.id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        existing.holder_name = card.holder_name.clone();
        existing.photo_ref = card.photo_ref.clone();
        existing.village = card.village.clone();
        existing.district = card.district.clone();
        existing.state = card.state.clone();
        existing.country = card.country.clone();
        existing.age = card.age;
        existing.gender = card.gender.clone();
        existing.date_of_birth = card.date_of_birth;
        if existing.status != CardStatus::Revoked {
            existing.status = card.status;
        }
        existing.png_ref = card.png_ref.clone();
        existing.pdf_ref = card.pdf_ref.clone();
        existing.revoked_at = existing.revoked_at.or(card.revoked_at);
        existing.updated_at = Utc::now();

        Ok(existing.clone())
    }

    async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.lock().cards.iter().any(|c| c.code == code))
    }

    async fn next_sequence(&self, key: &str) -> StoreResult<u32> {
        self.check_available()?;
        let mut inner = self.lock();
        let value = inner.sequences.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(self.filter(|_| true)?.len() as i64)
    }

    async fn count_by_status(&self, status: CardStatus) -> StoreResult<i64> {
        Ok(self.filter(|c| c.status == status)?.len() as i64)
    }

    async fn count_by_type(&self, card_type: CardType) -> StoreResult<i64> {
        Ok(self.filter(|c| c.card_type == card_type)?.len() as i64)
    }

    async fn count_expired(&self, now: DateTime<Utc>) -> StoreResult<i64> {
        Ok(self
            .filter(|c| c.is_active() && c.expires_at < now)?
            .len() as i64)
    }
}
