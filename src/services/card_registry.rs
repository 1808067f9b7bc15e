use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::assets::AssetStore;
use crate::error::{CardError, Result};
use crate::holders::HolderSource;
use crate::models::card::{age_on, expiry_for, StatusCounts, TypeCounts};
use crate::models::{
    CardStatistics, CardStatus, CardType, HolderSnapshot, IdCard, Page, PageRequest,
};
use crate::services::allocator::{AllocatorKey, IdentifierAllocator};
use crate::services::renderer::{CardRenderer, RenderedCard};
use crate::store::{CardStore, Conflict, StoreError};

/// Full allocate-render-persist runs tried when an insert loses a code race
const ISSUE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Png,
    Pdf,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "png",
            ArtifactKind::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "image/png",
            ArtifactKind::Pdf => "application/pdf",
        }
    }

    /// Stored reference of this artifact on `card`
    pub fn reference<'a>(&self, card: &'a IdCard) -> &'a str {
        match self {
            ArtifactKind::Png => &card.png_ref,
            ArtifactKind::Pdf => &card.pdf_ref,
        }
    }

    /// Name offered to whoever downloads the artifact
    pub fn download_name(&self, code: &str) -> String {
        format!("idcard_{}.{}", code, self.extension())
    }
}

/// A downloadable card artifact
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Async read-write locks keyed by string, created on demand
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl KeyedLocks {
    fn entry(&self, key: String) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Entries only referenced by the map are idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key).or_default().clone()
    }

    async fn read(&self, key: String) -> OwnedRwLockReadGuard<()> {
        self.entry(key).read_owned().await
    }

    async fn write(&self, key: String) -> OwnedRwLockWriteGuard<()> {
        self.entry(key).write_owned().await
    }
}

/// Owns the card lifecycle: issuance, regeneration, revocation and lookups.
///
/// Issuance is idempotent per `(holder, card type)`. Every persisted card
/// points at artifacts that were fully written before the row became visible.
pub struct CardRegistry {
    store: Arc<dyn CardStore>,
    holders: Arc<dyn HolderSource>,
    assets: Arc<dyn AssetStore>,
    allocator: IdentifierAllocator,
    renderer: CardRenderer,
    locks: KeyedLocks,
}

impl CardRegistry {
    pub fn new(
        store: Arc<dyn CardStore>,
        holders: Arc<dyn HolderSource>,
        assets: Arc<dyn AssetStore>,
        allocator: IdentifierAllocator,
        renderer: CardRenderer,
    ) -> Self {
        Self {
            store,
            holders,
            assets,
            allocator,
            renderer,
            locks: KeyedLocks::default(),
        }
    }

    /// Issues a card for a holder known to the holder source
    #[tracing::instrument(skip(self))]
    pub async fn issue(&self, card_type: CardType, holder_id: &str) -> Result<IdCard> {
        let holder = self
            .holders
            .fetch_holder(holder_id, card_type)
            .await?
            .ok_or_else(|| CardError::NotFound(format!("{} holder {}", card_type, holder_id)))?;

        self.issue_for_holder(card_type, &holder).await
    }

    /// Returns the holder's ACTIVE card of this type, issuing one if none exists
    #[tracing::instrument(skip(self, holder), fields(holder_id = %holder.id))]
    pub async fn issue_for_holder(
        &self,
        card_type: CardType,
        holder: &HolderSnapshot,
    ) -> Result<IdCard> {
        let _guard = self
            .locks
            .write(format!("holder:{}:{}", card_type, holder.id))
            .await;

        if let Some(existing) = self.active_card(&holder.id, card_type).await? {
            tracing::info!(code = %existing.code, "Holder already has an active card");
            return Ok(existing);
        }

        for attempt in 1..=ISSUE_ATTEMPTS {
            match self.create_card(card_type, holder).await {
                Ok(card) => {
                    tracing::info!(
                        code = %card.code,
                        expires_at = %card.expires_at,
                        "Card issued"
                    );
                    return Ok(card);
                }
                Err(CardError::Persistence(StoreError::Conflict(Conflict::Code))) => {
                    tracing::warn!(attempt, "Card code taken at insert, retrying issuance");
                }
                Err(CardError::Persistence(StoreError::Conflict(Conflict::ActiveHolder))) => {
                    // Another instance issued first; its card is the answer
                    return match self.active_card(&holder.id, card_type).await? {
                        Some(winner) => {
                            tracing::info!(code = %winner.code, "Concurrent issuance won, returning its card");
                            Ok(winner)
                        }
                        None => Err(StoreError::Conflict(Conflict::ActiveHolder).into()),
                    };
                }
                Err(e) => {
                    tracing::error!(error = %e, "Card issuance failed");
                    return Err(e);
                }
            }
        }

        let key = AllocatorKey::new(
            card_type,
            holder.location.state.as_deref(),
            holder.location.district.as_deref(),
        );
        tracing::error!(key = %key, attempts = ISSUE_ATTEMPTS, "Every issuance attempt lost its code at insert");

        Err(CardError::AllocationExhausted {
            key: key.to_string(),
            attempts: ISSUE_ATTEMPTS,
        })
    }

    /// Re-renders a card from its holder's current data.
    ///
    /// `code`, `status`, `generated_at` and `expires_at` never change. The
    /// snapshot fields are refreshed so the record matches its artifacts. The
    /// frozen photo is replaced only when the holder's current photo was drawn.
    #[tracing::instrument(skip(self))]
    pub async fn regenerate(&self, code: &str) -> Result<IdCard> {
        let _guard = self.locks.write(format!("code:{}", code)).await;

        let card = self.find_by_code(code).await?;
        let holder = self
            .holders
            .fetch_holder(&card.holder_id, card.card_type)
            .await?
            .ok_or_else(|| {
                CardError::NotFound(format!("{} holder {}", card.card_type, card.holder_id))
            })?;

        let mut refreshed = card.clone();
        apply_snapshot(&mut refreshed, &holder, Utc::now());

        let rendered = self
            .renderer
            .render(self.assets.as_ref(), &refreshed, holder.photo_ref.as_deref())
            .await?;
        let current_photo = holder.photo_ref.as_deref().map(str::trim);
        if rendered.photo_ref.is_some() && rendered.photo_ref.as_deref() == current_photo {
            refreshed.photo_ref = rendered.photo_ref.clone();
        }

        let (png_ref, pdf_ref) = self.store_artifacts(&refreshed.code, &rendered).await?;
        refreshed.png_ref = png_ref;
        refreshed.pdf_ref = pdf_ref;

        let updated = match self.store.update(&refreshed).await {
            Ok(updated) => updated,
            Err(e) => {
                self.discard_artifacts(&[&refreshed.png_ref, &refreshed.pdf_ref]).await;
                return Err(e.into());
            }
        };

        // In-process readers hold the code lock; other instances re-read on a miss
        self.discard_artifacts(&[&card.png_ref, &card.pdf_ref]).await;

        tracing::info!(status = %updated.status, "Card regenerated");

        Ok(updated)
    }

    /// Revokes a card. Revoking a REVOKED card returns it unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, code: &str) -> Result<IdCard> {
        let _guard = self.locks.write(format!("code:{}", code)).await;

        let mut card = self.find_by_code(code).await?;
        if card.status == CardStatus::Revoked {
            tracing::debug!("Card already revoked");
            return Ok(card);
        }

        card.status = CardStatus::Revoked;
        card.revoked_at = Some(Utc::now());
        let revoked = self.store.update(&card).await?;

        tracing::info!(holder_id = %revoked.holder_id, "Card revoked");

        Ok(revoked)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<IdCard> {
        self.store
            .find_by_code(code)
            .await?
            .ok_or_else(|| CardError::NotFound(format!("card {}", code)))
    }

    /// All cards ever issued to a holder; empty when there are none
    pub async fn find_by_holder(&self, holder_id: &str) -> Result<Vec<IdCard>> {
        Ok(self.store.find_by_holder(holder_id).await?)
    }

    pub async fn find_by_type(&self, card_type: CardType, page: PageRequest) -> Result<Page<IdCard>> {
        Ok(self.store.find_by_type(card_type, page).await?)
    }

    pub async fn find_all(&self, page: PageRequest) -> Result<Page<IdCard>> {
        Ok(self.store.find_all(page).await?)
    }

    /// Case-insensitive substring match on the holder name
    pub async fn search_by_name(
        &self,
        query: &str,
        card_type: Option<CardType>,
    ) -> Result<Vec<IdCard>> {
        Ok(self.store.find_by_name_contains(query, card_type).await?)
    }

    pub async fn find_by_state(
        &self,
        state: &str,
        card_type: Option<CardType>,
    ) -> Result<Vec<IdCard>> {
        Ok(self.store.find_by_state(state, card_type).await?)
    }

    pub async fn find_by_district(
        &self,
        district: &str,
        card_type: Option<CardType>,
    ) -> Result<Vec<IdCard>> {
        Ok(self.store.find_by_district(district, card_type).await?)
    }

    pub async fn statistics(&self) -> Result<CardStatistics> {
        let now = Utc::now();
        let (total, farmer, employee, active, revoked, expired) = tokio::try_join!(
            self.store.count(),
            self.store.count_by_type(CardType::Farmer),
            self.store.count_by_type(CardType::Employee),
            self.store.count_by_status(CardStatus::Active),
            self.store.count_by_status(CardStatus::Revoked),
            self.store.count_expired(now),
        )?;

        Ok(CardStatistics {
            total,
            by_type: TypeCounts { farmer, employee },
            by_status: StatusCounts { active, revoked },
            expired,
        })
    }

    /// Reads a card artifact. Never observes a pair that a regeneration is replacing.
    pub async fn download(&self, code: &str, kind: ArtifactKind) -> Result<Artifact> {
        let _guard = self.locks.read(format!("code:{}", code)).await;

        let mut card = self.find_by_code(code).await?;
        let mut bytes = self.assets.load_artifact(kind.reference(&card)).await?;

        if bytes.is_none() {
            // Another instance may have swapped the artifacts after the row was read
            let current = self.find_by_code(code).await?;
            if kind.reference(&current) != kind.reference(&card) {
                tracing::debug!(code, "Artifacts replaced while reading, retrying");
                bytes = self.assets.load_artifact(kind.reference(&current)).await?;
                card = current;
            }
        }

        let bytes = bytes.ok_or_else(|| {
            tracing::error!(code, artifact_ref = %kind.reference(&card), "Card artifact missing");
            CardError::NotFound(format!("{} artifact for card {}", kind.extension(), code))
        })?;

        Ok(Artifact {
            file_name: kind.download_name(code),
            content_type: kind.content_type(),
            bytes,
        })
    }

    /// 0 or 1 ACTIVE card; more is a broken invariant and is reported, not repaired
    async fn active_card(&self, holder_id: &str, card_type: CardType) -> Result<Option<IdCard>> {
        let mut active = self.store.find_active_by_holder(holder_id, card_type).await?;
        match active.len() {
            0 => Ok(None),
            1 => Ok(active.pop()),
            n => {
                tracing::error!(holder_id, %card_type, active = n, "Multiple active cards for holder");
                Err(CardError::InvariantViolation {
                    holder_id: holder_id.to_string(),
                    card_type,
                    active: n,
                })
            }
        }
    }

    /// One allocate, render, store, insert run. Nothing is left behind on failure.
    async fn create_card(&self, card_type: CardType, holder: &HolderSnapshot) -> Result<IdCard> {
        let code = self
            .allocator
            .generate_code(
                card_type,
                holder.location.state.as_deref(),
                holder.location.district.as_deref(),
            )
            .await?;

        let mut card = new_card(code, card_type, holder, Utc::now());

        let rendered = self
            .renderer
            .render(self.assets.as_ref(), &card, holder.photo_ref.as_deref())
            .await?;
        let (png_ref, pdf_ref) = self.store_artifacts(&card.code, &rendered).await?;
        card.png_ref = png_ref;
        card.pdf_ref = pdf_ref;

        match self.store.insert(&card).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                self.discard_artifacts(&[&card.png_ref, &card.pdf_ref]).await;
                Err(e.into())
            }
        }
    }

    /// Writes both artifacts under names unique to this render
    async fn store_artifacts(&self, code: &str, rendered: &RenderedCard) -> Result<(String, String)> {
        let version = Uuid::new_v4().simple().to_string();
        let name = |kind: ArtifactKind| format!("idcard_{}_{}.{}", code, version, kind.extension());

        let png_ref = self
            .assets
            .store_artifact(&rendered.png, &name(ArtifactKind::Png))
            .await?;

        match self
            .assets
            .store_artifact(&rendered.pdf, &name(ArtifactKind::Pdf))
            .await
        {
            Ok(pdf_ref) => Ok((png_ref, pdf_ref)),
            Err(e) => {
                self.discard_artifacts(&[&png_ref]).await;
                Err(e.into())
            }
        }
    }

    async fn discard_artifacts(&self, refs: &[&str]) {
        for artifact_ref in refs {
            if let Err(e) = self.assets.discard_artifact(artifact_ref).await {
                tracing::warn!(artifact_ref = %artifact_ref, error = %e, "Failed to discard artifact");
            }
        }
    }
}

fn new_card(code: String, card_type: CardType, holder: &HolderSnapshot, now: DateTime<Utc>) -> IdCard {
    let mut card = IdCard {
        id: Uuid::new_v4(),
        code,
        card_type,
        holder_id: holder.id.clone(),
        holder_name: String::new(),
        photo_ref: holder.photo_ref.clone(),
        village: None,
        district: None,
        state: None,
        country: None,
        age: None,
        gender: None,
        date_of_birth: None,
        status: CardStatus::Active,
        generated_at: now,
        expires_at: expiry_for(now),
        png_ref: String::new(),
        pdf_ref: String::new(),
        revoked_at: None,
        created_at: now,
        updated_at: now,
    };
    apply_snapshot(&mut card, holder, now);
    card
}

/// Copies the holder's current name, location and demographics onto the card.
/// The photo reference is left alone.
fn apply_snapshot(card: &mut IdCard, holder: &HolderSnapshot, now: DateTime<Utc>) {
    card.holder_name = holder.display_name.clone();
    card.village = holder.location.village.clone();
    card.district = holder.location.district.clone();
    card.state = holder.location.state.clone();
    card.country = holder.location.country.clone();
    card.gender = holder.gender.clone();
    card.date_of_birth = holder.date_of_birth;
    card.age = holder.date_of_birth.map(|dob| age_on(dob, now.date_naive()));
}
