use thiserror::Error;

use crate::assets::AssetError;
use crate::models::CardType;
use crate::services::renderer::RenderError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CardError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Artifact storage error: {0}")]
    ArtifactStorage(#[from] AssetError),

    #[error("No free card code for {key} after {attempts} attempts")]
    AllocationExhausted { key: String, attempts: u32 },

    #[error("Rendering error: {0}")]
    Rendering(#[from] RenderError),

    #[error("Invariant violated: holder {holder_id} has {active} active {card_type} cards")]
    InvariantViolation {
        holder_id: String,
        card_type: CardType,
        active: usize,
    },
}

impl CardError {
    /// Short machine-readable reason, for callers reporting failures upstream
    pub fn reason(&self) -> &'static str {
        match self {
            CardError::NotFound(_) => "not_found",
            CardError::Persistence(_) | CardError::ArtifactStorage(_) => "persistence",
            CardError::AllocationExhausted { .. } => "allocation_exhausted",
            CardError::Rendering(_) => "rendering",
            CardError::InvariantViolation { .. } => "invariant_violation",
        }
    }
}

pub type Result<T> = std::result::Result<T, CardError>;
