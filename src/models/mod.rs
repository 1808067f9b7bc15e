// Models module - Card entity and the holder shape it is issued from

pub mod card;
pub mod holder;

pub use card::{CardStatistics, CardStatus, CardType, EffectiveStatus, IdCard, Page, PageRequest};
pub use holder::{HolderSnapshot, Location};
