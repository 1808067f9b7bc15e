use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub village: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// What a card needs to know about its holder, whether farmer or employee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    pub id: String,
    pub display_name: String,
    pub photo_ref: Option<String>,
    pub location: Location,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

impl HolderSnapshot {
    /// Joins name parts, skipping blanks ("Ravi", None, "Kumar" -> "Ravi Kumar")
    pub fn join_name<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
        parts
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
