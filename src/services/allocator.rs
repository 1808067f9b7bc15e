use std::sync::Arc;

use crate::error::CardError;
use crate::models::CardType;
use crate::store::CardStore;

/// Highest sequence number that fits the four-digit suffix
pub const MAX_SEQUENCE: u32 = 9999;

/// Used when a state is missing or not in [`STATE_CODES`]
pub const FALLBACK_STATE_CODE: &str = "XX";

const FILLER: char = 'X';

/// Indian states and union territories
const STATE_CODES: &[(&str, &str)] = &[
    ("TAMIL NADU", "TN"),
    ("KERALA", "KL"),
    ("KARNATAKA", "KA"),
    ("ANDHRA PRADESH", "AP"),
    ("TELANGANA", "TG"),
    ("MAHARASHTRA", "MH"),
    ("GUJARAT", "GJ"),
    ("RAJASTHAN", "RJ"),
    ("MADHYA PRADESH", "MP"),
    ("UTTAR PRADESH", "UP"),
    ("BIHAR", "BR"),
    ("WEST BENGAL", "WB"),
    ("ODISHA", "OR"),
    ("ASSAM", "AS"),
    ("PUNJAB", "PB"),
    ("HARYANA", "HR"),
    ("HIMACHAL PRADESH", "HP"),
    ("UTTARAKHAND", "UK"),
    ("JAMMU AND KASHMIR", "JK"),
    ("DELHI", "DL"),
    ("CHANDIGARH", "CH"),
    ("PUDUCHERRY", "PY"),
    ("GOA", "GA"),
    ("MEGHALAYA", "ML"),
    ("MANIPUR", "MN"),
    ("MIZORAM", "MZ"),
    ("NAGALAND", "NL"),
    ("TRIPURA", "TR"),
    ("SIKKIM", "SK"),
    ("ARUNACHAL PRADESH", "AR"),
    ("LADAKH", "LA"),
    ("ANDAMAN AND NICOBAR ISLANDS", "AN"),
    ("DAMAN AND DIU", "DD"),
    ("DADRA AND NAGAR HAVELI", "DN"),
    ("LAKSHADWEEP", "LD"),
    ("JHARKHAND", "JH"),
    ("CHHATTISGARH", "CG"),
];

/// Two-letter code for a state name; unknown names map to [`FALLBACK_STATE_CODE`]
pub fn state_code(state_name: Option<&str>) -> &'static str {
    let Some(name) = state_name else {
        return FALLBACK_STATE_CODE;
    };

    let normalized = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();

    STATE_CODES
        .iter()
        .find(|(full, code)| *full == normalized || *code == normalized)
        .map(|(_, code)| *code)
        .unwrap_or(FALLBACK_STATE_CODE)
}

/// First two letters of the district, upper-cased, padded with `X`
pub fn district_code(district_name: Option<&str>) -> String {
    let mut code: String = district_name
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .take(2)
        .collect();

    while code.len() < 2 {
        code.push(FILLER);
    }
    code
}

/// Scope of one monotonic counter: `(prefix, state code, district code)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllocatorKey {
    pub prefix: &'static str,
    pub state_code: &'static str,
    pub district_code: String,
}

impl AllocatorKey {
    pub fn new(card_type: CardType, state_name: Option<&str>, district_name: Option<&str>) -> Self {
        Self {
            prefix: card_type.prefix(),
            state_code: state_code(state_name),
            district_code: district_code(district_name),
        }
    }

    pub fn code_for(&self, sequence: u32) -> String {
        format!("{}{:04}", self, sequence)
    }
}

impl std::fmt::Display for AllocatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.prefix, self.state_code, self.district_code)
    }
}

/// Checks the `^[A-Z]{3}[A-Z]{2}[A-Z]{2}\d{4}$` shape
pub fn is_valid_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 11
        && bytes[..7].iter().all(u8::is_ascii_uppercase)
        && bytes[7..].iter().all(u8::is_ascii_digit)
}

/// Splits a well-formed code into its key text and sequence number
pub fn split_code(code: &str) -> Option<(&str, u32)> {
    if !is_valid_code(code) {
        return None;
    }
    let (key, sequence) = code.split_at(7);
    sequence.parse().ok().map(|n| (key, n))
}

/// Mints card codes from a persisted per-key counter.
///
/// The counter is advanced in the store, so allocations stay monotonic across
/// service instances. Candidates are still checked against existing codes
/// because rows may predate the counter (imported or legacy data).
#[derive(Clone)]
pub struct IdentifierAllocator {
    store: Arc<dyn CardStore>,
    max_attempts: u32,
}

impl IdentifierAllocator {
    pub fn new(store: Arc<dyn CardStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate_code(
        &self,
        card_type: CardType,
        state_name: Option<&str>,
        district_name: Option<&str>,
    ) -> Result<String, CardError> {
        let key = AllocatorKey::new(card_type, state_name, district_name);
        let key_text = key.to_string();

        for attempt in 1..=self.max_attempts {
            let sequence = self.store.next_sequence(&key_text).await?;
            if sequence > MAX_SEQUENCE {
                tracing::error!(key = %key_text, sequence, "Allocator key has run out of sequence numbers");
                return Err(CardError::AllocationExhausted {
                    key: key_text,
                    attempts: attempt,
                });
            }

            let candidate = key.code_for(sequence);
            if !self.store.code_exists(&candidate).await? {
                tracing::debug!(code = %candidate, attempt, "Allocated card code");
                return Ok(candidate);
            }

            tracing::warn!(code = %candidate, attempt, "Card code already taken, advancing counter");
        }

        tracing::error!(key = %key_text, attempts = self.max_attempts, "Card code allocation exhausted");

        Err(CardError::AllocationExhausted {
            key: key_text,
            attempts: self.max_attempts,
        })
    }
}
