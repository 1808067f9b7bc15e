use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cards stay valid for five calendar years from issuance
pub const CARD_VALIDITY: Months = Months::new(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardType {
    Farmer,
    Employee,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Farmer => "FARMER",
            CardType::Employee => "EMPLOYEE",
        }
    }

    /// Three-letter prefix that opens every code of this type
    pub fn prefix(&self) -> &'static str {
        match self {
            CardType::Farmer => "FAM",
            CardType::Employee => "EMP",
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FARMER" => Ok(CardType::Farmer),
            "EMPLOYEE" => Ok(CardType::Employee),
            other => Err(format!("unknown card type: {}", other)),
        }
    }
}

/// Stored card status. Expiry is not a stored state, see [`IdCard::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardStatus {
    Active,
    Revoked,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "ACTIVE",
            CardStatus::Revoked => "REVOKED",
        }
    }
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(CardStatus::Active),
            "REVOKED" => Ok(CardStatus::Revoked),
            other => Err(format!("unknown card status: {}", other)),
        }
    }
}

/// Status as observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EffectiveStatus {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdCard {
    pub id: Uuid,
    pub code: String,
    pub card_type: CardType,
    pub holder_id: String,
    pub holder_name: String,
    pub photo_ref: Option<String>,
    pub village: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub status: CardStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub png_ref: String,
    pub pdf_ref: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdCard {
    pub fn is_active(&self) -> bool {
        self.status == CardStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveStatus {
        match self.status {
            CardStatus::Revoked => EffectiveStatus::Revoked,
            CardStatus::Active if self.is_expired_at(now) => EffectiveStatus::Expired,
            CardStatus::Active => EffectiveStatus::Active,
        }
    }
}

/// Expiry for a card generated at `generated_at`
pub fn expiry_for(generated_at: DateTime<Utc>) -> DateTime<Utc> {
    // Only fails past year 262143.
    generated_at
        .checked_add_months(CARD_VALIDITY)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole years between `date_of_birth` and `today`
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    today.years_since(date_of_birth).map(|y| y as i32).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, 500),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 20)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub farmer: i64,
    pub employee: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: i64,
    pub revoked: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardStatistics {
    pub total: i64,
    pub by_type: TypeCounts,
    pub by_status: StatusCounts,
    /// ACTIVE cards whose expiry has passed
    pub expired: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_card(expires_at: DateTime<Utc>, status: CardStatus) -> IdCard {
        let generated_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        IdCard {
            id: Uuid::new_v4(),
            code: "FAMTNCH0001".to_string(),
            card_type: CardType::Farmer,
            holder_id: "1".to_string(),
            holder_name: "Test".to_string(),
            photo_ref: None,
            village: None,
            district: None,
            state: None,
            country: None,
            age: None,
            gender: None,
            date_of_birth: None,
            status,
            generated_at,
            expires_at,
            png_ref: "idcard_FAMTNCH0001.png".to_string(),
            pdf_ref: "idcard_FAMTNCH0001.pdf".to_string(),
            revoked_at: None,
            created_at: generated_at,
            updated_at: generated_at,
        }
    }

    #[test]
    fn test_expiry_is_five_years() {
        let generated = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let expires = expiry_for(generated);

        assert_eq!(expires, Utc.with_ymd_and_hms(2029, 3, 15, 10, 30, 0).unwrap());
        assert!(expires > generated);
    }

    #[test]
    fn test_expiry_from_leap_day_clamps() {
        let generated = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(
            expiry_for(generated),
            Utc.with_ymd_and_hms(2029, 2, 28, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_age_on() {
        let dob = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(age_on(dob, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()), 33);
        assert_eq!(age_on(dob, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), 34);
        // Birth dates in the future never produce a negative age
        assert_eq!(age_on(dob, NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()), 0);
    }

    #[test]
    fn test_effective_status() {
        let expires = Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2028, 12, 31, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2029, 1, 2, 0, 0, 0).unwrap();

        let active = sample_card(expires, CardStatus::Active);
        assert_eq!(active.effective_status(before), EffectiveStatus::Active);
        assert_eq!(active.effective_status(after), EffectiveStatus::Expired);

        let revoked = sample_card(expires, CardStatus::Revoked);
        assert_eq!(revoked.effective_status(after), EffectiveStatus::Revoked);
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!("FARMER".parse::<CardType>().unwrap(), CardType::Farmer);
        assert_eq!(CardType::Employee.prefix(), "EMP");
        assert_eq!("REVOKED".parse::<CardStatus>().unwrap(), CardStatus::Revoked);
        assert!("expired".parse::<CardStatus>().is_err());
    }

    #[test]
    fn test_serialized_forms() {
        let card = sample_card(
            Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap(),
            CardStatus::Active,
        );
        let json = serde_json::to_value(&card).unwrap();

        assert_eq!(json["card_type"], "FARMER");
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(
            serde_json::to_value(EffectiveStatus::Expired).unwrap(),
            "EXPIRED"
        );

        let stats = serde_json::to_value(CardStatistics::default()).unwrap();
        assert_eq!(stats["by_status"]["revoked"], 0);
    }

    #[test]
    fn test_page_request_clamps_size() {
        let page = PageRequest::new(2, 0);
        assert_eq!(page.size, 1);
        assert_eq!(PageRequest::new(3, 10).offset(), 30);
    }
}
