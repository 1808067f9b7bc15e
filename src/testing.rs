// Shared fixtures for unit tests

use std::io::Cursor;

use chrono::{NaiveDate, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use uuid::Uuid;

use crate::models::card::expiry_for;
use crate::models::{CardStatus, CardType, HolderSnapshot, IdCard, Location};

/// An ACTIVE card with the given code, owned by a holder unique to that code
pub fn card_with_code(code: &str) -> IdCard {
    let card_type = if code.starts_with("EMP") {
        CardType::Employee
    } else {
        CardType::Farmer
    };
    let generated_at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();

    IdCard {
        id: Uuid::new_v4(),
        code: code.to_string(),
        card_type,
        holder_id: format!("legacy-{}", code),
        holder_name: "Lakshmi Devi".to_string(),
        photo_ref: None,
        village: Some("Perambur".to_string()),
        district: Some("Chennai".to_string()),
        state: Some("Tamil Nadu".to_string()),
        country: Some("India".to_string()),
        age: Some(42),
        gender: Some("Female".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1981, 7, 4),
        status: CardStatus::Active,
        generated_at,
        expires_at: expiry_for(generated_at),
        png_ref: format!("idcard_{}.png", code),
        pdf_ref: format!("idcard_{}.pdf", code),
        revoked_at: None,
        created_at: generated_at,
        updated_at: generated_at,
    }
}

/// A holder in Chennai, Tamil Nadu with no photo
pub fn sample_holder(id: &str) -> HolderSnapshot {
    holder_in(id, Some("Tamil Nadu"), Some("Chennai"))
}

pub fn holder_in(id: &str, state: Option<&str>, district: Option<&str>) -> HolderSnapshot {
    HolderSnapshot {
        id: id.to_string(),
        display_name: format!("Holder {}", id),
        photo_ref: None,
        location: Location {
            village: Some("Perambur".to_string()),
            district: district.map(str::to_string),
            state: state.map(str::to_string),
            country: Some("India".to_string()),
        },
        date_of_birth: NaiveDate::from_ymd_opt(1985, 3, 20),
        gender: Some("Male".to_string()),
    }
}

/// PNG bytes of a solid photo already at the card's photo size
pub fn photo_png(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(80, 100, Rgb(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
