//! Card artifact rendering.
//!
//! One raster layout is composed per card; the PNG is that raster encoded and
//! the PDF embeds the same raster as its only page, so both artifacts always
//! look the same.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::sync::Semaphore;

use crate::assets::AssetStore;
use crate::models::{CardType, IdCard};

pub mod canvas;
pub mod pdf;
pub mod qr;

use canvas::{draw_text, draw_text_centered, fill_rect, fit_text, stroke_rect, text_width};

pub const CARD_WIDTH: u32 = 400;
pub const CARD_HEIGHT: u32 = 250;

const PHOTO_X: u32 = 20;
const PHOTO_Y: u32 = 75;
const PHOTO_WIDTH: u32 = 80;
const PHOTO_HEIGHT: u32 = 100;

const FIELDS_X: u32 = 120;
const FIELDS_Y: u32 = 76;
const FIELD_STEP: u32 = 17;
const FIELDS_MAX_WIDTH: u32 = 212;

const QR_MODULE_PX: u32 = 2;
const QR_RIGHT: u32 = 390;
const QR_BOTTOM: u32 = 206;

const BRAND_GREEN: Rgb<u8> = Rgb([21, 128, 61]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const LIGHT_GRAY: Rgb<u8> = Rgb([211, 211, 211]);

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Document assembly failed: {0}")]
    Document(#[from] lopdf::Error),

    #[error("QR code generation failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("Render worker failed: {0}")]
    Worker(String),
}

/// Header texts printed on every card
#[derive(Debug, Clone)]
pub struct Branding {
    pub title: String,
    pub subtitle: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            title: "Digital Agristack Transaction Enterprises".to_string(),
            subtitle: "IDENTITY CARD".to_string(),
        }
    }
}

/// Rendered artifacts for one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard {
    pub png: Vec<u8>,
    pub pdf: Vec<u8>,
    /// Photo drawn on the card; `None` when the placeholder was used
    pub photo_ref: Option<String>,
}

/// Text content of the card face
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFace {
    pub name: String,
    pub code: String,
    pub card_type: CardType,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub village: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub valid_until: NaiveDate,
}

impl CardFace {
    pub fn from_card(card: &IdCard) -> Self {
        Self {
            name: card.holder_name.clone(),
            code: card.code.clone(),
            card_type: card.card_type,
            age: card.age,
            gender: card.gender.clone(),
            village: card.village.clone(),
            district: card.district.clone(),
            state: card.state.clone(),
            valid_until: card.expires_at.date_naive(),
        }
    }

    fn lines(&self) -> Vec<String> {
        let or_dash = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("-")
                .to_string()
        };

        vec![
            format!("Name: {}", self.name),
            format!("ID: {}", self.code),
            format!("Type: {}", self.card_type),
            format!(
                "Age: {}",
                self.age.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string())
            ),
            format!("Gender: {}", or_dash(&self.gender)),
            format!("Village: {}", or_dash(&self.village)),
            format!("District: {}", or_dash(&self.district)),
            format!("State: {}", or_dash(&self.state)),
        ]
    }

    fn footer(&self) -> String {
        format!("Valid Until: {}", self.valid_until.format("%d/%m/%Y"))
    }
}

/// A decoded photo fitted to the photo block
#[derive(Debug, Clone)]
pub struct CardPhoto {
    pub reference: String,
    pub image: RgbImage,
}

/// Composes the card raster. Pure: same inputs, same pixels.
///
/// Without a photo the placeholder block is drawn.
pub fn compose_card(
    branding: &Branding,
    face: &CardFace,
    photo: Option<&RgbImage>,
) -> Result<RgbImage, RenderError> {
    let mut canvas = RgbImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, WHITE);

    stroke_rect(&mut canvas, 5, 5, CARD_WIDTH - 10, CARD_HEIGHT - 10, 3, BLACK);

    // Header band
    fill_rect(&mut canvas, 10, 10, CARD_WIDTH - 20, 36, BRAND_GREEN);
    let title_scale = if text_width(&branding.title, 2) <= CARD_WIDTH - 30 {
        2
    } else {
        1
    };
    let title = fit_text(&branding.title, CARD_WIDTH - 30, title_scale);
    let title_y = 28 - 4 * title_scale;
    draw_text_centered(&mut canvas, title_y, &title, title_scale, WHITE);

    let subtitle = fit_text(&branding.subtitle, CARD_WIDTH - 30, 2);
    draw_text_centered(&mut canvas, 52, &subtitle, 2, BLACK);

    // Photo block
    match photo {
        Some(photo) => {
            image::imageops::replace(&mut canvas, photo, PHOTO_X as i64, PHOTO_Y as i64);
        }
        None => {
            fill_rect(&mut canvas, PHOTO_X, PHOTO_Y, PHOTO_WIDTH, PHOTO_HEIGHT, LIGHT_GRAY);
            stroke_rect(&mut canvas, PHOTO_X, PHOTO_Y, PHOTO_WIDTH, PHOTO_HEIGHT, 1, BLACK);
            let label = "PHOTO";
            let label_x = PHOTO_X + (PHOTO_WIDTH - text_width(label, 1)) / 2;
            draw_text(&mut canvas, label_x, PHOTO_Y + 46, label, 1, BLACK);
        }
    }

    // Text fields
    for (index, line) in face.lines().iter().enumerate() {
        let y = FIELDS_Y + index as u32 * FIELD_STEP;
        draw_text(&mut canvas, FIELDS_X, y, &fit_text(line, FIELDS_MAX_WIDTH, 1), 1, BLACK);
    }

    // Code as QR in the lower right of the body
    let qr_size = qr::qr_block_size(&face.code, QR_MODULE_PX)?;
    qr::draw_qr(
        &mut canvas,
        QR_RIGHT.saturating_sub(qr_size),
        QR_BOTTOM.saturating_sub(qr_size),
        &face.code,
        QR_MODULE_PX,
    )?;

    draw_text_centered(&mut canvas, 226, &face.footer(), 1, BLACK);

    Ok(canvas)
}

/// Decodes photo bytes and scales them to the photo block
pub fn decode_photo(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?
        .resize_exact(PHOTO_WIDTH, PHOTO_HEIGHT, FilterType::Triangle)
        .to_rgb8())
}

pub fn encode_png(raster: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut png_data = Vec::new();
    DynamicImage::ImageRgb8(raster.clone())
        .write_to(&mut Cursor::new(&mut png_data), ImageFormat::Png)?;
    Ok(png_data)
}

/// Renders card artifacts on the blocking pool, bounded in concurrency and time
#[derive(Clone)]
pub struct CardRenderer {
    branding: Branding,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl CardRenderer {
    pub fn new(branding: Branding, timeout: Duration, concurrency: usize) -> Self {
        Self {
            branding,
            timeout,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Resolves the photo to draw: `current` first, then `frozen`.
    ///
    /// A source is only tried when the previous one yielded nothing. Missing,
    /// unreadable and undecodable photos are logged and skipped.
    pub async fn resolve_photo(
        &self,
        assets: &dyn AssetStore,
        current: Option<&str>,
        frozen: Option<&str>,
    ) -> Option<CardPhoto> {
        let mut tried: Vec<&str> = Vec::with_capacity(2);

        for reference in [current, frozen].into_iter().flatten().map(str::trim) {
            if reference.is_empty() || tried.contains(&reference) {
                continue;
            }
            tried.push(reference);

            let bytes = match assets.load_photo(reference).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    tracing::warn!(photo_ref = %reference, "Photo not found, trying next source");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(photo_ref = %reference, error = %e, "Photo could not be loaded, trying next source");
                    continue;
                }
            };

            match tokio::task::spawn_blocking(move || decode_photo(&bytes)).await {
                Ok(Ok(image)) => {
                    return Some(CardPhoto {
                        reference: reference.to_string(),
                        image,
                    })
                }
                Ok(Err(e)) => {
                    tracing::warn!(photo_ref = %reference, error = %e, "Photo could not be decoded, trying next source");
                }
                Err(e) => {
                    tracing::warn!(photo_ref = %reference, error = %e, "Photo decode worker failed, trying next source");
                }
            }
        }

        None
    }

    /// Renders `card`, preferring `current_photo` over the photo frozen on the card
    #[tracing::instrument(skip(self, assets, card), fields(code = %card.code))]
    pub async fn render(
        &self,
        assets: &dyn AssetStore,
        card: &IdCard,
        current_photo: Option<&str>,
    ) -> Result<RenderedCard, RenderError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Worker("render pool closed".to_string()))?;

        let photo = self
            .resolve_photo(assets, current_photo, card.photo_ref.as_deref())
            .await;
        let photo_ref = photo.as_ref().map(|p| p.reference.clone());
        if photo_ref.is_none() {
            tracing::debug!("No photo available, using placeholder");
        }

        let face = CardFace::from_card(card);
        let branding = self.branding.clone();

        let work = async move {
            let raster = tokio::task::spawn_blocking(move || {
                compose_card(&branding, &face, photo.as_ref().map(|p| &p.image))
            })
            .await
            .map_err(|e| RenderError::Worker(e.to_string()))??;

            // Both encodings read the same raster, so they run side by side
            let raster = Arc::new(raster);
            let png_raster = Arc::clone(&raster);
            let png_task = tokio::task::spawn_blocking(move || encode_png(&png_raster));
            let pdf_task = tokio::task::spawn_blocking(move || {
                pdf::single_page_pdf(&raster).map_err(RenderError::from)
            });

            let (png, pdf) = tokio::try_join!(png_task, pdf_task)
                .map_err(|e| RenderError::Worker(e.to_string()))?;

            Ok::<_, RenderError>((png?, pdf?))
        };

        let (png, pdf) = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))??;

        tracing::debug!(
            png_bytes = png.len(),
            pdf_bytes = pdf.len(),
            photo_ref = ?photo_ref,
            "Card rendered"
        );

        Ok(RenderedCard {
            png,
            pdf,
            photo_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetStore;
    use crate::testing::{card_with_code, photo_png};

    fn renderer() -> CardRenderer {
        CardRenderer::new(Branding::default(), Duration::from_secs(10), 2)
    }

    fn decoded_size(png: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(png).unwrap();
        (img.width(), img.height())
    }

    fn photo_pixel(png: &[u8]) -> Rgb<u8> {
        let img = image::load_from_memory(png).unwrap().to_rgb8();
        *img.get_pixel(PHOTO_X + 40, PHOTO_Y + 50)
    }

    #[tokio::test]
    async fn test_unresolvable_photo_still_renders() {
        let assets = MemoryAssetStore::new();
        let card = card_with_code("FAMTNCH0001");

        let rendered = renderer()
            .render(&assets, &card, Some("missing.jpg"))
            .await
            .unwrap();

        assert_eq!(decoded_size(&rendered.png), (CARD_WIDTH, CARD_HEIGHT));
        assert!(rendered.pdf.starts_with(b"%PDF"));
        assert_eq!(rendered.photo_ref, None);
    }

    #[tokio::test]
    async fn test_photo_load_errors_degrade_to_placeholder() {
        let assets = MemoryAssetStore::new();
        assets.put_photo("p.png", photo_png([200, 0, 0]));
        assets.set_fail_photo_loads(true);
        let card = card_with_code("FAMTNCH0001");

        let rendered = renderer().render(&assets, &card, Some("p.png")).await.unwrap();
        let img = image::load_from_memory(&rendered.png).unwrap().to_rgb8();

        assert_eq!(*img.get_pixel(PHOTO_X + 5, PHOTO_Y + 5), LIGHT_GRAY);
    }

    #[tokio::test]
    async fn test_current_photo_takes_precedence_and_stops_the_chain() {
        let assets = MemoryAssetStore::new();
        assets.put_photo("current.png", photo_png([0, 0, 200]));
        assets.put_photo("frozen.png", photo_png([200, 0, 0]));
        let mut card = card_with_code("FAMTNCH0001");
        card.photo_ref = Some("frozen.png".to_string());

        let rendered = renderer()
            .render(&assets, &card, Some("current.png"))
            .await
            .unwrap();

        assert_eq!(photo_pixel(&rendered.png), Rgb([0, 0, 200]));
        assert_eq!(rendered.photo_ref.as_deref(), Some("current.png"));
        // The frozen photo was never read
        assert_eq!(assets.photo_loads(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_frozen_photo() {
        let assets = MemoryAssetStore::new();
        assets.put_photo("frozen.png", photo_png([200, 0, 0]));
        let mut card = card_with_code("FAMTNCH0001");
        card.photo_ref = Some("frozen.png".to_string());

        let rendered = renderer()
            .render(&assets, &card, Some("gone.png"))
            .await
            .unwrap();

        assert_eq!(photo_pixel(&rendered.png), Rgb([200, 0, 0]));
        assert_eq!(rendered.photo_ref.as_deref(), Some("frozen.png"));
    }

    #[tokio::test]
    async fn test_undecodable_photo_falls_through() {
        let assets = MemoryAssetStore::new();
        assets.put_photo("broken.jpg", b"not an image".to_vec());
        assets.put_photo("good.png", photo_png([0, 200, 0]));
        let mut card = card_with_code("EMPXXAB0001");
        card.photo_ref = Some("good.png".to_string());

        let rendered = renderer()
            .render(&assets, &card, Some("broken.jpg"))
            .await
            .unwrap();

        assert_eq!(photo_pixel(&rendered.png), Rgb([0, 200, 0]));
        assert_eq!(rendered.photo_ref.as_deref(), Some("good.png"));
    }

    #[tokio::test]
    async fn test_same_reference_is_loaded_once() {
        let assets = MemoryAssetStore::new();
        let mut card = card_with_code("FAMTNCH0001");
        card.photo_ref = Some("gone.png".to_string());

        renderer().render(&assets, &card, Some(" gone.png ")).await.unwrap();

        assert_eq!(assets.photo_loads(), 1);
    }

    #[test]
    fn test_layout_landmarks() {
        let card = card_with_code("FAMTNCH0001");
        let raster = compose_card(&Branding::default(), &CardFace::from_card(&card), None).unwrap();

        assert_eq!(raster.dimensions(), (CARD_WIDTH, CARD_HEIGHT));
        assert_eq!(*raster.get_pixel(6, 6), BLACK);
        assert_eq!(*raster.get_pixel(12, 12), BRAND_GREEN);
        assert_eq!(*raster.get_pixel(PHOTO_X + 2, PHOTO_Y + 2), LIGHT_GRAY);
    }

    #[test]
    fn test_composition_is_deterministic() {
        let card = card_with_code("FAMTNCH0001");
        let face = CardFace::from_card(&card);
        let photo = decode_photo(&photo_png([10, 20, 30])).unwrap();

        let a = encode_png(&compose_card(&Branding::default(), &face, Some(&photo)).unwrap()).unwrap();
        let b = encode_png(&compose_card(&Branding::default(), &face, Some(&photo)).unwrap()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_face_lines_use_placeholders_for_missing_values() {
        let mut card = card_with_code("FAMTNCH0001");
        card.age = None;
        card.village = Some("  ".to_string());

        let lines = CardFace::from_card(&card).lines();

        assert_eq!(lines[1], "ID: FAMTNCH0001");
        assert_eq!(lines[2], "Type: FARMER");
        assert_eq!(lines[3], "Age: -");
        assert_eq!(lines[5], "Village: -");
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_render() {
        let assets = MemoryAssetStore::new();
        let renderer = CardRenderer::new(Branding::default(), Duration::ZERO, 1);
        let card = card_with_code("FAMTNCH0001");

        let result = renderer.render(&assets, &card, None).await;

        assert!(matches!(result, Err(RenderError::Timeout(_))));
    }
}
