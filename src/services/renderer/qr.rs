use image::{Rgb, RgbImage};
use qrcode::types::Color;
use qrcode::QrCode;

use super::canvas::fill_rect;

/// Light modules kept around the symbol so scanners can find it
const QUIET_ZONE_MODULES: u32 = 2;

/// Side length in pixels of the QR block drawn for `data`
pub fn qr_block_size(data: &str, module_size: u32) -> Result<u32, qrcode::types::QrError> {
    let code = QrCode::new(data.as_bytes())?;
    Ok((code.width() as u32 + 2 * QUIET_ZONE_MODULES) * module_size)
}

/// Draws `data` as a QR symbol with its quiet zone, top-left at `(x, y)`
pub fn draw_qr(
    canvas: &mut RgbImage,
    x: u32,
    y: u32,
    data: &str,
    module_size: u32,
) -> Result<(), qrcode::types::QrError> {
    let code = QrCode::new(data.as_bytes())?;
    let width = code.width() as u32;
    let block = (width + 2 * QUIET_ZONE_MODULES) * module_size;

    fill_rect(canvas, x, y, block, block, Rgb([255, 255, 255]));

    let origin_x = x + QUIET_ZONE_MODULES * module_size;
    let origin_y = y + QUIET_ZONE_MODULES * module_size;
    for module_y in 0..width {
        for module_x in 0..width {
            if code[(module_x as usize, module_y as usize)] == Color::Dark {
                fill_rect(
                    canvas,
                    origin_x + module_x * module_size,
                    origin_y + module_y * module_size,
                    module_size,
                    module_size,
                    Rgb([0, 0, 0]),
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_code_fits_smallest_symbol() {
        // 21 modules for version 1, plus the quiet zone on both sides
        assert_eq!(qr_block_size("FAMTNCH0001", 2).unwrap(), 50);
    }

    #[test]
    fn test_draw_qr_inks_modules() {
        let mut canvas = RgbImage::from_pixel(60, 60, Rgb([200, 200, 200]));
        draw_qr(&mut canvas, 5, 5, "EMPXXAB0001", 2).unwrap();

        // Quiet zone is white, finder pattern corner is dark
        assert_eq!(*canvas.get_pixel(5, 5), Rgb([255, 255, 255]));
        assert_eq!(*canvas.get_pixel(9, 9), Rgb([0, 0, 0]));
    }
}
