use crate::config::WatermarkConfig;
use crate::error::AppError;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;

const SHADOW: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// Burns text lines into an image.
pub trait Watermarker {
    fn stamp(&self, image: &mut RgbImage, lines: &[String]);
}

/// Top-left corner for each line: right-aligned against the margin, the
/// whole block lifted off the bottom edge by the margin and clearance.
pub fn layout(
    width: u32,
    height: u32,
    line_widths: &[u32],
    line_height: u32,
    config: &WatermarkConfig,
) -> Vec<(i32, i32)> {
    let x_base = width as i32 - config.margin as i32;
    let total_height = (line_height as usize * line_widths.len()) as i32;
    let top = height as i32 - total_height - config.margin as i32 - config.bottom_clearance as i32;

    line_widths
        .iter()
        .enumerate()
        .map(|(i, &w)| (x_base - w as i32, top + (i as i32) * line_height as i32))
        .collect()
}

/// Font size in pixels for an image of `height`.
pub fn font_px(height: u32, config: &WatermarkConfig) -> u32 {
    ((height as f32 * config.font_ratio) as u32).max(config.min_font_px)
}

pub struct FontWatermarker {
    font: FontVec,
    config: WatermarkConfig,
}

impl FontWatermarker {
    pub fn new(font: FontVec, config: WatermarkConfig) -> Self {
        Self { font, config }
    }

    pub fn from_file(path: &Path, config: WatermarkConfig) -> Result<Self, AppError> {
        log::debug!("Loading watermark font from {:?}", path);
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data)?;
        Ok(Self::new(font, config))
    }
}

impl Watermarker for FontWatermarker {
    fn stamp(&self, image: &mut RgbImage, lines: &[String]) {
        let (width, height) = image.dimensions();
        let scale = PxScale::from(font_px(height, &self.config) as f32);
        let line_height = text_size(scale, &self.font, "Hg").1 + self.config.line_padding;
        let widths: Vec<u32> = lines
            .iter()
            .map(|line| text_size(scale, &self.font, line).0)
            .collect();
        let offset = self.config.shadow_offset;

        for (line, (x, y)) in lines
            .iter()
            .zip(layout(width, height, &widths, line_height, &self.config))
        {
            draw_text_mut(image, SHADOW, x + offset, y + offset, scale, &self.font, line);
            draw_text_mut(image, TEXT, x, y, scale, &self.font, line);
        }
        log::trace!("Stamped {} lines at {}px", lines.len(), scale.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FONT_CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];

    fn system_font() -> Option<FontVec> {
        FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .and_then(|p| std::fs::read(p).ok())
            .and_then(|data| FontVec::try_from_vec(data).ok())
    }

    #[test]
    fn layout_right_aligns_and_stacks_top_down() {
        let config = WatermarkConfig::default();
        let positions = layout(1000, 800, &[300, 120, 50], 40, &config);

        // x_base = 980, block top = 800 - 120 - 20 - 64 = 596
        assert_eq!(positions, vec![(680, 596), (860, 636), (930, 676)]);
    }

    #[test]
    fn layout_lets_long_lines_overflow() {
        let config = WatermarkConfig::default();
        let positions = layout(100, 100, &[500], 20, &config);
        assert_eq!(positions, vec![(-420, -4)]);
    }

    #[test]
    fn font_size_scales_with_height_with_a_floor() {
        let config = WatermarkConfig::default();
        assert_eq!(font_px(4000, &config), 120);
        assert_eq!(font_px(1000, &config), 30);
        assert_eq!(font_px(200, &config), 16);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let result = FontWatermarker::from_file(
            Path::new("/nonexistent/font.ttf"),
            WatermarkConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[test]
    fn invalid_font_data_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a font").unwrap();
        let result = FontWatermarker::from_file(file.path(), WatermarkConfig::default());
        assert!(matches!(result, Err(AppError::Font(_))));
    }

    #[test]
    fn stamps_white_text_with_dark_shadow() {
        // Skip when no system font is installed
        let Some(font) = system_font() else {
            return;
        };
        let watermarker = FontWatermarker::new(font, WatermarkConfig::default());
        let mut image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        watermarker.stamp(
            &mut image,
            &["19 May 2025 08:12:33".to_string(), "-6.2 106.8".to_string()],
        );

        let pixels: Vec<&Rgb<u8>> = image.pixels().collect();
        assert!(pixels.iter().any(|p| p.0 == [255, 255, 255]));
        assert!(pixels.iter().any(|p| p.0 == [0, 0, 0]));
        // Top-left stays untouched.
        assert_eq!(image.get_pixel(5, 5).0, [128, 128, 128]);
    }
}
