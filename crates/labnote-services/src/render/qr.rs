//! QR code encoding and the PNG sheet used by the QR-PNG export

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use labnote_core::AppError;
use qrcode::{Color, QrCode};
use std::io::Cursor;

use super::font;

/// Light modules around the symbol, as required by the QR standard
pub const QUIET_ZONE: usize = 4;
/// Code size used when the request gives none (or a non-positive one)
pub const DEFAULT_SIZE: u32 = 250;
pub const MAX_SIZE: u32 = 1000;
/// Largest PNG sheet, in pixels, before a selection is refused
pub const MAX_SHEET_PIXELS: u64 = 64 * 1024 * 1024;

const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: u32 = 6;

/// Dark/light module grid of one QR symbol, without quiet zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    width: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(data: &str) -> Result<Self, AppError> {
        let code = QrCode::new(data.as_bytes())
            .map_err(|e| AppError::Render(format!("Failed to encode QR code: {}", e)))?;
        let width = code.width();
        let dark = code
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();
        Ok(Self { width, dark })
    }

    /// Modules per side
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.dark[y * self.width + x]
    }

    /// Modules per side including the quiet zone on both edges
    pub fn width_with_quiet_zone(&self) -> usize {
        self.width + 2 * QUIET_ZONE
    }
}

/// Clamp the requested pixel size: non-positive means default, anything above the cap
/// is capped.
pub fn normalize_size(requested: i64) -> u32 {
    if requested <= 0 {
        DEFAULT_SIZE
    } else {
        requested.min(MAX_SIZE as i64) as u32
    }
}

/// Draw one code scaled to fit `size` x `size` pixels at `(x, y)`
fn draw_code(image: &mut GrayImage, matrix: &QrMatrix, x: u32, y: u32, size: u32) {
    let modules = matrix.width_with_quiet_zone() as u32;
    let scale = (size / modules).max(1);
    let offset = size.saturating_sub(modules * scale) / 2;
    for my in 0..matrix.width() {
        for mx in 0..matrix.width() {
            if !matrix.is_dark(mx, my) {
                continue;
            }
            let left = x + offset + (mx as u32 + QUIET_ZONE as u32) * scale;
            let top = y + offset + (my as u32 + QUIET_ZONE as u32) * scale;
            for py in top..top + scale {
                for px in left..left + scale {
                    if px < image.width() && py < image.height() {
                        image.put_pixel(px, py, Luma([0]));
                    }
                }
            }
        }
    }
}

/// Grid of a sheet holding `count` codes: `(columns, cell height, width, height)`.
///
/// Fails with `InvalidInput` when the sheet would exceed [`MAX_SHEET_PIXELS`].
fn sheet_layout(count: usize, size: u32, with_title: bool) -> Result<(u32, u32, u32, u32), AppError> {
    let count = count.max(1) as u64;
    let columns = (count as f64).sqrt().ceil() as u64;
    let rows = count.div_ceil(columns);
    let label_height = if with_title {
        font::GLYPH_HEIGHT * LABEL_SCALE + 2 * LABEL_PADDING
    } else {
        0
    };
    let cell_height = size as u64 + label_height as u64;
    let width = columns * size as u64;
    let height = rows * cell_height;
    if width.max(height) > MAX_SHEET_PIXELS || width.saturating_mul(height) > MAX_SHEET_PIXELS {
        return Err(AppError::InvalidInput(format!(
            "QR sheet of {} codes at {}px would be {}x{} pixels, above the {} pixel limit; \
             select fewer entries or a smaller size",
            count, size, width, height, MAX_SHEET_PIXELS
        )));
    }
    // all four fit in u32: each is at most MAX_SHEET_PIXELS
    Ok((columns as u32, cell_height as u32, width as u32, height as u32))
}

/// Render codes on one PNG sheet laid out in a near-square grid, each cell `size`
/// pixels wide, optionally with a title label under each code.
pub fn render_png_sheet(
    codes: &[(QrMatrix, String)],
    size: u32,
    with_title: bool,
) -> Result<Vec<u8>, AppError> {
    let (columns, cell_height, width, height) = sheet_layout(codes.len(), size, with_title)?;

    let mut sheet = GrayImage::from_pixel(width, height, Luma([255]));
    for (n, (matrix, title)) in codes.iter().enumerate() {
        let n = n as u32;
        let x = (n % columns) * size;
        let y = (n / columns) * cell_height;
        draw_code(&mut sheet, matrix, x, y, size);
        if with_title {
            let label = font::fit_text(title, size.saturating_sub(2 * LABEL_PADDING), LABEL_SCALE);
            let label_x = x + size.saturating_sub(font::text_width(&label, LABEL_SCALE)) / 2;
            font::draw_text(&mut sheet, label_x, y + size + LABEL_PADDING, &label, LABEL_SCALE);
        }
    }

    let mut buffer = Vec::new();
    DynamicImage::ImageLuma8(sheet)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| AppError::Render(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer)
}
