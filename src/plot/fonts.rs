//! Bundled font for figure text.
//!
//! Plotters draws glyphs through `ab_glyph`, which only knows fonts that were
//! registered by name. Every family the charts ask for maps onto DejaVu Sans.

use std::sync::OnceLock;

use plotters::style::{register_font, FontStyle};

use crate::error::AppError;

/// DejaVu Sans, embedded at compile time.
pub static BUNDLED_FONT_BYTES: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");

/// Family name used by captions, labels and annotations.
pub const FONT_FAMILY: &str = "sans-serif";

static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

/// Register the bundled font once per process.
pub fn register_fonts() -> Result<(), AppError> {
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, BUNDLED_FONT_BYTES)
                .map_err(|_| "bundled font could not be parsed".to_string())
        })
        .clone()
        .map_err(|e| AppError::new(5, format!("Failed to load plot font: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_font_registers_repeatedly() {
        assert!(BUNDLED_FONT_BYTES.len() > 1000);
        register_fonts().unwrap();
        register_fonts().unwrap();
    }
}
