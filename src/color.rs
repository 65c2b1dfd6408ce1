use std::collections::HashMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use crate::data::model::Value;

/// Colour of single-series charts (line, scatter).
pub const SERIES_COLOR: Color32 = Color32::LIGHT_BLUE;

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

/// Assigns each category of a bar chart its own colour, in bar order.
#[derive(Debug, Clone)]
pub struct CategoryColors {
    mapping: HashMap<Value, Color32>,
}

impl CategoryColors {
    pub fn new<'a>(categories: impl ExactSizeIterator<Item = &'a Value>) -> Self {
        let palette = generate_palette(categories.len());
        let mapping = categories.cloned().zip(palette).collect();
        CategoryColors { mapping }
    }

    pub fn color_for(&self, value: &Value) -> Color32 {
        self.mapping.get(value).copied().unwrap_or(Color32::GRAY)
    }
}
