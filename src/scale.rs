use crate::aggregate::DomainBounds;
use crate::error::{ChoroplethError, ChoroplethResult};
use image::Rgba;
use serde::Serialize;

/// ColorBrewer sequential Reds, 9 classes.
pub const REDS_9: [&str; 9] = [
    "#fff5f0", "#fee0d2", "#fcbba1", "#fc9272", "#fb6a4a", "#ef3b2c", "#cb181d", "#a50f15", "#67000d",
];

pub const DEFAULT_NEUTRAL: &str = "#bdbdbd";

/// Fractions of the domain span at which legend thresholds are shown.
const LEGEND_STEPS: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Color {
    hex: String,
    rgba: Rgba<u8>,
}

impl Color {
    pub fn parse(hex: &str) -> ChoroplethResult<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ChoroplethError::InvalidColor(hex.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ChoroplethError::InvalidColor(hex.to_string()))
        };
        Ok(Color {
            hex: format!("#{}", digits.to_ascii_lowercase()),
            rgba: Rgba([channel(0)?, channel(2)?, channel(4)?, 255]),
        })
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn rgba(&self) -> Rgba<u8> {
        self.rgba
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.hex)
    }
}

/// Palette plus the fill used for boundaries with no aggregate.
#[derive(Debug, Clone)]
pub struct ColorStyle {
    pub palette: Vec<Color>,
    pub neutral: Color,
}

impl ColorStyle {
    pub fn new(palette: &[impl AsRef<str>], neutral: &str) -> ChoroplethResult<Self> {
        if palette.is_empty() {
            return Err(ChoroplethError::EmptyPalette);
        }
        Ok(ColorStyle {
            palette: palette.iter().map(|c| Color::parse(c.as_ref())).collect::<Result<_, _>>()?,
            neutral: Color::parse(neutral)?,
        })
    }
}

impl Default for ColorStyle {
    fn default() -> Self {
        ColorStyle {
            palette: REDS_9.iter().filter_map(|c| Color::parse(c).ok()).collect(),
            neutral: Color { hex: DEFAULT_NEUTRAL.to_string(), rgba: Rgba([0xbd, 0xbd, 0xbd, 255]) },
        }
    }
}

/// Uniform quantization of `[min, max]` onto a discrete palette.
#[derive(Debug, Clone)]
pub struct QuantizeScale {
    domain: DomainBounds,
    range: Vec<Color>,
}

impl QuantizeScale {
    pub fn new(domain: DomainBounds, range: Vec<Color>) -> ChoroplethResult<Self> {
        if range.is_empty() {
            return Err(ChoroplethError::EmptyPalette);
        }
        Ok(QuantizeScale { domain, range })
    }

    pub fn domain(&self) -> DomainBounds {
        self.domain
    }

    pub fn bucket(&self, value: f64) -> usize {
        let last = self.range.len() - 1;
        let span = self.domain.span();
        // degenerate domain: everything lands in the first bucket
        if span <= 0.0 || !value.is_finite() {
            return 0;
        }
        let i = (self.range.len() as f64 * (value - self.domain.min) / span).floor();
        if i <= 0.0 {
            0
        } else {
            (i as usize).min(last)
        }
    }

    pub fn color(&self, value: f64) -> &Color {
        &self.range[self.bucket(value)]
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        LEGEND_STEPS
            .iter()
            .map(|step| {
                let threshold = self.domain.min + self.domain.span() * step;
                LegendEntry {
                    threshold,
                    label: two_decimals(threshold),
                    color: self.color(threshold).clone(),
                }
            })
            .collect()
    }
}

// halves round away from zero (80.625 -> "80.63"); `{:.2}` alone rounds to even
fn two_decimals(value: f64) -> String {
    format!("{:.2}", (value * 100.0).round() / 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub threshold: f64,
    pub label: String,
    pub color: Color,
}
