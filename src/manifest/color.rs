use std::fmt;

use glam::DVec3;

/// 8-bit sRGB colour as written in manifests (`#RRGGBB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Accepts `#RRGGBB`, `RRGGBB` and the short `#RGB` form.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.is_ascii() {
            return None;
        }

        match digits.len() {
            6 => Some(Self::new(
                u8::from_str_radix(&digits[0..2], 16).ok()?,
                u8::from_str_radix(&digits[2..4], 16).ok()?,
                u8::from_str_radix(&digits[4..6], 16).ok()?,
            )),
            3 => {
                let channel = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).map(|v| v * 17);
                Some(Self::new(channel(0).ok()?, channel(1).ok()?, channel(2).ok()?))
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Channels scaled to `0.0..=1.0`, the way host colour properties store them.
    pub fn to_unit(&self) -> DVec3 {
        DVec3::new(self.r as f64, self.g as f64, self.b as f64) / 255.0
    }

    pub fn from_unit(rgb: DVec3) -> Self {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(channel(rgb.x), channel(rgb.y), channel(rgb.z))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(Color::from_hex("#FFA500"), Some(Color::new(255, 165, 0)));
        assert_eq!(Color::from_hex("ffa500"), Some(Color::new(255, 165, 0)));
        assert_eq!(Color::from_hex("#fff"), Some(Color::WHITE));
        assert_eq!(Color::from_hex("#12345"), None);
        assert_eq!(Color::from_hex("#GG0000"), None);
    }

    #[test]
    fn unit_conversion_is_lossless_for_8_bit_values() {
        for value in [0u8, 1, 37, 128, 254, 255] {
            let color = Color::new(value, 255 - value, value / 2);
            assert_eq!(Color::from_unit(color.to_unit()), color);
        }
        assert_eq!(Color::new(255, 165, 0).to_hex(), "#FFA500");
    }
}
