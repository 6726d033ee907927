//! Color conversion and comparison.
//!
//! Hex ↔ RGB ↔ CIE-Lab conversions and the CIE76 ΔE distance used to score
//! a guess. The scoring constants are fixed so feedback stays comparable with
//! previously recorded accuracy values.

use crate::{error::Result, Error};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// D65 reference white, CIE 1931 2° observer.
const D65_WHITE: [f64; 3] = [0.95047, 1.0, 1.08883];
const LAB_EPSILON: f64 = 216.0 / 24389.0;
const LAB_KAPPA: f64 = 24389.0 / 27.0;

/// ΔE that maps to 0% similarity divided by 100 (ΔE 2.3 is one JND).
const DELTA_E_SCALE: f64 = 2.3;

/// Maximum per-channel offset of [`generate_nearby_color`].
pub const NEARBY_OFFSET: i32 = 10;

/// An 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Read one channel.
    pub fn channel(self, channel: Channel) -> u8 {
        match channel {
            Channel::Red => self.r,
            Channel::Green => self.g,
            Channel::Blue => self.b,
        }
    }

    /// Replace one channel.
    pub fn with_channel(mut self, channel: Channel, value: u8) -> Self {
        match channel {
            Channel::Red => self.r = value,
            Channel::Green => self.g = value,
            Channel::Blue => self.b = value,
        }
        self
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A CIE-Lab color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

/// One of the three RGB channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "r" | "red" => Ok(Channel::Red),
            "g" | "green" => Ok(Channel::Green),
            "b" | "blue" => Ok(Channel::Blue),
            other => Err(Error::validation("channel", format!("unknown channel '{other}'"))),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Red => write!(f, "red"),
            Channel::Green => write!(f, "green"),
            Channel::Blue => write!(f, "blue"),
        }
    }
}

/// Feedback bucket for a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCategory {
    VeryClose,
    GoodProgress,
    NeedsWork,
    FarOff,
}

impl MatchCategory {
    fn from_percentage(percentage: f64) -> Self {
        if percentage > 90.0 {
            MatchCategory::VeryClose
        } else if percentage > 70.0 {
            MatchCategory::GoodProgress
        } else if percentage > 50.0 {
            MatchCategory::NeedsWork
        } else {
            MatchCategory::FarOff
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            MatchCategory::VeryClose => "very close",
            MatchCategory::GoodProgress => "good progress",
            MatchCategory::NeedsWork => "needs work",
            MatchCategory::FarOff => "far off",
        }
    }
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of comparing a guess against the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorComparison {
    /// Similarity in [0, 100], rounded to two decimals
    pub percentage: f64,
    /// CIE76 distance
    pub delta_e: f64,
    pub category: MatchCategory,
}

/// Which channel is furthest off, and which way to move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelHint {
    pub channel: Channel,
    /// Signed difference `target - guess`
    pub difference: i32,
}

impl ChannelHint {
    pub fn is_increase(&self) -> bool {
        self.difference > 0
    }
}

/// Parse `RRGGBB` or `#RRGGBB`.
pub fn hex_to_rgb(hex: &str) -> Result<Rgb> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidFormat(hex.to_string()));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| Error::InvalidFormat(hex.to_string()))
    };
    Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Parse a 6-digit color or a 3-digit shorthand (`#abc` → `#aabbcc`).
pub fn parse_hex_lenient(hex: &str) -> Result<Rgb> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() == 3 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
        return hex_to_rgb(&expanded);
    }
    hex_to_rgb(hex)
}

/// Normalize a user-supplied color to lowercase `#rrggbb`.
pub fn normalize_hex(hex: &str) -> Result<String> {
    parse_hex_lenient(hex).map(Rgb::to_hex)
}

fn srgb_to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        (LAB_KAPPA * t + 16.0) / 116.0
    }
}

/// sRGB → XYZ (D65) → CIE-Lab.
pub fn rgb_to_lab(rgb: Rgb) -> Lab {
    let r = srgb_to_linear(rgb.r);
    let g = srgb_to_linear(rgb.g);
    let b = srgb_to_linear(rgb.b);

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    let fx = lab_f(x / D65_WHITE[0]);
    let fy = lab_f(y / D65_WHITE[1]);
    let fz = lab_f(z / D65_WHITE[2]);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// CIE76 ΔE: Euclidean distance in Lab space.
pub fn lab_distance(a: Lab, b: Lab) -> f64 {
    ((a.l - b.l).powi(2) + (a.a - b.a).powi(2) + (a.b - b.b).powi(2)).sqrt()
}

/// Score a guess against a target.
pub fn compare_colors(guess: &str, target: &str) -> Result<ColorComparison> {
    let guess = rgb_to_lab(parse_hex_lenient(guess)?);
    let target = rgb_to_lab(parse_hex_lenient(target)?);
    let delta_e = lab_distance(guess, target);

    let raw = (100.0 - (delta_e / DELTA_E_SCALE) * 100.0).clamp(0.0, 100.0);
    let percentage = (raw * 100.0).round() / 100.0;

    Ok(ColorComparison {
        percentage,
        delta_e,
        category: MatchCategory::from_percentage(percentage),
    })
}

/// Add `delta` to one channel, clamped to [0, 255].
pub fn adjust_channel(hex: &str, channel: Channel, delta: i32) -> Result<String> {
    let rgb = parse_hex_lenient(hex)?;
    let value = i32::from(rgb.channel(channel))
        .saturating_add(delta)
        .clamp(0, 255) as u8;
    Ok(rgb.with_channel(channel, value).to_hex())
}

/// Uniform random 24-bit color.
pub fn generate_random_color<R: Rng + ?Sized>(rng: &mut R) -> String {
    let value: u32 = rng.random_range(0..=0xFF_FFFF);
    format!("#{value:06x}")
}

/// A color within ±[`NEARBY_OFFSET`] per channel of `hex`.
pub fn generate_nearby_color<R: Rng + ?Sized>(hex: &str, rng: &mut R) -> Result<String> {
    let mut rgb = parse_hex_lenient(hex)?;
    for channel in Channel::ALL {
        let offset = rng.random_range(-NEARBY_OFFSET..=NEARBY_OFFSET);
        let value = (i32::from(rgb.channel(channel)) + offset).clamp(0, 255) as u8;
        rgb = rgb.with_channel(channel, value);
    }
    Ok(rgb.to_hex())
}

/// The channel with the largest absolute difference, or `None` on an exact match.
pub fn channel_hint(guess: &str, target: &str) -> Result<Option<ChannelHint>> {
    let guess = parse_hex_lenient(guess)?;
    let target = parse_hex_lenient(target)?;

    let hint = Channel::ALL
        .iter()
        .map(|&channel| ChannelHint {
            channel,
            difference: i32::from(target.channel(channel)) - i32::from(guess.channel(channel)),
        })
        .filter(|hint| hint.difference != 0)
        .max_by_key(|hint| hint.difference.abs());

    Ok(hint)
}
