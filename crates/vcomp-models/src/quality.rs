//! Quality tiers and the profile table shared by the encoder and the
//! master manifest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One target rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// All tiers in declaration order. Encoding and manifest order follow it.
    pub const ALL: [QualityTier; 3] = [QualityTier::High, QualityTier::Medium, QualityTier::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }

    /// Resolve a tier name, falling back to `High` for anything unknown.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "medium" => QualityTier::Medium,
            "low" => QualityTier::Low,
            _ => QualityTier::High,
        }
    }

    /// Prefix for the tier's configuration variables (`HIGH_RESOLUTION`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            QualityTier::High => "HIGH",
            QualityTier::Medium => "MEDIUM",
            QualityTier::Low => "LOW",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encoding and advertising parameters for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub tier: QualityTier,
    /// Target vertical resolution (scale=-2:height)
    pub height: u32,
    /// Constant Rate Factor
    pub crf: u8,
    /// Target video bitrate in FFmpeg notation (e.g. "5000k")
    pub video_bitrate: String,
    /// Bandwidth advertised in the master manifest, bits/second
    pub bandwidth: u64,
    /// Advertised frame width
    pub frame_width: u32,
    /// Advertised frame height
    pub frame_height: u32,
}

impl QualityProfile {
    /// Built-in defaults for a tier.
    pub fn default_for(tier: QualityTier) -> Self {
        match tier {
            QualityTier::High => Self {
                tier,
                height: 1080,
                crf: 23,
                video_bitrate: "5000k".to_string(),
                bandwidth: 5_000_000,
                frame_width: 1920,
                frame_height: 1080,
            },
            QualityTier::Medium => Self {
                tier,
                height: 480,
                crf: 28,
                video_bitrate: "2500k".to_string(),
                bandwidth: 2_500_000,
                frame_width: 854,
                frame_height: 480,
            },
            QualityTier::Low => Self {
                tier,
                height: 360,
                crf: 32,
                video_bitrate: "1000k".to_string(),
                bandwidth: 1_000_000,
                frame_width: 640,
                frame_height: 360,
            },
        }
    }

    /// `WIDTHxHEIGHT` as advertised in `RESOLUTION=`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.frame_width, self.frame_height)
    }

    /// Twice the target bitrate, used as the rate-control buffer size.
    ///
    /// Returns `None` when the bitrate is not in `<number>[k|M]` form or
    /// doubling it overflows.
    pub fn buffer_size(&self) -> Option<String> {
        let raw = self.video_bitrate.trim();
        let (digits, suffix) = match raw.char_indices().last() {
            Some((i, c)) if c.is_ascii_alphabetic() => (&raw[..i], &raw[i..]),
            _ => (raw, ""),
        };
        let value: u64 = digits.parse().ok()?;
        Some(format!("{}{}", value.checked_mul(2)?, suffix))
    }

    /// Parse `WIDTHxHEIGHT`.
    pub fn parse_frame_size(s: &str) -> Option<(u32, u32)> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// The ordered tier table.
///
/// Single source of truth for encoder invocation and manifest generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLadder {
    profiles: Vec<QualityProfile>,
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self {
            profiles: QualityTier::ALL
                .iter()
                .map(|t| QualityProfile::default_for(*t))
                .collect(),
        }
    }
}

impl QualityLadder {
    /// Build a ladder, applying `overrides` on top of the defaults.
    ///
    /// Profiles for tiers not present in `overrides` keep their defaults; the
    /// result is always in declaration order.
    pub fn with_overrides(overrides: impl IntoIterator<Item = QualityProfile>) -> Self {
        let mut ladder = Self::default();
        for profile in overrides {
            if let Some(slot) = ladder.profiles.iter_mut().find(|p| p.tier == profile.tier) {
                *slot = profile;
            }
        }
        ladder
    }

    /// Profile for a tier.
    pub fn get(&self, tier: QualityTier) -> &QualityProfile {
        // The ladder always holds one profile per tier.
        self.profiles
            .iter()
            .find(|p| p.tier == tier)
            .unwrap_or(&self.profiles[0])
    }

    /// Profile for a tier name; unknown names resolve to `high`.
    pub fn resolve(&self, name: &str) -> &QualityProfile {
        self.get(QualityTier::from_name(name))
    }

    /// Profiles in declaration order (high, medium, low).
    pub fn iter(&self) -> impl Iterator<Item = &QualityProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
