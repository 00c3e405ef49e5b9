//! Global progress budget of one job attempt.
//!
//! ```text
//! downloading      0..5    (10% download granularity)
//! creating_poster  5
//! compressing_*    10..95  (equal slices in ladder order)
//! finalizing       95
//! completed        100
//! ```

use vcomp_models::{QualityLadder, QualityTier};

const DOWNLOAD: ProgressRange = ProgressRange::new(0, 5);
const POSTER: u8 = 5;
const TIERS_START: u8 = 10;
const TIERS_END: u8 = 95;
const FINALIZING: u8 = 95;

/// Download percent granularity mapped into the budget.
const DOWNLOAD_STEP_PERCENT: u8 = 10;

/// A closed slice of the 0..=100 progress budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRange {
    pub start: u8,
    pub end: u8,
}

impl ProgressRange {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Rescale a 0..=100 percent into this range.
    pub fn scale(&self, percent: u8) -> u8 {
        let span = u32::from(self.end.saturating_sub(self.start));
        let offset = span * u32::from(percent.min(100)) / 100;
        self.start + offset as u8
    }
}

/// Ordered `(tier, range)` table plus the fixed stage points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPlan {
    tiers: Vec<(QualityTier, ProgressRange)>,
}

impl ProgressPlan {
    /// Split the encode budget evenly across the ladder's tiers, in order.
    pub fn for_ladder(ladder: &QualityLadder) -> Self {
        let tiers: Vec<QualityTier> = ladder.iter().map(|p| p.tier).collect();
        let count = tiers.len().max(1) as u32;
        let span = u32::from(TIERS_END - TIERS_START);
        let bound = |i: u32| TIERS_START + ((span * i + count / 2) / count) as u8;

        let tiers = tiers
            .into_iter()
            .enumerate()
            .map(|(i, tier)| {
                let i = i as u32;
                (tier, ProgressRange::new(bound(i), bound(i + 1)))
            })
            .collect();

        Self { tiers }
    }

    /// Download percent to job progress, coarsened to 10% of the download.
    pub fn download(&self, percent: u8) -> u8 {
        let coarse = percent.min(100) / DOWNLOAD_STEP_PERCENT * DOWNLOAD_STEP_PERCENT;
        DOWNLOAD.scale(coarse)
    }

    pub fn poster(&self) -> u8 {
        POSTER
    }

    /// Range of a tier; tiers outside the ladder get an empty range at the end.
    pub fn tier(&self, tier: QualityTier) -> ProgressRange {
        self.tiers
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, range)| *range)
            .unwrap_or(ProgressRange::new(TIERS_END, TIERS_END))
    }

    pub fn tiers(&self) -> &[(QualityTier, ProgressRange)] {
        &self.tiers
    }

    pub fn finalizing(&self) -> u8 {
        FINALIZING
    }
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self::for_ladder(&QualityLadder::default())
    }
}
