//! Per-region trend metrics and the composite priority score

use crate::data::RegionRecord;
use crate::error::AnalysisError;

/// Allowed drift of the weight sum from 1.0
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Weights of the priority score.
///
/// The weights must sum to one so the score stays on the 0-100 scale of its
/// inputs; [`PriorityWeights::new`] rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityWeights {
    outcome: f64,
    immunization_gap: f64,
    poverty: f64,
    sanitation_gap: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            outcome: 0.4,
            immunization_gap: 0.2,
            poverty: 0.2,
            sanitation_gap: 0.2,
        }
    }
}

impl PriorityWeights {
    pub fn new(
        outcome: f64,
        immunization_gap: f64,
        poverty: f64,
        sanitation_gap: f64,
    ) -> Result<Self, AnalysisError> {
        let weights = Self {
            outcome,
            immunization_gap,
            poverty,
            sanitation_gap,
        };
        let sum = weights.sum();
        if !sum.is_finite() || (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AnalysisError::WeightsNotNormalized { sum });
        }
        Ok(weights)
    }

    pub fn sum(&self) -> f64 {
        self.outcome + self.immunization_gap + self.poverty + self.sanitation_gap
    }

    /// Weighted sum of current prevalence, coverage gaps and poverty.
    pub fn score(&self, outcome: f64, immunization: f64, poverty: f64, sanitation: f64) -> f64 {
        self.outcome * outcome
            + self.immunization_gap * (100.0 - immunization)
            + self.poverty * poverty
            + self.sanitation_gap * (100.0 - sanitation)
    }
}

/// Direction of change between the first and last year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Declined,
    Unchanged,
    Increased,
}

impl TrendDirection {
    pub fn describe(self) -> &'static str {
        match self {
            TrendDirection::Declined => "stunting declined",
            TrendDirection::Unchanged => "no change",
            TrendDirection::Increased => "stunting increased",
        }
    }
}

/// Metrics computed from a single region row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    /// First year minus last year; positive means prevalence fell
    pub decline: f64,
    /// `None` when the first-year value is zero
    pub pct_decline: Option<f64>,
    pub annual_trend: f64,
    /// One-step linear extrapolation, not a fitted regression
    pub forecast_next: f64,
    pub priority_score: f64,
}

impl DerivedMetrics {
    pub fn trend_direction(&self) -> TrendDirection {
        if self.decline > 0.0 {
            TrendDirection::Declined
        } else if self.decline < 0.0 {
            TrendDirection::Increased
        } else {
            TrendDirection::Unchanged
        }
    }
}

pub fn decline(first: f64, last: f64) -> f64 {
    first - last
}

/// Decline as a percentage of the first-year value.
pub fn pct_decline(region: &str, first: f64, last: f64) -> Result<f64, AnalysisError> {
    if first == 0.0 {
        return Err(AnalysisError::DivisionUndefined {
            region: region.to_string(),
        });
    }
    Ok(decline(first, last) / first * 100.0)
}

/// Average decline per year-to-year interval.
pub fn annual_trend(decline: f64, intervals: usize) -> f64 {
    decline / intervals as f64
}

pub fn forecast_next(last: f64, annual_trend: f64) -> f64 {
    last - annual_trend
}

pub fn derive(record: &RegionRecord, weights: &PriorityWeights) -> DerivedMetrics {
    let first = record.first_outcome();
    let last = record.latest_outcome();
    let decline = decline(first, last);
    let annual_trend = annual_trend(decline, record.intervals());
    let indicators = &record.indicators;

    DerivedMetrics {
        decline,
        pct_decline: pct_decline(&record.name, first, last).ok(),
        annual_trend,
        forecast_next: forecast_next(last, annual_trend),
        priority_score: weights.score(
            last,
            indicators.immunization,
            indicators.poverty,
            indicators.sanitation,
        ),
    }
}
