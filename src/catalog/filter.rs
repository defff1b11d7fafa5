//! Digital filter frequency rules.
//!
//! The DS1000Z-E derives the usable cutoff range of its math filters from the
//! on-screen sample rate, which is fixed at 100 points per second of timebase:
//!
//! ```text
//! S    = 100 / timebase
//! step = 0.005 S
//! LP/HP      W1 in [0.005 S, 0.1   S]
//! BP/BS      W1 in [0.005 S, 0.095 S], W2 in [0.01 S, 0.1 S], W1 < W2
//! ```

use crate::error::{ScpiError, ScpiResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relative tolerance applied at range boundaries.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Math filter type, named by its SCPI mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterType {
    /// `LPASs`
    LowPass,
    /// `HPASs`
    HighPass,
    /// `BPASs`
    BandPass,
    /// `BSTop`
    BandStop,
}

impl FilterType {
    /// All filter types in catalog order.
    pub const ALL: [FilterType; 4] = [
        FilterType::LowPass,
        FilterType::HighPass,
        FilterType::BandPass,
        FilterType::BandStop,
    ];

    /// SCPI mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            FilterType::LowPass => "LPASs",
            FilterType::HighPass => "HPASs",
            FilterType::BandPass => "BPASs",
            FilterType::BandStop => "BSTop",
        }
    }

    /// Band filters take two cutoff edges.
    pub fn is_band(&self) -> bool {
        matches!(self, FilterType::BandPass | FilterType::BandStop)
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for FilterType {
    type Err = ScpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterType::ALL
            .into_iter()
            .find(|t| t.mnemonic().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ScpiError::UnknownFilterType(s.to_string()))
    }
}

/// Which cutoff a frequency parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterEdge {
    /// `:MATH:FILTer:W1`
    W1,
    /// `:MATH:FILTer:W2`, band filters only
    W2,
}

/// Inclusive frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    /// Lowest accepted frequency.
    pub min: f64,
    /// Highest accepted frequency.
    pub max: f64,
}

impl FrequencyRange {
    /// Boundary-tolerant membership test.
    pub fn contains(&self, value: f64) -> bool {
        let slack = BOUNDARY_EPSILON * self.max.abs().max(1.0);
        value >= self.min - slack && value <= self.max + slack
    }
}

/// Frequency limits for one filter type at one timebase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBounds {
    /// Filter the bounds were computed for.
    pub filter_type: FilterType,
    /// On-screen sample rate, `100 / timebase`.
    pub screen_sample_rate: f64,
    /// Slider granularity.
    pub step: f64,
    /// Range of the first (or only) cutoff.
    pub w1: FrequencyRange,
    /// Range of the upper cutoff for band filters.
    pub w2: Option<FrequencyRange>,
}

impl FilterBounds {
    /// Lower bound of W1.
    pub fn min_freq(&self) -> f64 {
        self.w1.min
    }

    /// Upper bound of W1.
    pub fn max_freq(&self) -> f64 {
        self.w1.max
    }

    /// Range for the requested edge, `None` for W2 on low/high-pass filters.
    pub fn range(&self, edge: FilterEdge) -> Option<FrequencyRange> {
        match edge {
            FilterEdge::W1 => Some(self.w1),
            FilterEdge::W2 => self.w2,
        }
    }
}

/// Compute the cutoff limits for `filter_type` at `timebase_seconds`.
pub fn filter_frequency_range(
    timebase_seconds: f64,
    filter_type: FilterType,
) -> ScpiResult<FilterBounds> {
    if !(timebase_seconds.is_finite() && timebase_seconds > 0.0) {
        return Err(ScpiError::InvalidTimebase(timebase_seconds));
    }

    let rate = 100.0 / timebase_seconds;
    let step = 0.005 * rate;
    let min = 0.005 * rate;

    let (w1, w2) = if filter_type.is_band() {
        (
            FrequencyRange {
                min,
                max: 0.095 * rate,
            },
            Some(FrequencyRange {
                min: 0.01 * rate,
                max: 0.1 * rate,
            }),
        )
    } else {
        (
            FrequencyRange {
                min,
                max: 0.1 * rate,
            },
            None,
        )
    };

    Ok(FilterBounds {
        filter_type,
        screen_sample_rate: rate,
        step,
        w1,
        w2,
    })
}

/// String-typed entry point for callers holding a raw filter mnemonic.
pub fn filter_frequency_range_for(
    timebase_seconds: f64,
    filter_type: &str,
) -> ScpiResult<FilterBounds> {
    let filter_type = filter_type.parse::<FilterType>()?;
    filter_frequency_range(timebase_seconds, filter_type)
}
