//! Settings read-back.
//!
//! Reads live instrument state through the query form of each catalog command and
//! keeps the last good value of every field. A read that fails or cannot be parsed
//! leaves the previous value in place and marks the field stale; callers see that
//! in the returned [`Refresh`] or [`RefreshReport`] instead of getting a silent
//! default.

use crate::catalog::{Catalog, LogicalOperation, ParamValues};
use crate::error::{ScpiError, ScpiResult};
use crate::math_mode::MathMode;
use crate::sequencer::SessionSequencer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Last-known values
// =============================================================================

/// Outcome of folding one read into a [`LastKnown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// The read succeeded and replaced the value.
    Updated,
    /// The read failed; the previous value was kept.
    Stale(String),
}

/// The most recent successfully read value of a setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastKnown<T> {
    value: Option<T>,
    stale: bool,
    last_error: Option<String>,
}

impl<T> Default for LastKnown<T> {
    fn default() -> Self {
        Self {
            value: None,
            stale: false,
            last_error: None,
        }
    }
}

impl<T> LastKnown<T> {
    /// Nothing read yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with a known value.
    pub fn with_value(value: T) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// Last good value, if any read ever succeeded.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Whether the latest read failed.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Reason of the latest failed read.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Fold a read result in.
    ///
    /// `QueryFailed` marks the value stale and is reported as [`Refresh::Stale`].
    /// Any other error (a busy transport, for instance) is not about this value and
    /// is returned unchanged.
    pub fn apply(&mut self, result: ScpiResult<T>) -> ScpiResult<Refresh> {
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.stale = false;
                self.last_error = None;
                Ok(Refresh::Updated)
            }
            Err(err @ ScpiError::QueryFailed { .. }) => {
                let reason = err.to_string();
                tracing::warn!(error = %reason, "keeping last known value");
                self.stale = true;
                self.last_error = Some(reason.clone());
                Ok(Refresh::Stale(reason))
            }
            Err(err) => Err(err),
        }
    }
}

/// Fields that went stale during one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// `(field, reason)` for every failed read.
    pub stale: Vec<(&'static str, String)>,
}

impl RefreshReport {
    /// Whether every read succeeded.
    pub fn is_complete(&self) -> bool {
        self.stale.is_empty()
    }

    fn record(&mut self, field: &'static str, refresh: Refresh) {
        if let Refresh::Stale(reason) = refresh {
            self.stale.push((field, reason));
        }
    }
}

/// Query form of the single parameterised command of `operation`.
fn query_of(
    catalog: &Catalog,
    operation: LogicalOperation,
    values: &ParamValues,
) -> ScpiResult<String> {
    catalog
        .query_for(operation, values)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ScpiError::validation(operation, "query", "operation has no readable setting")
        })
}

// =============================================================================
// Channel and math settings
// =============================================================================

/// Read-back of one analog channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Channel number (1-4).
    pub channel: u8,
    /// Trace shown.
    pub display: LastKnown<bool>,
    /// Probe ratio.
    pub probe: LastKnown<f64>,
    /// Volts per division.
    pub scale: LastKnown<f64>,
    /// Vertical offset in volts.
    pub offset: LastKnown<f64>,
    /// Coupling mnemonic as reported.
    pub coupling: LastKnown<String>,
}

impl ChannelSettings {
    /// Settings of `channel`, nothing read yet.
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            display: LastKnown::new(),
            probe: LastKnown::new(),
            scale: LastKnown::new(),
            offset: LastKnown::new(),
            coupling: LastKnown::new(),
        }
    }

    /// Re-read every field.
    pub async fn refresh(
        &mut self,
        catalog: &Catalog,
        sequencer: &SessionSequencer,
    ) -> ScpiResult<RefreshReport> {
        let values = ParamValues::new().with("channel", self.channel);
        let q = |op| query_of(catalog, op, &values);
        let mut report = RefreshReport::default();

        let query = q(LogicalOperation::SetChannelDisplay)?;
        report.record("display", self.display.apply(sequencer.query_bool(&query).await)?);

        let query = q(LogicalOperation::SetProbeRatio)?;
        report.record("probe", self.probe.apply(sequencer.query_f64(&query).await)?);

        let query = q(LogicalOperation::SetVerticalScale)?;
        report.record("scale", self.scale.apply(sequencer.query_f64(&query).await)?);

        let query = q(LogicalOperation::SetVerticalOffset)?;
        report.record("offset", self.offset.apply(sequencer.query_f64(&query).await)?);

        let query = q(LogicalOperation::SetCoupling)?;
        report.record(
            "coupling",
            self.coupling.apply(sequencer.query_text(&query).await)?,
        );

        tracing::debug!(channel = self.channel, stale = report.stale.len(), "channel refreshed");
        Ok(report)
    }
}

/// Read-back of the math trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MathSettings {
    /// Trace shown.
    pub display: LastKnown<bool>,
    /// Operator mnemonic as reported.
    pub operator: LastKnown<String>,
    /// Vertical scale.
    pub scale: LastKnown<f64>,
    /// Vertical offset.
    pub offset: LastKnown<f64>,
}

impl MathSettings {
    /// Nothing read yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read every field.
    pub async fn refresh(
        &mut self,
        catalog: &Catalog,
        sequencer: &SessionSequencer,
    ) -> ScpiResult<RefreshReport> {
        let values = ParamValues::new();
        let q = |op| query_of(catalog, op, &values);
        let mut report = RefreshReport::default();

        let query = q(LogicalOperation::SetMathDisplay)?;
        report.record("display", self.display.apply(sequencer.query_bool(&query).await)?);

        let query = q(LogicalOperation::SetMathOperator)?;
        report.record(
            "operator",
            self.operator.apply(sequencer.query_text(&query).await)?,
        );

        let query = q(LogicalOperation::SetMathScale)?;
        report.record("scale", self.scale.apply(sequencer.query_f64(&query).await)?);

        let query = q(LogicalOperation::SetMathOffset)?;
        report.record("offset", self.offset.apply(sequencer.query_f64(&query).await)?);

        Ok(report)
    }

    /// Mode implied by the last known operator.
    pub fn mode(&self, catalog: &Catalog) -> Option<MathMode> {
        self.operator
            .get()
            .and_then(|op| MathMode::for_operator(catalog, op))
    }
}

// =============================================================================
// Identity
// =============================================================================

#[allow(clippy::expect_used)]
static IDN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^,]+),([^,]+),([^,]*),(.+?)\s*$").expect("valid IDN pattern")
});

/// Parsed `*IDN?` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIdentity {
    /// e.g. `RIGOL TECHNOLOGIES`
    pub manufacturer: String,
    /// e.g. `DS1104Z`
    pub model: String,
    /// Serial number (may be empty)
    pub serial: String,
    /// Firmware version
    pub firmware: String,
}

impl InstrumentIdentity {
    /// Parse the four comma-separated `*IDN?` fields.
    pub fn parse(response: &str) -> Option<Self> {
        let caps = IDN_PATTERN.captures(response)?;
        let field = |i: usize| caps[i].trim().to_string();
        Some(Self {
            manufacturer: field(1),
            model: field(2),
            serial: field(3),
            firmware: field(4),
        })
    }

    /// Whether the model belongs to the DS1000Z family.
    pub fn is_ds1000z(&self) -> bool {
        let model = self.model.to_ascii_uppercase();
        model.starts_with("DS1") && model.contains('Z')
    }
}

impl fmt::Display for InstrumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

/// Query and parse `*IDN?`.
pub async fn identify(sequencer: &SessionSequencer) -> ScpiResult<InstrumentIdentity> {
    let response = sequencer.query_text("*IDN?").await?;
    let identity = InstrumentIdentity::parse(&response).ok_or_else(|| {
        ScpiError::query_failed("*IDN?", format!("unexpected identity '{}'", response))
    })?;
    if !identity.is_ds1000z() {
        tracing::warn!(model = %identity.model, "instrument is not a DS1000Z model");
    }
    tracing::info!(%identity, "identified instrument");
    Ok(identity)
}
