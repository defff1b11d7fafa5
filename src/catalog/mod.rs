//! Command Catalog
//!
//! Static mapping from logical instrument operations to their parameter slots,
//! SCPI command templates and validation rules. A [`Catalog`] is an ordinary value:
//! build the stock DS1000Z-E table with [`Catalog::ds1000z`], or assemble an
//! alternate one with [`Catalog::empty`] and [`Catalog::register`] for other firmware
//! revisions and for tests. Share it read-only behind an `Arc`.

mod ds1000z;
pub mod filter;

use crate::error::{ScpiError, ScpiResult};
use crate::format::{format_bool, format_number, mnemonic_matches, parse_number};
use filter::{filter_frequency_range, FilterBounds, FilterEdge, FilterType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use strfmt::strfmt;

// =============================================================================
// Logical operations
// =============================================================================

/// A named unit of instrument configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum LogicalOperation {
    SetChannelDisplay,
    SetProbeRatio,
    SetVerticalScale,
    SetVerticalOffset,
    SetCoupling,
    SetBandwidthLimit,
    SetChannelInvert,
    SetTimebaseScale,
    SetMathDisplay,
    SetMathOperator,
    SetMathSource1,
    SetMathSource2,
    SetMathScale,
    SetMathOffset,
    ApplyBasicOperation,
    ApplyFFT,
    SetDigitalFilter,
    ApplyAdvancedMath,
    SetMathOptionRange,
}

impl LogicalOperation {
    /// Every operation identifier, in declaration order.
    pub const ALL: [LogicalOperation; 19] = [
        LogicalOperation::SetChannelDisplay,
        LogicalOperation::SetProbeRatio,
        LogicalOperation::SetVerticalScale,
        LogicalOperation::SetVerticalOffset,
        LogicalOperation::SetCoupling,
        LogicalOperation::SetBandwidthLimit,
        LogicalOperation::SetChannelInvert,
        LogicalOperation::SetTimebaseScale,
        LogicalOperation::SetMathDisplay,
        LogicalOperation::SetMathOperator,
        LogicalOperation::SetMathSource1,
        LogicalOperation::SetMathSource2,
        LogicalOperation::SetMathScale,
        LogicalOperation::SetMathOffset,
        LogicalOperation::ApplyBasicOperation,
        LogicalOperation::ApplyFFT,
        LogicalOperation::SetDigitalFilter,
        LogicalOperation::ApplyAdvancedMath,
        LogicalOperation::SetMathOptionRange,
    ];

    /// Identifier as it appears in logs and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperation::SetChannelDisplay => "SetChannelDisplay",
            LogicalOperation::SetProbeRatio => "SetProbeRatio",
            LogicalOperation::SetVerticalScale => "SetVerticalScale",
            LogicalOperation::SetVerticalOffset => "SetVerticalOffset",
            LogicalOperation::SetCoupling => "SetCoupling",
            LogicalOperation::SetBandwidthLimit => "SetBandwidthLimit",
            LogicalOperation::SetChannelInvert => "SetChannelInvert",
            LogicalOperation::SetTimebaseScale => "SetTimebaseScale",
            LogicalOperation::SetMathDisplay => "SetMathDisplay",
            LogicalOperation::SetMathOperator => "SetMathOperator",
            LogicalOperation::SetMathSource1 => "SetMathSource1",
            LogicalOperation::SetMathSource2 => "SetMathSource2",
            LogicalOperation::SetMathScale => "SetMathScale",
            LogicalOperation::SetMathOffset => "SetMathOffset",
            LogicalOperation::ApplyBasicOperation => "ApplyBasicOperation",
            LogicalOperation::ApplyFFT => "ApplyFFT",
            LogicalOperation::SetDigitalFilter => "SetDigitalFilter",
            LogicalOperation::ApplyAdvancedMath => "ApplyAdvancedMath",
            LogicalOperation::SetMathOptionRange => "SetMathOptionRange",
        }
    }
}

impl fmt::Display for LogicalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalOperation {
    type Err = ScpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalOperation::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ScpiError::UnknownOperation(s.to_string()))
    }
}

// =============================================================================
// Parameter values and context
// =============================================================================

/// A caller-supplied parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Numeric value
    Number(f64),
    /// Mnemonic or numeric text
    Text(String),
}

impl ParamValue {
    /// Numeric view; text is parsed in invariant form.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) if n.is_finite() => Some(*n),
            ParamValue::Number(_) => None,
            ParamValue::Text(t) => parse_number(t),
        }
    }

    /// Text view; numbers use invariant formatting.
    pub fn as_text(&self) -> String {
        match self {
            ParamValue::Number(n) => format_number(*n),
            ParamValue::Text(t) => t.trim().to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Number(f64::from(value))
    }
}

impl From<u8> for ParamValue {
    fn from(value: u8) -> Self {
        ParamValue::Number(f64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Text(format_bool(value).to_string())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Named parameter values for one operation invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamValues(BTreeMap<String, ParamValue>);

impl ParamValues {
    /// Empty value set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a value by slot name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no values were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = ParamValues::new();
        for (k, v) in iter {
            values.insert(k, v);
        }
        values
    }
}

/// Live instrument state that some validation rules depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BuildContext {
    /// Current horizontal scale in seconds per division.
    pub timebase_seconds: Option<f64>,
    /// Filter type selected by the invocation being validated.
    pub filter_type: Option<FilterType>,
}

impl BuildContext {
    /// Context with a known timebase.
    pub fn with_timebase(timebase_seconds: f64) -> Self {
        Self {
            timebase_seconds: Some(timebase_seconds),
            filter_type: None,
        }
    }

    /// Same context with the filter type set.
    pub fn with_filter_type(mut self, filter_type: FilterType) -> Self {
        self.filter_type = Some(filter_type);
        self
    }
}

// =============================================================================
// Parameter slots
// =============================================================================

/// Semantic type and validation rule of a parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Member of a fixed set of mnemonics (or numeric literals).
    Choice(&'static [&'static str]),
    /// Inclusive floating-point range.
    Bounded {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// Inclusive integer range.
    Integer {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },
    /// Any finite number.
    Numeric,
    /// Filter type mnemonic; selects the range used by `FilterFrequency` slots.
    FilterSelect,
    /// Cutoff frequency whose range depends on timebase and filter type.
    FilterFrequency(FilterEdge),
}

impl ParamKind {
    /// Whether a slot of this kind must be supplied under `ctx` even if the slot is
    /// declared optional.
    fn required_in(&self, ctx: &BuildContext) -> bool {
        match self {
            ParamKind::FilterFrequency(FilterEdge::W2) => {
                ctx.filter_type.is_some_and(|t| t.is_band())
            }
            _ => false,
        }
    }
}

/// One named parameter of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSlot {
    /// Slot name used in [`ParamValues`] and template placeholders.
    pub name: &'static str,
    /// Type and rule.
    pub kind: ParamKind,
    /// Value used when the caller omits the slot.
    pub default: Option<&'static str>,
    /// Whether the slot may be left empty.
    pub optional: bool,
}

impl ParamSlot {
    /// Required slot without default.
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
            optional: false,
        }
    }

    /// Slot that may be omitted.
    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            default: None,
            optional: true,
        }
    }

    /// Attach a default value.
    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether an absent value is an error under `ctx`.
    pub fn is_required(&self, ctx: &BuildContext) -> bool {
        (!self.optional && self.default.is_none()) || self.kind.required_in(ctx)
    }

    /// Validate `value` and return its canonical rendering.
    pub fn check(
        &self,
        operation: LogicalOperation,
        value: &ParamValue,
        ctx: &BuildContext,
    ) -> ScpiResult<String> {
        let invalid = |reason: String| ScpiError::validation(operation, self.name, reason);

        match &self.kind {
            ParamKind::Choice(options) => {
                let text = value.as_text();
                let numeric = value.as_number();
                options
                    .iter()
                    .find(|opt| {
                        mnemonic_matches(opt, &text)
                            || matches!((numeric, parse_number(opt)), (Some(a), Some(b)) if a == b)
                    })
                    .map(|opt| opt.to_string())
                    .ok_or_else(|| {
                        invalid(format!("'{}' is not one of: {}", text, options.join(", ")))
                    })
            }
            ParamKind::Bounded { min, max } => {
                let v = self.number(operation, value)?;
                if v < *min || v > *max {
                    return Err(invalid(format!(
                        "{} is outside [{}, {}]",
                        format_number(v),
                        format_number(*min),
                        format_number(*max)
                    )));
                }
                Ok(format_number(v))
            }
            ParamKind::Integer { min, max } => {
                let v = self.number(operation, value)?;
                if v.fract() != 0.0 {
                    return Err(invalid(format!("{} is not an integer", format_number(v))));
                }
                if v < *min as f64 || v > *max as f64 {
                    return Err(invalid(format!(
                        "{} is outside [{}, {}]",
                        format_number(v),
                        min,
                        max
                    )));
                }
                Ok(format!("{}", v as i64))
            }
            ParamKind::Numeric => self.number(operation, value).map(format_number),
            ParamKind::FilterSelect => value
                .as_text()
                .parse::<FilterType>()
                .map(|t| t.mnemonic().to_string())
                .map_err(|_| {
                    invalid(format!(
                        "'{}' is not one of: LPASs, HPASs, BPASs, BSTop",
                        value.as_text()
                    ))
                }),
            ParamKind::FilterFrequency(edge) => {
                let v = self.number(operation, value)?;
                let timebase = ctx.timebase_seconds.ok_or_else(|| {
                    invalid("timebase is required to validate filter frequencies".to_string())
                })?;
                let filter_type = ctx
                    .filter_type
                    .ok_or_else(|| invalid("filter type is required".to_string()))?;
                let bounds = filter_frequency_range(timebase, filter_type)?;
                let range = bounds.range(*edge).ok_or_else(|| {
                    invalid(format!("W2 only applies to band filters, not {}", filter_type))
                })?;
                if !range.contains(v) {
                    return Err(invalid(format!(
                        "{} Hz is outside [{}, {}] Hz for {} at timebase {} s",
                        format_number(v),
                        format_number(range.min),
                        format_number(range.max),
                        filter_type,
                        format_number(timebase)
                    )));
                }
                Ok(format_number(v))
            }
        }
    }

    fn number(&self, operation: LogicalOperation, value: &ParamValue) -> ScpiResult<f64> {
        value.as_number().ok_or_else(|| {
            ScpiError::validation(
                operation,
                self.name,
                format!("'{}' is not a number", value.as_text()),
            )
        })
    }
}

/// Constraint spanning two slots.
#[derive(Debug, Clone, PartialEq)]
pub enum CrossRule {
    /// `lower < upper` whenever both are present; failures are reported on `upper`.
    LessThan {
        /// Slot that must be smaller
        lower: &'static str,
        /// Slot that must be larger
        upper: &'static str,
        /// Message reported on violation
        reason: &'static str,
    },
}

// =============================================================================
// Command templates
// =============================================================================

/// SCPI command pattern with `{slot}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    /// Pattern rendered with `strfmt`, e.g. `:CHANnel{channel}:SCALe {scale}`.
    pub pattern: &'static str,
    /// Only rendered when this slot has a value.
    pub requires: Option<&'static str>,
    /// Display/operator command a mode switch sends on its own.
    pub preamble: bool,
    /// Settle delay after this command.
    pub delay: Duration,
}

impl CommandTemplate {
    /// Plain template with no delay.
    pub const fn new(pattern: &'static str) -> Self {
        Self {
            pattern,
            requires: None,
            preamble: false,
            delay: Duration::ZERO,
        }
    }

    /// Mark as a preamble command.
    pub const fn preamble(mut self) -> Self {
        self.preamble = true;
        self
    }

    /// Render only when `slot` is present.
    pub const fn when(mut self, slot: &'static str) -> Self {
        self.requires = Some(slot);
        self
    }

    /// Attach a post-send delay.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Program header (everything before the argument).
    pub fn header(&self) -> &'static str {
        self.pattern
            .split_once(' ')
            .map_or(self.pattern, |(header, _)| header)
    }

    /// Whether the argument comes from a parameter slot.
    pub fn is_parameterised(&self) -> bool {
        self.pattern
            .split_once(' ')
            .is_some_and(|(_, arg)| arg.contains('{'))
    }

    /// Substitute canonical values into the pattern.
    pub fn render(&self, args: &HashMap<String, String>) -> Result<String, strfmt::FmtError> {
        strfmt(self.pattern, args)
    }

    /// The `?`-suffixed query form of this command.
    pub fn query_form(&self, args: &HashMap<String, String>) -> Result<String, strfmt::FmtError> {
        strfmt(self.header(), args).map(|header| format!("{}?", header))
    }
}

// =============================================================================
// Operation specs
// =============================================================================

/// Parameter slots, templates and rules of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    /// Operation this spec implements.
    pub operation: LogicalOperation,
    /// Short human description.
    pub description: &'static str,
    /// Ordered slots; validation follows this order.
    pub slots: Vec<ParamSlot>,
    /// Ordered templates; the rendered plan follows this order.
    pub templates: Vec<CommandTemplate>,
    /// Constraints between slots.
    pub cross_rules: Vec<CrossRule>,
}

impl OperationSpec {
    /// Find a slot by name.
    pub fn slot(&self, name: &str) -> Option<&ParamSlot> {
        self.slots.iter().find(|s| s.name == name)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Immutable table of supported operations.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    operations: HashMap<LogicalOperation, OperationSpec>,
}

impl Catalog {
    /// Catalog with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stock DS1000Z-E command table.
    pub fn ds1000z() -> Self {
        ds1000z::specs()
            .into_iter()
            .fold(Self::empty(), |catalog, spec| catalog.register(spec))
    }

    /// Add or replace an operation spec.
    pub fn register(mut self, spec: OperationSpec) -> Self {
        self.operations.insert(spec.operation, spec);
        self
    }

    /// Spec for `operation`, or `UnknownOperation` if it is not registered.
    pub fn get_spec(&self, operation: LogicalOperation) -> ScpiResult<&OperationSpec> {
        self.operations
            .get(&operation)
            .ok_or_else(|| ScpiError::UnknownOperation(operation.to_string()))
    }

    /// Resolve an operation name against this catalog.
    pub fn lookup(&self, name: &str) -> ScpiResult<LogicalOperation> {
        let operation = name.parse::<LogicalOperation>()?;
        self.get_spec(operation)?;
        Ok(operation)
    }

    /// Registered operations, sorted.
    pub fn operations(&self) -> Vec<LogicalOperation> {
        let mut ops: Vec<_> = self.operations.keys().copied().collect();
        ops.sort();
        ops
    }

    /// Evaluate the rule of a single parameter. Pure; unknown operations and
    /// parameters are simply invalid.
    pub fn is_valid(
        &self,
        operation: LogicalOperation,
        param: &str,
        value: &ParamValue,
        ctx: &BuildContext,
    ) -> bool {
        self.get_spec(operation)
            .ok()
            .and_then(|spec| spec.slot(param))
            .is_some_and(|slot| slot.check(operation, value, ctx).is_ok())
    }

    /// Cutoff limits for a filter mnemonic at the given timebase.
    pub fn filter_frequency_range(
        &self,
        timebase_seconds: f64,
        filter_type: &str,
    ) -> ScpiResult<FilterBounds> {
        filter::filter_frequency_range_for(timebase_seconds, filter_type)
    }

    /// Query forms (`...?`) of the parameterised, non-preamble commands of
    /// `operation`. Values only need to cover the header placeholders (e.g.
    /// `channel`); defaults fill the rest.
    pub fn query_for(
        &self,
        operation: LogicalOperation,
        values: &ParamValues,
    ) -> ScpiResult<Vec<String>> {
        let spec = self.get_spec(operation)?;
        let ctx = BuildContext::default();

        let mut args = HashMap::new();
        for slot in &spec.slots {
            if let Some(value) = values.get(slot.name) {
                args.insert(slot.name.to_string(), slot.check(operation, value, &ctx)?);
            } else if let Some(default) = slot.default {
                args.insert(slot.name.to_string(), default.to_string());
            }
        }

        spec.templates
            .iter()
            .filter(|t| !t.preamble && t.is_parameterised())
            .map(|t| {
                t.query_form(&args)
                    .map_err(|e| ScpiError::validation(operation, t.header(), e.to_string()))
            })
            .collect()
    }
}
