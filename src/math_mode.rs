//! Math mode switching.
//!
//! The math trace runs one function family at a time. Moving between families is
//! only reliable if the trace is switched off and back on around the operator
//! change, with settle pauses the firmware needs:
//!
//! ```text
//! :MATH:DISPlay OFF                          150 ms
//! :MATH:DISPlay ON;:MATH:OPERator <op>       500 ms
//! <mode configuration 1>                      50 ms
//! <mode configuration 2>                      50 ms
//! ...
//! <mode configuration n>
//! ```
//!
//! These pauses are instrument requirements, not tuning knobs.

use crate::builder::CommandBuilder;
use crate::catalog::{BuildContext, Catalog, LogicalOperation, ParamKind, ParamValues};
use crate::error::{ScpiError, ScpiResult};
use crate::format::mnemonic_matches;
use crate::plan::TransitionPlan;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Settle time after blanking the math trace.
pub const DISPLAY_OFF_SETTLE: Duration = Duration::from_millis(150);
/// Settle time after re-enabling the trace with the new operator.
pub const OPERATOR_SETTLE: Duration = Duration::from_millis(500);
/// Spacing between mode configuration commands.
pub const CONFIG_SPACING: Duration = Duration::from_millis(50);

/// Active math function family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathMode {
    /// Arithmetic between two sources
    BasicOperations,
    /// Spectrum view
    FFTAnalysis,
    /// Low/high-pass and band filters
    DigitalFilters,
    /// Single-source functions (integral, derivative, log, ...)
    AdvancedMath,
}

impl MathMode {
    /// All modes.
    pub const ALL: [MathMode; 4] = [
        MathMode::BasicOperations,
        MathMode::FFTAnalysis,
        MathMode::DigitalFilters,
        MathMode::AdvancedMath,
    ];

    /// Operation whose parameters configure this mode.
    pub fn operation(&self) -> LogicalOperation {
        match self {
            MathMode::BasicOperations => LogicalOperation::ApplyBasicOperation,
            MathMode::FFTAnalysis => LogicalOperation::ApplyFFT,
            MathMode::DigitalFilters => LogicalOperation::SetDigitalFilter,
            MathMode::AdvancedMath => LogicalOperation::ApplyAdvancedMath,
        }
    }

    /// Slot that selects the operator, for modes where the caller chooses it.
    fn operator_slot(&self) -> Option<&'static str> {
        match self {
            MathMode::BasicOperations => Some("operator"),
            MathMode::AdvancedMath => Some("function"),
            MathMode::FFTAnalysis | MathMode::DigitalFilters => None,
        }
    }

    /// Fixed operator mnemonic, for modes that have one.
    fn fixed_operator(&self) -> Option<&'static str> {
        match self {
            MathMode::FFTAnalysis => Some("FFT"),
            MathMode::DigitalFilters => Some("FILTer"),
            MathMode::BasicOperations | MathMode::AdvancedMath => None,
        }
    }

    /// Mode an operator mnemonic belongs to, as reported by `:MATH:OPERator?`.
    ///
    /// Accepts short forms (`SUBT`, `FILT`). Selectable operators are looked up in
    /// the catalog's choice lists, so an alternate catalog changes the answer too.
    pub fn for_operator(catalog: &Catalog, operator: &str) -> Option<MathMode> {
        MathMode::ALL.into_iter().find(|mode| {
            if let Some(fixed) = mode.fixed_operator() {
                return mnemonic_matches(fixed, operator);
            }
            let choices = mode.operator_slot().and_then(|name| {
                catalog
                    .get_spec(mode.operation())
                    .ok()
                    .and_then(|spec| spec.slot(name))
                    .map(|slot| &slot.kind)
            });
            match choices {
                Some(ParamKind::Choice(options)) => {
                    options.iter().any(|opt| mnemonic_matches(opt, operator))
                }
                _ => false,
            }
        })
    }

    fn name(&self) -> &'static str {
        match self {
            MathMode::BasicOperations => "BasicOperations",
            MathMode::FFTAnalysis => "FFTAnalysis",
            MathMode::DigitalFilters => "DigitalFilters",
            MathMode::AdvancedMath => "AdvancedMath",
        }
    }
}

impl fmt::Display for MathMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MathMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" | "basicoperations" => Ok(MathMode::BasicOperations),
            "fft" | "fftanalysis" => Ok(MathMode::FFTAnalysis),
            "filter" | "filters" | "digitalfilters" => Ok(MathMode::DigitalFilters),
            "advanced" | "advancedmath" => Ok(MathMode::AdvancedMath),
            other => Err(format!(
                "unknown math mode '{}', expected basic, fft, filter or advanced",
                other
            )),
        }
    }
}

impl CommandBuilder<'_> {
    /// Build the composite plan that moves the math trace from `from` (unknown if
    /// `None`) into `to`, configured with `values`.
    ///
    /// Staying in the same mode skips the display cycle and sends the mode's full
    /// command list with the usual configuration spacing.
    pub fn build_mode_switch(
        &self,
        from: Option<MathMode>,
        to: MathMode,
        values: &ParamValues,
        ctx: &BuildContext,
    ) -> ScpiResult<TransitionPlan> {
        let operation = to.operation();
        let rendered = self.render(operation, values, ctx)?;

        let label = match from {
            Some(from) => format!("SwitchMathMode({} -> {})", from, to),
            None => format!("SwitchMathMode(-> {})", to),
        };
        let mut plan = TransitionPlan::new(label, Some(operation));

        let switching = from != Some(to);
        let config: Vec<&str> = rendered
            .commands
            .iter()
            .filter(|c| !switching || !c.preamble)
            .map(|c| c.command.as_str())
            .collect();

        if switching {
            let operator = to
                .fixed_operator()
                .map(str::to_string)
                .or_else(|| to.operator_slot().and_then(|s| rendered.args.get(s).cloned()))
                .ok_or_else(|| {
                    ScpiError::validation(
                        operation,
                        to.operator_slot().unwrap_or("operator"),
                        "missing required parameter",
                    )
                })?;

            plan.push(":MATH:DISPlay OFF", DISPLAY_OFF_SETTLE);
            plan.push(
                format!(":MATH:DISPlay ON;:MATH:OPERator {}", operator),
                OPERATOR_SETTLE,
            );
        }

        let last = config.len().saturating_sub(1);
        for (i, command) in config.into_iter().enumerate() {
            let delay = if i < last {
                CONFIG_SPACING
            } else {
                Duration::ZERO
            };
            plan.push(command, delay);
        }

        tracing::debug!(plan = %plan.label, commands = plan.len(), "built mode switch");
        Ok(plan)
    }
}
