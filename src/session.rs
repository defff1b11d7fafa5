//! Scope session.
//!
//! Ties a catalog, a sequencer and the little live state that validation needs
//! (current timebase, active math mode) into one handle. This is what the CLI
//! drives; library users who manage that state themselves can call
//! [`CommandBuilder`] and [`SessionSequencer`] directly.

use crate::builder::CommandBuilder;
use crate::catalog::{BuildContext, Catalog, LogicalOperation, ParamValues};
use crate::error::ScpiResult;
use crate::math_mode::MathMode;
use crate::plan::TransitionPlan;
use crate::sequencer::{ExecutionControl, SessionResult, SessionSequencer};
use crate::settings::{LastKnown, Refresh};
use std::sync::Arc;

/// One connected oscilloscope.
#[derive(Debug)]
pub struct ScopeSession {
    catalog: Arc<Catalog>,
    sequencer: SessionSequencer,
    math_mode: Option<MathMode>,
    timebase: LastKnown<f64>,
}

impl ScopeSession {
    /// Session with unknown timebase and math mode.
    pub fn new(catalog: Arc<Catalog>, sequencer: SessionSequencer) -> Self {
        Self {
            catalog,
            sequencer,
            math_mode: None,
            timebase: LastKnown::new(),
        }
    }

    /// Seed the timebase instead of reading it.
    pub fn with_timebase(mut self, seconds_per_div: f64) -> Self {
        self.timebase = LastKnown::with_value(seconds_per_div);
        self
    }

    /// Seed the active math mode.
    pub fn with_math_mode(mut self, mode: MathMode) -> Self {
        self.math_mode = Some(mode);
        self
    }

    /// Catalog in use.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Sequencer in use.
    pub fn sequencer(&self) -> &SessionSequencer {
        &self.sequencer
    }

    /// Last known math mode; `None` after a failed switch or before any read.
    pub fn math_mode(&self) -> Option<MathMode> {
        self.math_mode
    }

    /// Last known timebase in seconds per division.
    pub fn timebase(&self) -> Option<f64> {
        self.timebase.get().copied()
    }

    /// Validation context from the current live state.
    pub fn context(&self) -> BuildContext {
        BuildContext {
            timebase_seconds: self.timebase(),
            filter_type: None,
        }
    }

    /// Build a plan without sending it.
    pub fn plan(
        &self,
        operation: LogicalOperation,
        values: &ParamValues,
    ) -> ScpiResult<TransitionPlan> {
        CommandBuilder::new(&self.catalog).build(operation, values, &self.context())
    }

    /// Build and send `operation`.
    pub async fn apply(
        &mut self,
        operation: LogicalOperation,
        values: &ParamValues,
    ) -> ScpiResult<SessionResult> {
        self.apply_with(operation, values, ExecutionControl::new())
            .await
    }

    /// Build and send `operation` with progress reporting or cancellation.
    ///
    /// A failed send is returned as `TransportFailure`. The math mode is only
    /// updated when the plan itself selected an operator.
    pub async fn apply_with(
        &mut self,
        operation: LogicalOperation,
        values: &ParamValues,
        control: ExecutionControl,
    ) -> ScpiResult<SessionResult> {
        let plan = self.plan(operation, values)?;
        let result = self.sequencer.execute_with(&plan, control).await?;

        if !result.success {
            if operator_set_by(&plan).is_some()
                || MathMode::ALL.iter().any(|m| m.operation() == operation)
            {
                self.math_mode = None;
            }
            return result.into_result();
        }

        if operation == LogicalOperation::SetTimebaseScale {
            if let Some(scale) = values.get("scale").and_then(|v| v.as_number()) {
                self.timebase = LastKnown::with_value(scale);
            }
        }
        if let Some(operator) = operator_set_by(&plan) {
            self.math_mode = MathMode::for_operator(&self.catalog, operator);
        }
        Ok(result)
    }

    /// Move the math trace into `to`, configured with `values`.
    ///
    /// The mode is only recorded once every step was sent; a partial switch leaves
    /// it unknown.
    pub async fn switch_math_mode(
        &mut self,
        to: MathMode,
        values: &ParamValues,
    ) -> ScpiResult<SessionResult> {
        let plan = CommandBuilder::new(&self.catalog).build_mode_switch(
            self.math_mode,
            to,
            values,
            &self.context(),
        )?;
        let result = self.sequencer.execute(&plan).await?;

        if result.success {
            tracing::info!(mode = %to, "math mode active");
            self.math_mode = Some(to);
            Ok(result)
        } else {
            self.math_mode = None;
            result.into_result()
        }
    }

    /// Read `:TIMebase:MAIN:SCALe?`, keeping the previous value if the read fails.
    pub async fn refresh_timebase(&mut self) -> ScpiResult<Refresh> {
        let query = self
            .catalog
            .query_for(LogicalOperation::SetTimebaseScale, &ParamValues::new())?;
        match query.first() {
            Some(query) => {
                let read = self.sequencer.query_f64(query).await;
                self.timebase.apply(read)
            }
            None => Ok(Refresh::Stale("no timebase query".to_string())),
        }
    }

    /// Read `:MATH:OPERator?` and derive the active mode from it.
    pub async fn refresh_math_mode(&mut self) -> ScpiResult<Option<MathMode>> {
        let query = self
            .catalog
            .query_for(LogicalOperation::SetMathOperator, &ParamValues::new())?;
        if let Some(query) = query.first() {
            let operator = self.sequencer.query_text(query).await?;
            self.math_mode = MathMode::for_operator(&self.catalog, &operator);
        }
        Ok(self.math_mode)
    }
}

/// Last operator a plan selects with `:MATH:OPERator`, if any.
fn operator_set_by(plan: &TransitionPlan) -> Option<&str> {
    plan.steps()
        .iter()
        .flat_map(|step| step.command.split(';'))
        .filter_map(|part| part.trim().strip_prefix(":MATH:OPERator "))
        .map(str::trim)
        .last()
}
