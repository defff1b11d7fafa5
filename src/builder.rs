//! Command Builder/Validator
//!
//! Turns `(operation, values, context)` into a [`TransitionPlan`]. Building is
//! synchronous and local: it never sees a transport, so a validation failure can
//! never leave the instrument half-configured.
//!
//! Validation runs in slot order and stops at the first invalid parameter. Cross
//! rules (`W1 < W2`) are re-checked after every slot passed on its own.

use crate::catalog::filter::FilterType;
use crate::catalog::{
    BuildContext, Catalog, CrossRule, LogicalOperation, OperationSpec, ParamKind, ParamValue,
    ParamValues,
};
use crate::error::{ScpiError, ScpiResult};
use crate::format::parse_number;
use crate::plan::TransitionPlan;
use std::collections::HashMap;
use std::time::Duration;

/// A rendered command before it is placed in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    /// SCPI line.
    pub command: String,
    /// Whether the template was a display/operator preamble.
    pub preamble: bool,
    /// Template delay.
    pub delay: Duration,
}

/// Output of rendering one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Operation rendered.
    pub operation: LogicalOperation,
    /// Commands in catalog order.
    pub commands: Vec<RenderedCommand>,
    /// Canonical value of every slot that had one.
    pub args: HashMap<String, String>,
}

/// Validates parameters and renders plans against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    catalog: &'a Catalog,
}

impl<'a> CommandBuilder<'a> {
    /// Builder over `catalog`.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// The catalog in use.
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Validate and render a plan for `operation`.
    pub fn build(
        &self,
        operation: LogicalOperation,
        values: &ParamValues,
        ctx: &BuildContext,
    ) -> ScpiResult<TransitionPlan> {
        let rendered = self.render(operation, values, ctx)?;
        let mut plan = TransitionPlan::new(operation.name(), Some(operation));
        for cmd in rendered.commands {
            plan.push(cmd.command, cmd.delay);
        }
        tracing::debug!(operation = %operation, commands = plan.len(), "built plan");
        Ok(plan)
    }

    /// Validate and render, keeping preamble markers and canonical arguments.
    pub fn render(
        &self,
        operation: LogicalOperation,
        values: &ParamValues,
        ctx: &BuildContext,
    ) -> ScpiResult<Rendered> {
        let spec = self.catalog.get_spec(operation)?;

        if let Some((name, _)) = values.iter().find(|(name, _)| spec.slot(name).is_none()) {
            return Err(ScpiError::validation(
                operation,
                name.as_str(),
                "unknown parameter",
            ));
        }

        let args = validate_slots(spec, values, ctx)?;
        check_cross_rules(spec, &args)?;

        let mut commands = Vec::with_capacity(spec.templates.len());
        for template in &spec.templates {
            if let Some(required) = template.requires {
                if !args.contains_key(required) {
                    continue;
                }
            }
            let command = template.render(&args).map_err(|e| {
                ScpiError::validation(operation, template.header(), e.to_string())
            })?;
            commands.push(RenderedCommand {
                command,
                preamble: template.preamble,
                delay: template.delay,
            });
        }

        Ok(Rendered {
            operation,
            commands,
            args,
        })
    }
}

fn validate_slots(
    spec: &OperationSpec,
    values: &ParamValues,
    ctx: &BuildContext,
) -> ScpiResult<HashMap<String, String>> {
    let operation = spec.operation;
    let mut ctx = *ctx;
    let mut args = HashMap::new();

    for slot in &spec.slots {
        let supplied = values.get(slot.name).cloned();
        let value = match (supplied, slot.default) {
            (Some(value), _) => value,
            (None, Some(default)) => ParamValue::Text(default.to_string()),
            (None, None) if slot.is_required(&ctx) => {
                // optional slots only become required through the filter type
                let reason = match ctx.filter_type {
                    Some(filter) if slot.optional => format!("required for {} filters", filter),
                    _ => "missing required parameter".to_string(),
                };
                return Err(ScpiError::validation(operation, slot.name, reason));
            }
            (None, None) => continue,
        };

        let canonical = slot.check(operation, &value, &ctx)?;
        if matches!(slot.kind, ParamKind::FilterSelect) {
            ctx.filter_type = canonical.parse::<FilterType>().ok();
        }
        args.insert(slot.name.to_string(), canonical);
    }

    Ok(args)
}

fn check_cross_rules(spec: &OperationSpec, args: &HashMap<String, String>) -> ScpiResult<()> {
    for rule in &spec.cross_rules {
        match rule {
            CrossRule::LessThan {
                lower,
                upper,
                reason,
            } => {
                let pair = args
                    .get(*lower)
                    .and_then(|v| parse_number(v))
                    .zip(args.get(*upper).and_then(|v| parse_number(v)));
                if let Some((lo, hi)) = pair {
                    if lo >= hi {
                        return Err(ScpiError::validation(spec.operation, *upper, *reason));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::ds1000z()
    }

    #[test]
    fn vertical_scale_defaults_to_channel_one() {
        let catalog = catalog();
        let plan = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetVerticalScale,
                &ParamValues::new().with("scale", 0.5),
                &BuildContext::default(),
            )
            .unwrap();
        assert_eq!(plan.commands(), vec![":CHANnel1:SCALe 0.5"]);
        assert_eq!(plan.delays(), vec![Duration::ZERO]);
    }

    #[test]
    fn numbers_render_without_locale_separators() {
        let catalog = catalog();
        let plan = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetProbeRatio,
                &ParamValues::new().with("channel", 3).with("ratio", 1000.0),
                &BuildContext::default(),
            )
            .unwrap();
        assert_eq!(plan.commands(), vec![":CHANnel3:PROBe 1000"]);
    }

    #[test]
    fn enumeration_values_use_canonical_spelling() {
        let catalog = catalog();
        let plan = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetMathOperator,
                &ParamValues::new().with("operator", "subtract"),
                &BuildContext::default(),
            )
            .unwrap();
        assert_eq!(plan.commands(), vec![":MATH:OPERator SUBtract"]);
    }

    #[test]
    fn first_invalid_parameter_short_circuits() {
        let catalog = catalog();
        let err = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetCoupling,
                &ParamValues::new().with("channel", 9).with("coupling", "HF"),
                &BuildContext::default(),
            )
            .unwrap_err();
        assert_eq!(err.parameter(), Some("channel"));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let catalog = catalog();
        let err = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetMathDisplay,
                &ParamValues::new().with("state", "ON").with("colour", "red"),
                &BuildContext::default(),
            )
            .unwrap_err();
        assert_eq!(err.parameter(), Some("colour"));
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let catalog = catalog();
        let err = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetVerticalScale,
                &ParamValues::new(),
                &BuildContext::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ScpiError::Validation { ref parameter, ref reason, .. }
                if parameter == "scale" && reason == "missing required parameter"
        ));
    }

    #[test]
    fn low_pass_filter_renders_single_cutoff() {
        let catalog = catalog();
        let plan = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetDigitalFilter,
                &ParamValues::new().with("type", "LPASs").with("w1", 1000.0),
                &BuildContext::with_timebase(0.001),
            )
            .unwrap();
        assert_eq!(
            plan.commands(),
            vec![
                ":MATH:DISPlay ON",
                ":MATH:FILTer:TYPE LPASs",
                ":MATH:FILTer:W1 1000"
            ]
        );
    }

    #[test]
    fn band_filter_requires_second_cutoff() {
        let catalog = catalog();
        let err = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetDigitalFilter,
                &ParamValues::new().with("type", "BPASs").with("w1", 1000.0),
                &BuildContext::with_timebase(0.001),
            )
            .unwrap_err();
        assert_eq!(err.parameter(), Some("w2"));
        assert!(err.to_string().contains("required for BPASs filters"));
    }

    #[test]
    fn band_filter_rejects_inverted_edges() {
        let catalog = catalog();
        let err = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetDigitalFilter,
                &ParamValues::new()
                    .with("type", "BSTop")
                    .with("w1", 5000.0)
                    .with("w2", 2000.0),
                &BuildContext::with_timebase(0.001),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ScpiError::Validation { ref reason, .. } if reason == "W1 must be less than W2"
        ));
    }

    #[test]
    fn filter_with_bad_timebase_fails_before_rendering() {
        let catalog = catalog();
        let err = CommandBuilder::new(&catalog)
            .build(
                LogicalOperation::SetDigitalFilter,
                &ParamValues::new().with("type", "LPASs").with("w1", 1000.0),
                &BuildContext::with_timebase(0.0),
            )
            .unwrap_err();
        assert!(matches!(err, ScpiError::InvalidTimebase(_)));
    }

    #[test]
    fn render_keeps_preamble_markers() {
        let catalog = catalog();
        let rendered = CommandBuilder::new(&catalog)
            .render(
                LogicalOperation::ApplyBasicOperation,
                &ParamValues::new().with("operator", "ADD"),
                &BuildContext::default(),
            )
            .unwrap();
        let preambles: Vec<bool> = rendered.commands.iter().map(|c| c.preamble).collect();
        assert_eq!(preambles, vec![true, true, false, false]);
        assert_eq!(rendered.args["source2"], "CHANnel2");
    }
}
