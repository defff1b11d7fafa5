//! Integration tests for the catalog and command builder.
//!
//! Covers the documented build scenarios end to end through the public API:
//! plan shapes, validation failures and the timebase-derived filter limits.

use ds1000z_scpi::format::{format_number, parse_number};
use ds1000z_scpi::{
    BuildContext, Catalog, CommandBuilder, FilterType, LogicalOperation, MathMode,
    MockTransport, ParamValues, ScopeSession, ScpiError, SessionSequencer,
};
use std::sync::Arc;
use std::time::Duration;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * b.abs().max(1.0)
}

#[test]
fn vertical_scale_scenario() {
    let catalog = Catalog::ds1000z();
    let plan = CommandBuilder::new(&catalog)
        .build(
            LogicalOperation::SetVerticalScale,
            &ParamValues::new().with("scale", 0.5),
            &BuildContext::default(),
        )
        .unwrap();

    assert_eq!(plan.commands(), vec![":CHANnel1:SCALe 0.5"]);
    assert_eq!(plan.total_delay(), Duration::ZERO);
}

#[test]
fn apply_fft_scenario_has_five_ordered_commands() {
    let catalog = Catalog::ds1000z();
    let plan = CommandBuilder::new(&catalog)
        .build(
            LogicalOperation::ApplyFFT,
            &ParamValues::new()
                .with("source", "CHANnel1")
                .with("window", "HANNing")
                .with("split", "FULL")
                .with("unit", "VRMS"),
            &BuildContext::default(),
        )
        .unwrap();

    assert_eq!(
        plan.commands(),
        vec![
            ":MATH:DISPlay ON",
            ":MATH:FFT:SOURce CHANnel1",
            ":MATH:FFT:WINDow HANNing",
            ":MATH:FFT:SPLit FULL",
            ":MATH:FFT:UNIT VRMS",
        ]
    );
}

#[test]
fn band_filter_rejects_w1_not_below_w2() {
    let catalog = Catalog::ds1000z();
    let builder = CommandBuilder::new(&catalog);
    let ctx = BuildContext::with_timebase(0.001);

    // Both cutoffs are individually in range at 1 ms/div
    for (w1, w2) in [(5000.0, 5000.0), (9000.0, 2000.0)] {
        let err = builder
            .build(
                LogicalOperation::SetDigitalFilter,
                &ParamValues::new()
                    .with("type", "BPASs")
                    .with("w1", w1)
                    .with("w2", w2),
                &ctx,
            )
            .unwrap_err();
        match err {
            ScpiError::Validation {
                operation, reason, ..
            } => {
                assert_eq!(operation, "SetDigitalFilter");
                assert_eq!(reason, "W1 must be less than W2");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    let plan = builder
        .build(
            LogicalOperation::SetDigitalFilter,
            &ParamValues::new()
                .with("type", "BSTop")
                .with("w1", 2000.0)
                .with("w2", 8000.0),
            &ctx,
        )
        .unwrap();
    assert_eq!(
        plan.commands(),
        vec![
            ":MATH:DISPlay ON",
            ":MATH:FILTer:TYPE BSTop",
            ":MATH:FILTer:W1 2000",
            ":MATH:FILTer:W2 8000",
        ]
    );
}

#[test]
fn non_positive_timebase_is_invalid() {
    let catalog = Catalog::ds1000z();
    for timebase in [0.0, -0.001, -50.0] {
        assert!(matches!(
            catalog.filter_frequency_range(timebase, "LPASs"),
            Err(ScpiError::InvalidTimebase(_))
        ));
    }
    assert!(matches!(
        catalog.filter_frequency_range(0.001, "NOTCh"),
        Err(ScpiError::UnknownFilterType(_))
    ));
}

#[test]
fn low_pass_range_at_one_millisecond() {
    let bounds = Catalog::ds1000z()
        .filter_frequency_range(0.001, "LPASs")
        .unwrap();
    assert_eq!(bounds.filter_type, FilterType::LowPass);
    assert!(approx(bounds.screen_sample_rate, 100_000.0));
    assert!(approx(bounds.min_freq(), 500.0));
    assert!(approx(bounds.max_freq(), 10_000.0));
    assert!(approx(bounds.step, 500.0));
    assert!(bounds.w2.is_none());
}

#[test]
fn numeric_formatting_round_trips() {
    for text in ["1000", "0.5", "-2.25", "0.001", "20000000"] {
        let parsed = parse_number(text).unwrap();
        assert_eq!(format_number(parsed), text);
    }
}

#[test]
fn building_is_idempotent() {
    let catalog = Catalog::ds1000z();
    let builder = CommandBuilder::new(&catalog);
    let values = ParamValues::new()
        .with("operator", "ADD")
        .with("source1", "CHANnel1")
        .with("source2", "CHANnel3");

    let a = builder
        .build(LogicalOperation::ApplyBasicOperation, &values, &BuildContext::default())
        .unwrap();
    let b = builder
        .build(LogicalOperation::ApplyBasicOperation, &values, &BuildContext::default())
        .unwrap();
    assert_eq!(a, b);

    let switch = |b: &CommandBuilder| {
        b.build_mode_switch(
            Some(MathMode::FFTAnalysis),
            MathMode::BasicOperations,
            &values,
            &BuildContext::default(),
        )
        .unwrap()
    };
    assert_eq!(switch(&builder), switch(&builder));
}

#[test]
fn planning_through_a_session_sends_nothing() {
    let scope = Arc::new(MockTransport::new());
    let catalog = Arc::new(Catalog::ds1000z());
    let session = ScopeSession::new(catalog.clone(), SessionSequencer::new(scope.clone()))
        .with_timebase(0.001);

    let mut planned = 0;
    for op in catalog.operations() {
        if session.plan(op, &ParamValues::new()).is_ok() {
            planned += 1;
        }
    }
    let filter = ParamValues::new().with("type", "LPASs").with("w1", 1000.0);
    assert!(session.plan(LogicalOperation::SetDigitalFilter, &filter).is_ok());

    assert!(planned > 0);
    assert!(scope.get_call_log().is_empty());
}

#[test]
fn every_failure_names_operation_and_parameter() {
    let catalog = Catalog::ds1000z();
    let builder = CommandBuilder::new(&catalog);

    let cases = [
        (
            LogicalOperation::SetVerticalScale,
            ParamValues::new().with("scale", 5000.0),
            "scale",
        ),
        (
            LogicalOperation::SetMathSource1,
            ParamValues::new().with("source", "CHANnel7"),
            "source",
        ),
        (
            LogicalOperation::SetMathOptionRange,
            ParamValues::new().with("start", 600).with("end", 100),
            "end",
        ),
        (
            LogicalOperation::SetChannelDisplay,
            ParamValues::new().with("state", "ON").with("colour", "red"),
            "colour",
        ),
    ];

    for (op, values, param) in cases {
        let err = builder
            .build(op, &values, &BuildContext::default())
            .unwrap_err();
        assert!(err.is_pre_transmission());
        assert_eq!(err.parameter(), Some(param), "{} {:?}", op, err);
        assert!(err.to_string().starts_with(op.name()));
    }
}

#[test]
fn filter_frequency_without_timebase_is_a_validation_error() {
    let catalog = Catalog::ds1000z();
    let err = CommandBuilder::new(&catalog)
        .build(
            LogicalOperation::SetDigitalFilter,
            &ParamValues::new().with("type", "HPASs").with("w1", 1000.0),
            &BuildContext::default(),
        )
        .unwrap_err();
    assert_eq!(err.parameter(), Some("w1"));
    assert!(err.to_string().contains("timebase"));
}
