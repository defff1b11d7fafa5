//! DS1000Z-E command table.

use super::filter::FilterEdge;
use super::{CommandTemplate, CrossRule, LogicalOperation, OperationSpec, ParamKind, ParamSlot};

const ON_OFF: &[&str] = &["ON", "OFF"];
const COUPLINGS: &[&str] = &["DC", "AC", "GND"];
const BANDWIDTH_LIMITS: &[&str] = &["20M", "OFF"];
const PROBE_RATIOS: &[&str] = &[
    "0.01", "0.02", "0.05", "0.1", "0.2", "0.5", "1", "2", "5", "10", "20", "50", "100", "200",
    "500", "1000",
];
const MATH_SOURCES: &[&str] = &["CHANnel1", "CHANnel2", "CHANnel3", "CHANnel4", "MATH"];
const FFT_SOURCES: &[&str] = &["CHANnel1", "CHANnel2", "CHANnel3", "CHANnel4"];
const BASIC_OPERATORS: &[&str] = &["ADD", "SUBtract", "MULtiply", "DIVide"];
const ADVANCED_FUNCTIONS: &[&str] = &["INTG", "DIFF", "SQRT", "LOG", "LN", "EXP", "ABS"];
const ALL_OPERATORS: &[&str] = &[
    "ADD", "SUBtract", "MULtiply", "DIVide", "FFT", "FILTer", "INTG", "DIFF", "SQRT", "LOG",
    "LN", "EXP", "ABS",
];
const FFT_WINDOWS: &[&str] = &[
    "RECTangle",
    "BLACkman",
    "HANNing",
    "HAMMing",
    "FLATtop",
    "TRIangle",
];
const FFT_SPLITS: &[&str] = &["FULL", "CENTer"];
const FFT_UNITS: &[&str] = &["VRMS", "DB"];

const CHANNEL: ParamSlot =
    ParamSlot::required("channel", ParamKind::Integer { min: 1, max: 4 }).with_default("1");

const MATH_DISPLAY_ON: CommandTemplate = CommandTemplate::new(":MATH:DISPlay ON").preamble();

fn channel_op(
    operation: LogicalOperation,
    description: &'static str,
    value: ParamSlot,
    pattern: &'static str,
) -> OperationSpec {
    OperationSpec {
        operation,
        description,
        slots: vec![CHANNEL, value],
        templates: vec![CommandTemplate::new(pattern)],
        cross_rules: vec![],
    }
}

fn single(
    operation: LogicalOperation,
    description: &'static str,
    value: ParamSlot,
    pattern: &'static str,
) -> OperationSpec {
    OperationSpec {
        operation,
        description,
        slots: vec![value],
        templates: vec![CommandTemplate::new(pattern)],
        cross_rules: vec![],
    }
}

pub(super) fn specs() -> Vec<OperationSpec> {
    use LogicalOperation as Op;

    vec![
        // Channel
        channel_op(
            Op::SetChannelDisplay,
            "Show or hide an analog channel",
            ParamSlot::required("state", ParamKind::Choice(ON_OFF)),
            ":CHANnel{channel}:DISPlay {state}",
        ),
        channel_op(
            Op::SetProbeRatio,
            "Set the probe attenuation ratio",
            ParamSlot::required("ratio", ParamKind::Choice(PROBE_RATIOS)),
            ":CHANnel{channel}:PROBe {ratio}",
        ),
        channel_op(
            Op::SetVerticalScale,
            "Set volts per division",
            ParamSlot::required(
                "scale",
                ParamKind::Bounded {
                    min: 0.001,
                    max: 1000.0,
                },
            ),
            ":CHANnel{channel}:SCALe {scale}",
        ),
        channel_op(
            Op::SetVerticalOffset,
            "Set the vertical offset in volts",
            ParamSlot::required("offset", ParamKind::Numeric),
            ":CHANnel{channel}:OFFSet {offset}",
        ),
        channel_op(
            Op::SetCoupling,
            "Set the input coupling",
            ParamSlot::required("coupling", ParamKind::Choice(COUPLINGS)),
            ":CHANnel{channel}:COUPling {coupling}",
        ),
        channel_op(
            Op::SetBandwidthLimit,
            "Enable or disable the 20 MHz bandwidth limit",
            ParamSlot::required("limit", ParamKind::Choice(BANDWIDTH_LIMITS)),
            ":CHANnel{channel}:BWLimit {limit}",
        ),
        channel_op(
            Op::SetChannelInvert,
            "Invert the displayed waveform",
            ParamSlot::required("state", ParamKind::Choice(ON_OFF)),
            ":CHANnel{channel}:INVert {state}",
        ),
        // Timebase
        single(
            Op::SetTimebaseScale,
            "Set seconds per division of the main timebase",
            ParamSlot::required(
                "scale",
                ParamKind::Bounded {
                    min: 5e-9,
                    max: 50.0,
                },
            ),
            ":TIMebase:MAIN:SCALe {scale}",
        ),
        // Math primitives
        single(
            Op::SetMathDisplay,
            "Show or hide the math trace",
            ParamSlot::required("state", ParamKind::Choice(ON_OFF)),
            ":MATH:DISPlay {state}",
        ),
        single(
            Op::SetMathOperator,
            "Select the math function",
            ParamSlot::required("operator", ParamKind::Choice(ALL_OPERATORS)),
            ":MATH:OPERator {operator}",
        ),
        single(
            Op::SetMathSource1,
            "Select the first math source",
            ParamSlot::required("source", ParamKind::Choice(MATH_SOURCES)),
            ":MATH:SOURce1 {source}",
        ),
        single(
            Op::SetMathSource2,
            "Select the second math source",
            ParamSlot::required("source", ParamKind::Choice(MATH_SOURCES)),
            ":MATH:SOURce2 {source}",
        ),
        single(
            Op::SetMathScale,
            "Set the vertical scale of the math trace",
            ParamSlot::required(
                "scale",
                ParamKind::Bounded {
                    min: 1e-6,
                    max: 1e6,
                },
            ),
            ":MATH:SCALe {scale}",
        ),
        single(
            Op::SetMathOffset,
            "Set the vertical offset of the math trace",
            ParamSlot::required("offset", ParamKind::Numeric),
            ":MATH:OFFSet {offset}",
        ),
        // Math modes
        OperationSpec {
            operation: Op::ApplyBasicOperation,
            description: "Configure an arithmetic operation between two sources",
            slots: vec![
                ParamSlot::required("operator", ParamKind::Choice(BASIC_OPERATORS)),
                ParamSlot::required("source1", ParamKind::Choice(MATH_SOURCES))
                    .with_default("CHANnel1"),
                ParamSlot::required("source2", ParamKind::Choice(MATH_SOURCES))
                    .with_default("CHANnel2"),
            ],
            templates: vec![
                MATH_DISPLAY_ON,
                CommandTemplate::new(":MATH:OPERator {operator}").preamble(),
                CommandTemplate::new(":MATH:SOURce1 {source1}"),
                CommandTemplate::new(":MATH:SOURce2 {source2}"),
            ],
            cross_rules: vec![],
        },
        OperationSpec {
            operation: Op::ApplyFFT,
            description: "Configure the FFT spectrum view",
            slots: vec![
                ParamSlot::required("source", ParamKind::Choice(FFT_SOURCES))
                    .with_default("CHANnel1"),
                ParamSlot::required("window", ParamKind::Choice(FFT_WINDOWS))
                    .with_default("RECTangle"),
                ParamSlot::required("split", ParamKind::Choice(FFT_SPLITS)).with_default("FULL"),
                ParamSlot::required("unit", ParamKind::Choice(FFT_UNITS)).with_default("DB"),
            ],
            templates: vec![
                MATH_DISPLAY_ON,
                CommandTemplate::new(":MATH:FFT:SOURce {source}"),
                CommandTemplate::new(":MATH:FFT:WINDow {window}"),
                CommandTemplate::new(":MATH:FFT:SPLit {split}"),
                CommandTemplate::new(":MATH:FFT:UNIT {unit}"),
            ],
            cross_rules: vec![],
        },
        OperationSpec {
            operation: Op::SetDigitalFilter,
            description: "Configure a low/high-pass or band filter on the math trace",
            slots: vec![
                ParamSlot::required("type", ParamKind::FilterSelect),
                ParamSlot::required("w1", ParamKind::FilterFrequency(FilterEdge::W1)),
                ParamSlot::optional("w2", ParamKind::FilterFrequency(FilterEdge::W2)),
            ],
            templates: vec![
                MATH_DISPLAY_ON,
                CommandTemplate::new(":MATH:FILTer:TYPE {type}"),
                CommandTemplate::new(":MATH:FILTer:W1 {w1}"),
                CommandTemplate::new(":MATH:FILTer:W2 {w2}").when("w2"),
            ],
            cross_rules: vec![CrossRule::LessThan {
                lower: "w1",
                upper: "w2",
                reason: "W1 must be less than W2",
            }],
        },
        OperationSpec {
            operation: Op::ApplyAdvancedMath,
            description: "Apply a single-source advanced math function",
            slots: vec![
                ParamSlot::required("function", ParamKind::Choice(ADVANCED_FUNCTIONS)),
                ParamSlot::required("source", ParamKind::Choice(FFT_SOURCES))
                    .with_default("CHANnel1"),
                ParamSlot::required("invert", ParamKind::Choice(ON_OFF)).with_default("OFF"),
            ],
            templates: vec![
                MATH_DISPLAY_ON,
                CommandTemplate::new(":MATH:OPERator {function}").preamble(),
                CommandTemplate::new(":MATH:SOURce1 {source}"),
                CommandTemplate::new(":MATH:OPTion:INVert {invert}"),
            ],
            cross_rules: vec![],
        },
        OperationSpec {
            operation: Op::SetMathOptionRange,
            description: "Limit the math calculation to a window of screen points",
            slots: vec![
                ParamSlot::required("start", ParamKind::Integer { min: 0, max: 1199 }),
                ParamSlot::required("end", ParamKind::Integer { min: 1, max: 1200 }),
            ],
            templates: vec![
                CommandTemplate::new(":MATH:OPTion:STARt {start}"),
                CommandTemplate::new(":MATH:OPTion:END {end}"),
            ],
            cross_rules: vec![CrossRule::LessThan {
                lower: "start",
                upper: "end",
                reason: "start must be less than end",
            }],
        },
    ]
}
