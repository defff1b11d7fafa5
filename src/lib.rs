//! # DS1000Z-E SCPI Core
//!
//! Turns intent ("show channel 2", "switch the math trace to FFT") into ordered,
//! validated SCPI command plans for Rigol DS1000Z-E oscilloscopes, and sends those
//! plans over a transport one command at a time.
//!
//! ## Crate Structure
//!
//! - **`catalog`**: Logical operations, their parameter slots, SCPI templates and
//!   validation rules, plus the timebase-dependent digital filter limits.
//! - **`builder`**: Validates parameters against the catalog and renders a
//!   [`TransitionPlan`]. Never talks to an instrument.
//! - **`math_mode`**: Composite plans that move the math trace between function
//!   families with the settle delays the firmware needs.
//! - **`plan`**: Ordered `(command, delay)` steps.
//! - **`sequencer`**: Executes plans fail-fast, one in-flight plan per transport,
//!   with cancellation and progress events. Also typed queries.
//! - **`settings`**: Read-back of channel/math state with last-known values.
//! - **`session`**: Convenience handle tracking timebase and math mode.
//! - **`transport`**: The `ScpiTransport` trait, a TCP client and a mock.
//! - **`config`** / **`logging`**: Figment configuration and tracing setup.
//! - **`error`**: The [`ScpiError`] enum.
//!
//! ## Example
//!
//! ```
//! use ds1000z_scpi::{BuildContext, Catalog, CommandBuilder, LogicalOperation, ParamValues};
//!
//! let catalog = Catalog::ds1000z();
//! let plan = CommandBuilder::new(&catalog)
//!     .build(
//!         LogicalOperation::SetVerticalScale,
//!         &ParamValues::new().with("channel", 2).with("scale", 0.5),
//!         &BuildContext::default(),
//!     )
//!     .unwrap();
//! assert_eq!(plan.commands(), vec![":CHANnel2:SCALe 0.5"]);
//! ```

pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod math_mode;
pub mod plan;
pub mod sequencer;
pub mod session;
pub mod settings;
pub mod transport;

pub use builder::CommandBuilder;
pub use catalog::filter::{FilterBounds, FilterType};
pub use catalog::{BuildContext, Catalog, LogicalOperation, ParamValue, ParamValues};
pub use error::{ScpiError, ScpiResult};
pub use math_mode::MathMode;
pub use plan::{PlannedCommand, TransitionPlan};
pub use sequencer::{
    BusyPolicy, ExecutionControl, SessionEvent, SessionResult, SessionSequencer, SessionState,
};
pub use session::ScopeSession;
pub use transport::{MockTransport, ScpiTransport, TcpTransport};
