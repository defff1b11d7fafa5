//! CLI Entry Point for ds1000z
//!
//! Provides command-line access to the command core:
//! - Listing operations and previewing plans (no instrument needed)
//! - Applying operations and math mode switches to a scope
//! - Raw queries and identification
//!
//! # Usage
//!
//! Preview a plan:
//! ```bash
//! ds1000z plan SetVerticalScale channel=2 scale=0.5
//! ```
//!
//! Switch the math trace to FFT on a networked scope:
//! ```bash
//! DS1000Z_TRANSPORT__KIND=tcp DS1000Z_TRANSPORT__HOST=192.168.1.50 \
//!     ds1000z switch-mode --to fft window=HANNing
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ds1000z_scpi::config::{ScopeConfig, TransportKind};
use ds1000z_scpi::settings::{self, ChannelSettings, MathSettings};
use ds1000z_scpi::{
    logging, BuildContext, Catalog, CommandBuilder, MathMode, MockTransport, ParamValues,
    ScopeSession, ScpiTransport, SessionSequencer, TcpTransport,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ds1000z")]
#[command(about = "SCPI command planner and sequencer for Rigol DS1000Z-E oscilloscopes", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = ds1000z_scpi::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported operations and their parameters
    Operations,

    /// Validate parameters and print the resulting plan without sending it
    Plan {
        /// Operation name, e.g. SetVerticalScale
        operation: String,
        /// Parameters as name=value
        #[arg(value_parser = parse_assignment)]
        params: Vec<(String, String)>,
        /// Current timebase in s/div (needed for filter frequencies)
        #[arg(long)]
        timebase: Option<f64>,
    },

    /// Move the math trace into another mode
    SwitchMode {
        /// Current mode; omitted means unknown
        #[arg(long)]
        from: Option<MathMode>,
        /// Target mode: basic, fft, filter or advanced
        #[arg(long)]
        to: MathMode,
        /// Parameters as name=value
        #[arg(value_parser = parse_assignment)]
        params: Vec<(String, String)>,
        /// Current timebase in s/div
        #[arg(long)]
        timebase: Option<f64>,
        /// Print the plan instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate and send one operation
    Apply {
        /// Operation name
        operation: String,
        /// Parameters as name=value
        #[arg(value_parser = parse_assignment)]
        params: Vec<(String, String)>,
        /// Current timebase in s/div; read from the scope when omitted
        #[arg(long)]
        timebase: Option<f64>,
    },

    /// Show digital filter cutoff limits for a timebase
    FilterRange {
        /// Timebase in s/div
        #[arg(long)]
        timebase: f64,
        /// Filter type: LPASs, HPASs, BPASs or BSTop
        #[arg(long = "type", default_value = "LPASs")]
        filter_type: String,
    },

    /// Read back channel and math settings
    Status {
        /// Channel to read
        #[arg(long, default_value_t = 1)]
        channel: u8,
    },

    /// Send a raw query and print the response
    Query {
        /// SCPI query, e.g. :TIMebase:MAIN:SCALe?
        scpi: String,
    },

    /// Query *IDN?
    Identify,

    /// Print the effective configuration as TOML
    Config,
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

fn to_values(params: Vec<(String, String)>) -> ParamValues {
    params.into_iter().collect()
}

fn print<T: Serialize + std::fmt::Debug>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{:#?}", value);
    }
    Ok(())
}

async fn connect(config: &ScopeConfig) -> Result<Arc<dyn ScpiTransport>> {
    let transport: Arc<dyn ScpiTransport> = match config.transport.kind {
        TransportKind::Mock => Arc::new(MockTransport::new()),
        TransportKind::Tcp => Arc::new(
            TcpTransport::connect(&config.transport.host, config.transport.port)
                .await?
                .with_timeout(config.transport.timeout()),
        ),
    };
    tracing::info!(transport = %transport.describe(), "transport ready");
    Ok(transport)
}

async fn open_session(config: &ScopeConfig, catalog: Arc<Catalog>) -> Result<ScopeSession> {
    let transport = connect(config).await?;
    let sequencer = SessionSequencer::with_policy(transport, config.session.busy_policy);
    Ok(ScopeSession::new(catalog, sequencer))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ScopeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    logging::init_from_config(&config)?;

    let catalog = Arc::new(Catalog::ds1000z());

    match cli.command {
        Commands::Operations => {
            for op in catalog.operations() {
                let spec = catalog.get_spec(op)?;
                let slots: Vec<String> = spec
                    .slots
                    .iter()
                    .map(|s| match s.default {
                        Some(default) => format!("{}={}", s.name, default),
                        None if s.optional => format!("[{}]", s.name),
                        None => s.name.to_string(),
                    })
                    .collect();
                println!("{:<22} {:<48} {}", op, spec.description, slots.join(" "));
            }
            Ok(())
        }

        Commands::Plan {
            operation,
            params,
            timebase,
        } => {
            let op = catalog.lookup(&operation)?;
            let ctx = BuildContext {
                timebase_seconds: timebase,
                filter_type: None,
            };
            let plan = CommandBuilder::new(&catalog).build(op, &to_values(params), &ctx)?;
            if cli.json {
                print(true, &plan)
            } else {
                for step in plan.steps() {
                    println!("{:<48} {:>5} ms", step.command, step.delay.as_millis());
                }
                Ok(())
            }
        }

        Commands::SwitchMode {
            from,
            to,
            params,
            timebase,
            dry_run,
        } => {
            let values = to_values(params);
            if dry_run {
                let ctx = BuildContext {
                    timebase_seconds: timebase,
                    filter_type: None,
                };
                let plan =
                    CommandBuilder::new(&catalog).build_mode_switch(from, to, &values, &ctx)?;
                return print(cli.json, &plan);
            }

            let mut session = open_session(&config, catalog).await?;
            if let Some(mode) = from {
                session = session.with_math_mode(mode);
            }
            session = match timebase {
                Some(tb) => session.with_timebase(tb),
                None => {
                    session.refresh_timebase().await?;
                    session
                }
            };
            let result = session.switch_math_mode(to, &values).await?;
            print(cli.json, &result)
        }

        Commands::Apply {
            operation,
            params,
            timebase,
        } => {
            let op = catalog.lookup(&operation)?;
            let mut session = open_session(&config, catalog).await?;
            session = match timebase {
                Some(tb) => session.with_timebase(tb),
                None => {
                    session.refresh_timebase().await?;
                    session
                }
            };
            let result = session.apply(op, &to_values(params)).await?;
            print(cli.json, &result)
        }

        Commands::FilterRange {
            timebase,
            filter_type,
        } => {
            let bounds = catalog.filter_frequency_range(timebase, &filter_type)?;
            print(cli.json, &bounds)
        }

        Commands::Status { channel } => {
            let session = open_session(&config, catalog.clone()).await?;
            let mut ch = ChannelSettings::new(channel);
            let mut math = MathSettings::new();
            let mut stale = ch.refresh(&catalog, session.sequencer()).await?.stale;
            stale.extend(math.refresh(&catalog, session.sequencer()).await?.stale);
            for (field, reason) in &stale {
                tracing::warn!(field, reason = %reason, "stale setting");
            }
            print(cli.json, &(ch, math))
        }

        Commands::Query { scpi } => {
            let session = open_session(&config, catalog).await?;
            let response = session.sequencer().query_text(&scpi).await?;
            println!("{}", response);
            Ok(())
        }

        Commands::Identify => {
            let session = open_session(&config, catalog).await?;
            let identity = settings::identify(session.sequencer()).await?;
            if cli.json {
                print(true, &identity)
            } else {
                println!("{}", identity);
                Ok(())
            }
        }

        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
