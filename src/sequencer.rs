//! Session Sequencer
//!
//! Executes a [`TransitionPlan`] against a transport, one command at a time.
//!
//! # State Machine
//!
//! ```text
//! Idle ──> Sending(0) ──ok──> Sending(1) ──ok──> ... ──ok──> Completed
//!              │                  │
//!         rejected/error     rejected/error/cancel
//!              ▼                  ▼
//!          Failed(0)          Failed(1)
//! ```
//!
//! - A step's settle delay is slept with `tokio::time::sleep` after a successful
//!   send, so other sessions on other transports keep running.
//! - The first failed send stops the plan. Nothing after it is sent and nothing is
//!   retried; the result lists exactly what reached the transport.
//! - Cancellation is checked before each send, never in the middle of one.
//! - A transport carries at most one plan or query at a time. Depending on
//!   [`BusyPolicy`], a second caller either waits or gets `TransportBusy`.

use crate::catalog::LogicalOperation;
use crate::error::{ScpiError, ScpiResult};
use crate::format::{parse_bool, parse_number};
use crate::plan::TransitionPlan;
use crate::transport::ScpiTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};

// =============================================================================
// Policy and state
// =============================================================================

/// What to do when the transport is already in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Fail immediately with `TransportBusy`.
    #[default]
    Reject,
    /// Wait for the current holder to finish.
    Queue,
}

/// Execution state of one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing sent yet
    Idle,
    /// Transmitting step `i`
    Sending(usize),
    /// Stopped at step `i`
    Failed(usize),
    /// Every step was sent
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Sending(i) => write!(f, "Sending({})", i),
            SessionState::Failed(i) => write!(f, "Failed({})", i),
            SessionState::Completed => write!(f, "Completed"),
        }
    }
}

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The transport returned `false` for the send.
    Rejected,
    /// The transport raised an error (including timeouts).
    Transport(String),
    /// Cancellation was requested before the step was sent.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Rejected => write!(f, "send rejected by transport"),
            FailureReason::Transport(msg) => write!(f, "transport error: {}", msg),
            FailureReason::Cancelled => write!(f, "cancelled before send"),
        }
    }
}

/// Where a plan stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePoint {
    /// Zero-based step index.
    pub step: usize,
    /// Command at that step.
    pub command: String,
    /// Cause.
    pub reason: FailureReason,
}

/// Outcome of executing one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Plan label.
    pub label: String,
    /// Operation the plan configured.
    pub operation: Option<LogicalOperation>,
    /// Whether every step was sent.
    pub success: bool,
    /// Terminal state.
    pub state: SessionState,
    /// Commands handed to the transport, including a failed one.
    pub sent_commands: Vec<String>,
    /// First failure, if any.
    pub failure: Option<FailurePoint>,
    /// Human-readable trail.
    pub log: Vec<String>,
}

impl SessionResult {
    /// Index of the failed step.
    pub fn failed_step(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.step)
    }

    /// Convert a failed result into `TransportFailure`, keeping successes as-is.
    pub fn into_result(self) -> ScpiResult<SessionResult> {
        match &self.failure {
            None => Ok(self),
            Some(failure) => Err(ScpiError::TransportFailure {
                operation: self.label.clone(),
                step: failure.step,
                command: failure.command.clone(),
                reason: failure.reason.to_string(),
            }),
        }
    }
}

// =============================================================================
// Progress and cancellation
// =============================================================================

/// Progress notification emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Execution began.
    Started {
        /// Plan label
        label: String,
        /// Number of steps
        steps: usize,
    },
    /// A command was accepted by the transport.
    Sent {
        /// Step index
        step: usize,
        /// Command sent
        command: String,
    },
    /// Waiting out a settle delay.
    Settling {
        /// Step index
        step: usize,
        /// Pause length
        delay: Duration,
    },
    /// The plan stopped.
    Failed(FailurePoint),
    /// Every step was sent.
    Completed {
        /// Number of commands sent
        sent: usize,
    },
}

/// Caller-provided hooks for one execution.
#[derive(Debug, Default)]
pub struct ExecutionControl {
    progress: Option<mpsc::UnboundedSender<SessionEvent>>,
    cancel: Option<watch::Receiver<bool>>,
}

impl ExecutionControl {
    /// No progress reporting, no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report progress on `tx`.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop before the next send once `rx` reads `true`.
    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.progress {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }
}

// =============================================================================
// Sequencer
// =============================================================================

struct Inner {
    transport: Arc<dyn ScpiTransport>,
    gate: Mutex<()>,
    policy: BusyPolicy,
}

/// Serializes plans and queries onto one transport.
///
/// Create one sequencer per transport and clone it to share; clones use the same
/// exclusivity gate.
#[derive(Clone)]
pub struct SessionSequencer {
    inner: Arc<Inner>,
}

impl SessionSequencer {
    /// Sequencer that rejects concurrent use.
    pub fn new(transport: Arc<dyn ScpiTransport>) -> Self {
        Self::with_policy(transport, BusyPolicy::Reject)
    }

    /// Sequencer with an explicit busy policy.
    pub fn with_policy(transport: Arc<dyn ScpiTransport>, policy: BusyPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                gate: Mutex::new(()),
                policy,
            }),
        }
    }

    /// Busy policy in effect.
    pub fn policy(&self) -> BusyPolicy {
        self.inner.policy
    }

    /// Whether a plan or query currently holds the transport.
    pub fn is_busy(&self) -> bool {
        self.inner.gate.try_lock().is_err()
    }

    async fn acquire(&self) -> ScpiResult<MutexGuard<'_, ()>> {
        match self.inner.policy {
            BusyPolicy::Reject => self
                .inner
                .gate
                .try_lock()
                .map_err(|_| ScpiError::TransportBusy),
            BusyPolicy::Queue => Ok(self.inner.gate.lock().await),
        }
    }

    /// Execute `plan` without progress reporting or cancellation.
    pub async fn execute(&self, plan: &TransitionPlan) -> ScpiResult<SessionResult> {
        self.execute_with(plan, ExecutionControl::new()).await
    }

    /// Execute `plan`.
    ///
    /// Returns `Err` only when the transport is busy; send failures and
    /// cancellation are reported in the [`SessionResult`].
    pub async fn execute_with(
        &self,
        plan: &TransitionPlan,
        control: ExecutionControl,
    ) -> ScpiResult<SessionResult> {
        let _guard = self.acquire().await?;
        let transport = &self.inner.transport;

        tracing::info!(
            plan = %plan.label,
            steps = plan.len(),
            transport = %transport.describe(),
            "executing plan"
        );
        control.emit(SessionEvent::Started {
            label: plan.label.clone(),
            steps: plan.len(),
        });

        let mut state = SessionState::Idle;
        tracing::trace!(%state, plan = %plan.label);
        let mut sent_commands = Vec::with_capacity(plan.len());
        let mut failure = None;
        let mut log = vec![format!(
            "{}: {} step(s) on {}",
            plan.label,
            plan.len(),
            transport.describe()
        )];

        for (i, step) in plan.steps().iter().enumerate() {
            if control.is_cancelled() {
                failure = Some(FailurePoint {
                    step: i,
                    command: step.command.clone(),
                    reason: FailureReason::Cancelled,
                });
                break;
            }

            state = SessionState::Sending(i);
            tracing::trace!(%state, command = %step.command);

            let outcome = transport.send(&step.command).await;
            sent_commands.push(step.command.clone());

            let reason = match outcome {
                Ok(true) => None,
                Ok(false) => Some(FailureReason::Rejected),
                Err(e) => Some(FailureReason::Transport(format!("{:#}", e))),
            };
            if let Some(reason) = reason {
                failure = Some(FailurePoint {
                    step: i,
                    command: step.command.clone(),
                    reason,
                });
                break;
            }

            log.push(format!("[{}] -> {}", i, step.command));
            control.emit(SessionEvent::Sent {
                step: i,
                command: step.command.clone(),
            });

            if !step.delay.is_zero() {
                log.push(format!("[{}] settle {}ms", i, step.delay.as_millis()));
                control.emit(SessionEvent::Settling {
                    step: i,
                    delay: step.delay,
                });
                tokio::time::sleep(step.delay).await;
            }
        }

        match &failure {
            Some(point) => {
                state = SessionState::Failed(point.step);
                tracing::warn!(
                    plan = %plan.label,
                    step = point.step,
                    command = %point.command,
                    reason = %point.reason,
                    "plan stopped"
                );
                log.push(format!(
                    "[{}] FAILED {}: {}",
                    point.step, point.command, point.reason
                ));
                control.emit(SessionEvent::Failed(point.clone()));
            }
            None => {
                state = SessionState::Completed;
                tracing::info!(plan = %plan.label, sent = sent_commands.len(), "plan completed");
                log.push(format!("completed, {} command(s) sent", sent_commands.len()));
                control.emit(SessionEvent::Completed {
                    sent: sent_commands.len(),
                });
            }
        }

        Ok(SessionResult {
            label: plan.label.clone(),
            operation: plan.operation,
            success: failure.is_none(),
            state,
            sent_commands,
            failure,
            log,
        })
    }

    /// Send a query and return the trimmed response line.
    ///
    /// Silence, an empty line, or a transport error are all `QueryFailed`.
    pub async fn query_raw(&self, query: &str) -> ScpiResult<String> {
        let _guard = self.acquire().await?;
        match self.inner.transport.query(query).await {
            Ok(Some(response)) if !response.trim().is_empty() => Ok(response.trim().to_string()),
            Ok(_) => Err(ScpiError::query_failed(query, "empty response")),
            Err(e) => Err(ScpiError::query_failed(query, format!("{:#}", e))),
        }
    }

    /// Query a trimmed text value.
    pub async fn query_text(&self, query: &str) -> ScpiResult<String> {
        self.query_raw(query).await
    }

    /// Query a number in invariant form.
    pub async fn query_f64(&self, query: &str) -> ScpiResult<f64> {
        let response = self.query_raw(query).await?;
        parse_number(&response).ok_or_else(|| {
            ScpiError::query_failed(query, format!("'{}' is not a number", response))
        })
    }

    /// Query an `ON`/`OFF`/`1`/`0` flag.
    pub async fn query_bool(&self, query: &str) -> ScpiResult<bool> {
        let response = self.query_raw(query).await?;
        parse_bool(&response).ok_or_else(|| {
            ScpiError::query_failed(query, format!("'{}' is not a boolean", response))
        })
    }
}

impl fmt::Debug for SessionSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSequencer")
            .field("transport", &self.inner.transport.describe())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn plan(commands: &[&str]) -> TransitionPlan {
        commands.iter().fold(TransitionPlan::new("test", None), |p, c| {
            p.then(*c, Duration::ZERO)
        })
    }

    #[tokio::test]
    async fn completes_every_step() {
        let scope = Arc::new(MockTransport::new());
        let sequencer = SessionSequencer::new(scope.clone());

        let result = sequencer.execute(&plan(&["A 1", "B 2"])).await.unwrap();
        assert!(result.success);
        assert_eq!(result.state, SessionState::Completed);
        assert_eq!(result.sent_commands, vec!["A 1", "B 2"]);
        assert_eq!(scope.sent_commands(), vec!["A 1", "B 2"]);
        assert!(result.log.last().unwrap().starts_with("completed"));
    }

    #[tokio::test]
    async fn empty_plan_completes_immediately() {
        let sequencer = SessionSequencer::new(Arc::new(MockTransport::new()));
        let result = sequencer.execute(&plan(&[])).await.unwrap();
        assert!(result.success);
        assert!(result.sent_commands.is_empty());
    }

    #[tokio::test]
    async fn failure_converts_to_transport_error() {
        let scope = Arc::new(MockTransport::new().reject_send(0));
        let sequencer = SessionSequencer::new(scope);
        let result = sequencer.execute(&plan(&["A 1"])).await.unwrap();
        assert_eq!(result.failed_step(), Some(0));

        match result.into_result() {
            Err(ScpiError::TransportFailure { step, command, .. }) => {
                assert_eq!(step, 0);
                assert_eq!(command, "A 1");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn query_parsing() {
        let scope = Arc::new(MockTransport::new());
        scope.respond(":CHANnel1:SCALe?", Some("5.000000e-01\n"));
        scope.respond(":MATH:DISPlay?", Some("1"));
        scope.respond(":MATH:SCALe?", Some("1,5"));
        scope.respond(":MATH:OFFSet?", None);
        let sequencer = SessionSequencer::new(scope);

        assert_eq!(sequencer.query_f64(":CHANnel1:SCALe?").await.unwrap(), 0.5);
        assert!(sequencer.query_bool(":MATH:DISPlay?").await.unwrap());
        assert!(matches!(
            sequencer.query_f64(":MATH:SCALe?").await,
            Err(ScpiError::QueryFailed { .. })
        ));
        assert!(matches!(
            sequencer.query_text(":MATH:OFFSet?").await,
            Err(ScpiError::QueryFailed { .. })
        ));
    }

    #[test]
    fn busy_policy_deserializes_lowercase() {
        let policy: BusyPolicy = serde_json::from_str("\"queue\"").unwrap();
        assert_eq!(policy, BusyPolicy::Queue);
        assert_eq!(BusyPolicy::default(), BusyPolicy::Reject);
    }
}
