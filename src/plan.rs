//! Transition plans: fully materialized command sequences.

use crate::catalog::LogicalOperation;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One command and the settle delay that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCommand {
    /// Rendered SCPI line, without terminator.
    pub command: String,
    /// Pause after a successful send.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

/// Ordered, pre-validated sequence of commands for one operation invocation.
///
/// Built entirely before anything is transmitted. Delays are `Duration`s and so
/// cannot be negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPlan {
    /// Human-readable name, used for attribution in results and logs.
    pub label: String,
    /// Operation the plan configures.
    pub operation: Option<LogicalOperation>,
    steps: Vec<PlannedCommand>,
}

impl TransitionPlan {
    /// Empty plan.
    pub fn new(label: impl Into<String>, operation: Option<LogicalOperation>) -> Self {
        Self {
            label: label.into(),
            operation,
            steps: Vec::new(),
        }
    }

    /// Append a command.
    pub fn push(&mut self, command: impl Into<String>, delay: Duration) {
        self.steps.push(PlannedCommand {
            command: command.into(),
            delay,
        });
    }

    /// Builder-style append.
    pub fn then(mut self, command: impl Into<String>, delay: Duration) -> Self {
        self.push(command, delay);
        self
    }

    /// Steps in transmission order.
    pub fn steps(&self) -> &[PlannedCommand] {
        &self.steps
    }

    /// Command strings in transmission order.
    pub fn commands(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.command.as_str()).collect()
    }

    /// Post-send delays in transmission order.
    pub fn delays(&self) -> Vec<Duration> {
        self.steps.iter().map(|s| s.delay).collect()
    }

    /// Sum of all settle delays.
    pub fn total_delay(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan sends nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
