//! Mock oscilloscope transport for testing
//!
//! Behaves like a tiny SCPI instrument without hardware:
//! - `HEADER value` commands update an internal setting table (`;` compounds are
//!   split), and `HEADER?` answers from it
//! - Scripted responses override the table for specific queries
//! - Controllable rejection of sends, one-shot or by index
//! - Simulated latency
//! - Call log for test verification

use super::ScpiTransport;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Identity returned for `*IDN?`.
pub const MOCK_IDN: &str = "RIGOL TECHNOLOGIES,DS1104Z,DS1ZA000000000,00.04.04.SP4";

/// In-memory SCPI instrument.
///
/// # Example
///
/// ```
/// use ds1000z_scpi::transport::{MockTransport, ScpiTransport};
///
/// # tokio_test::block_on(async {
/// let scope = MockTransport::new();
/// assert!(scope.send(":CHANnel1:SCALe 0.5").await.unwrap());
/// let reply = scope.query(":CHANnel1:SCALe?").await.unwrap();
/// assert_eq!(reply.as_deref(), Some("0.5"));
/// # })
/// ```
pub struct MockTransport {
    latency: Duration,
    sends: AtomicUsize,
    reject_next: AtomicBool,
    reject_at: Mutex<HashSet<usize>>,
    settings: Mutex<HashMap<String, String>>,
    responses: Mutex<HashMap<String, Option<String>>>,
    call_log: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Mock with a powered-on default state and no latency.
    pub fn new() -> Self {
        let defaults = [
            (":CHANNEL1:DISPLAY", "1"),
            (":CHANNEL1:PROBE", "10"),
            (":CHANNEL1:SCALE", "1.000000e+00"),
            (":CHANNEL1:OFFSET", "0.000000e+00"),
            (":CHANNEL1:COUPLING", "DC"),
            (":TIMEBASE:MAIN:SCALE", "1.000000e-03"),
            (":MATH:DISPLAY", "0"),
            (":MATH:OPERATOR", "ADD"),
            (":MATH:SCALE", "1.000000e+00"),
            (":MATH:OFFSET", "0.000000e+00"),
        ];
        Self {
            latency: Duration::ZERO,
            sends: AtomicUsize::new(0),
            reject_next: AtomicBool::new(false),
            reject_at: Mutex::new(HashSet::new()),
            settings: Mutex::new(
                defaults
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            responses: Mutex::new(HashMap::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Simulated per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the next `send`.
    pub fn trigger_failure(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    /// Reject the send with zero-based index `index` (counted over the mock's life).
    pub fn reject_send(self, index: usize) -> Self {
        lock(&self.reject_at).insert(index);
        self
    }

    /// Answer `query` with `response` (`None` simulates silence).
    pub fn respond(&self, query: &str, response: Option<&str>) {
        lock(&self.responses).insert(normalize(query), response.map(str::to_string));
    }

    /// Commands and queries received, in order.
    pub fn get_call_log(&self) -> Vec<String> {
        lock(&self.call_log).clone()
    }

    /// Commands received (queries excluded), in order.
    pub fn sent_commands(&self) -> Vec<String> {
        lock(&self.call_log)
            .iter()
            .filter(|line| !line.trim_end().ends_with('?'))
            .cloned()
            .collect()
    }

    /// Clear the call log.
    pub fn clear_call_log(&self) {
        lock(&self.call_log).clear();
    }

    /// Current value of a setting, by header (case-insensitive).
    pub fn setting(&self, header: &str) -> Option<String> {
        lock(&self.settings).get(&normalize(header)).cloned()
    }

    fn apply(&self, line: &str) {
        let mut settings = lock(&self.settings);
        for statement in line.split(';') {
            if let Some((header, value)) = statement.trim().split_once(' ') {
                settings.insert(normalize(header), value.trim().to_string());
            }
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScpiTransport for MockTransport {
    async fn send(&self, command: &str) -> Result<bool> {
        lock(&self.call_log).push(command.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        let rejected =
            self.reject_next.swap(false, Ordering::SeqCst) || lock(&self.reject_at).contains(&index);
        if rejected {
            tracing::debug!("Mock SCPI rejected: {}", command);
            return Ok(false);
        }

        tracing::debug!("Mock SCPI write: {}", command);
        self.apply(command);
        Ok(true)
    }

    async fn query(&self, command: &str) -> Result<Option<String>> {
        lock(&self.call_log).push(command.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        tracing::debug!("Mock SCPI query: {}", command);

        let key = normalize(command);
        if let Some(scripted) = lock(&self.responses).get(&key) {
            return Ok(scripted.clone());
        }
        if key == "*IDN?" {
            return Ok(Some(MOCK_IDN.to_string()));
        }

        let header = key.trim_end_matches('?');
        match lock(&self.settings).get(header) {
            Some(value) => Ok(Some(value.clone())),
            None => anyhow::bail!("Unknown mock query: {}", command),
        }
    }

    fn describe(&self) -> String {
        format!("mock (latency: {}ms)", self.latency.as_millis())
    }
}

fn normalize(header: &str) -> String {
    header.trim().to_ascii_uppercase()
}

// A poisoned mutex only means another test thread panicked mid-update; the data is
// still usable for a mock.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn settings_round_trip_through_queries() {
        let scope = MockTransport::new();
        assert!(scope.send(":CHANnel2:COUPling AC").await.unwrap());
        assert_eq!(
            scope.query(":CHANnel2:COUPling?").await.unwrap().as_deref(),
            Some("AC")
        );
    }

    #[tokio::test]
    async fn compound_lines_apply_every_statement() {
        let scope = MockTransport::new();
        scope
            .send(":MATH:DISPlay ON;:MATH:OPERator FFT")
            .await
            .unwrap();
        assert_eq!(scope.setting(":MATH:DISPlay").as_deref(), Some("ON"));
        assert_eq!(scope.setting(":math:operator").as_deref(), Some("FFT"));
    }

    #[tokio::test]
    async fn failure_is_one_shot() {
        let scope = MockTransport::new();
        scope.trigger_failure();
        assert!(!scope.send(":MATH:DISPlay ON").await.unwrap());
        assert!(scope.send(":MATH:DISPlay ON").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_by_index() {
        let scope = MockTransport::new().reject_send(1);
        assert!(scope.send("A 1").await.unwrap());
        assert!(!scope.send("B 2").await.unwrap());
        assert!(scope.send("C 3").await.unwrap());
        assert_eq!(scope.setting("B"), None);
    }

    #[tokio::test]
    async fn scripted_responses_override_state() {
        let scope = MockTransport::new();
        scope.respond(":CHANnel1:SCALe?", Some("garbage"));
        scope.respond(":MATH:SCALe?", None);
        assert_eq!(
            scope.query(":CHANNEL1:SCALE?").await.unwrap().as_deref(),
            Some("garbage")
        );
        assert_eq!(scope.query(":MATH:SCALe?").await.unwrap(), None);
        assert!(scope.query(":NOPE?").await.is_err());
    }

    #[tokio::test]
    async fn call_log_separates_commands_and_queries() {
        let scope = MockTransport::new();
        scope.send(":CHANnel1:DISPlay ON").await.unwrap();
        scope.query("*IDN?").await.unwrap();
        assert_eq!(scope.get_call_log().len(), 2);
        assert_eq!(scope.sent_commands(), vec![":CHANnel1:DISPlay ON"]);

        scope.clear_call_log();
        assert!(scope.get_call_log().is_empty());
    }

    #[tokio::test]
    async fn concurrent_access_is_safe() {
        let scope = Arc::new(MockTransport::new());
        let mut tasks = vec![];

        for i in 0..10 {
            let scope = Arc::clone(&scope);
            tasks.push(tokio::spawn(async move {
                if i % 3 == 0 {
                    scope.trigger_failure();
                }
                let _ = scope.send(&format!(":CHANnel1:OFFSet {}", i)).await;
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(scope.get_call_log().len(), 10);
    }
}
