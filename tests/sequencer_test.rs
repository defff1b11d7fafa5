//! Integration tests for the session sequencer.
//!
//! Drives plans against `MockTransport` with tokio's paused clock so settle
//! delays can be asserted exactly without slowing the suite down.

use ds1000z_scpi::sequencer::FailureReason;
use ds1000z_scpi::{
    BuildContext, BusyPolicy, Catalog, CommandBuilder, ExecutionControl, MathMode, MockTransport,
    ParamValues, ScpiError, SessionEvent, SessionSequencer, SessionState, TransitionPlan,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

fn plan(commands: &[(&str, u64)]) -> TransitionPlan {
    commands
        .iter()
        .fold(TransitionPlan::new("test", None), |p, (cmd, ms)| {
            p.then(*cmd, Duration::from_millis(*ms))
        })
}

async fn wait_until_busy(sequencer: &SessionSequencer) {
    while !sequencer.is_busy() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn second_send_rejected_stops_the_plan() {
    let scope = Arc::new(MockTransport::new().reject_send(1));
    let sequencer = SessionSequencer::new(scope.clone());

    let result = sequencer
        .execute(&plan(&[("CMD0 1", 0), ("CMD1 2", 0), ("CMD2 3", 0)]))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_step(), Some(1));
    assert_eq!(result.state, SessionState::Failed(1));
    assert_eq!(result.sent_commands, vec!["CMD0 1", "CMD1 2"]);
    assert_eq!(
        result.failure.as_ref().map(|f| &f.reason),
        Some(&FailureReason::Rejected)
    );
    // cmd2 never reached the transport
    assert_eq!(scope.sent_commands(), vec!["CMD0 1", "CMD1 2"]);
}

#[tokio::test]
async fn transport_error_counts_as_failed_step() {
    struct Broken;

    #[async_trait::async_trait]
    impl ds1000z_scpi::ScpiTransport for Broken {
        async fn send(&self, _command: &str) -> anyhow::Result<bool> {
            anyhow::bail!("Timeout writing")
        }
        async fn query(&self, _command: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    let sequencer = SessionSequencer::new(Arc::new(Broken));
    let result = sequencer.execute(&plan(&[("A 1", 0)])).await.unwrap();
    assert_eq!(result.failed_step(), Some(0));
    assert!(matches!(
        result.failure.map(|f| f.reason),
        Some(FailureReason::Transport(msg)) if msg.contains("Timeout")
    ));
}

#[tokio::test(start_paused = true)]
async fn mode_switch_honours_settle_delays() {
    let scope = Arc::new(MockTransport::new());
    let sequencer = SessionSequencer::new(scope.clone());
    let catalog = Catalog::ds1000z();

    let plan = CommandBuilder::new(&catalog)
        .build_mode_switch(
            Some(MathMode::BasicOperations),
            MathMode::FFTAnalysis,
            &ParamValues::new().with("window", "HANNing"),
            &BuildContext::default(),
        )
        .unwrap();
    assert_eq!(
        plan.delays(),
        [150, 500, 50, 50, 50, 0].map(Duration::from_millis).to_vec()
    );

    let start = Instant::now();
    let result = sequencer.execute(&plan).await.unwrap();
    let elapsed = start.elapsed();

    assert!(result.success);
    assert!(elapsed >= Duration::from_millis(800), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(810), "{:?}", elapsed);
    assert_eq!(
        scope.sent_commands()[..2],
        [":MATH:DISPlay OFF", ":MATH:DISPlay ON;:MATH:OPERator FFT"]
    );
    assert_eq!(scope.setting(":MATH:OPERator").as_deref(), Some("FFT"));
    assert_eq!(scope.setting(":MATH:FFT:WINDow").as_deref(), Some("HANNing"));
}

#[tokio::test(start_paused = true)]
async fn busy_transport_is_rejected() {
    let scope = Arc::new(MockTransport::new().with_latency(Duration::from_millis(100)));
    let sequencer = SessionSequencer::new(scope.clone());
    assert_eq!(sequencer.policy(), BusyPolicy::Reject);

    let first = tokio::spawn({
        let sequencer = sequencer.clone();
        async move { sequencer.execute(&plan(&[("A 1", 50), ("B 2", 0)])).await }
    });
    wait_until_busy(&sequencer).await;

    assert!(matches!(
        sequencer.execute(&plan(&[("C 3", 0)])).await,
        Err(ScpiError::TransportBusy)
    ));
    assert!(matches!(
        sequencer.query_text(":MATH:DISPlay?").await,
        Err(ScpiError::TransportBusy)
    ));

    assert!(first.await.unwrap().unwrap().success);
    assert_eq!(scope.get_call_log(), vec!["A 1", "B 2"]);
    assert!(!sequencer.is_busy());
}

#[tokio::test(start_paused = true)]
async fn queued_plans_never_interleave() {
    let scope = Arc::new(MockTransport::new().with_latency(Duration::from_millis(10)));
    let sequencer = SessionSequencer::with_policy(scope.clone(), BusyPolicy::Queue);

    let first = tokio::spawn({
        let sequencer = sequencer.clone();
        async move {
            sequencer
                .execute(&plan(&[("A 1", 50), ("B 2", 50), ("C 3", 0)]))
                .await
        }
    });
    wait_until_busy(&sequencer).await;

    let second = sequencer
        .execute(&plan(&[("X 1", 0), ("Y 2", 0)]))
        .await
        .unwrap();
    assert!(second.success);
    assert!(first.await.unwrap().unwrap().success);

    assert_eq!(
        scope.sent_commands(),
        vec!["A 1", "B 2", "C 3", "X 1", "Y 2"]
    );
}

#[tokio::test(start_paused = true)]
async fn separate_transports_run_concurrently() {
    let a = SessionSequencer::new(Arc::new(MockTransport::new()));
    let b = SessionSequencer::new(Arc::new(MockTransport::new()));
    let slow = plan(&[("A 1", 500), ("B 2", 0)]);

    let start = Instant::now();
    let (ra, rb) = tokio::join!(a.execute(&slow), b.execute(&slow));
    assert!(ra.unwrap().success && rb.unwrap().success);
    assert!(start.elapsed() < Duration::from_millis(510));
}

#[tokio::test]
async fn cancellation_before_start_sends_nothing() {
    let scope = Arc::new(MockTransport::new());
    let sequencer = SessionSequencer::new(scope.clone());
    let (_tx, rx) = watch::channel(true);

    let result = sequencer
        .execute_with(
            &plan(&[("A 1", 0), ("B 2", 0)]),
            ExecutionControl::new().with_cancel(rx),
        )
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_step(), Some(0));
    assert!(result.sent_commands.is_empty());
    assert!(scope.get_call_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_takes_effect_between_steps() {
    let scope = Arc::new(MockTransport::new());
    let sequencer = SessionSequencer::new(scope.clone());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

    // Cancel as soon as the first command is confirmed, during its settle delay
    let canceller = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            if matches!(event, SessionEvent::Sent { step: 0, .. }) {
                let _ = cancel_tx.send(true);
            }
        }
    });

    let result = sequencer
        .execute_with(
            &plan(&[("A 1", 100), ("B 2", 0), ("C 3", 0)]),
            ExecutionControl::new()
                .with_progress(progress_tx)
                .with_cancel(cancel_rx),
        )
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(result.sent_commands, vec!["A 1"]);
    let failure = result.failure.unwrap();
    assert_eq!(failure.step, 1);
    assert_eq!(failure.reason, FailureReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn progress_events_trace_the_run() {
    let sequencer = SessionSequencer::new(Arc::new(MockTransport::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    sequencer
        .execute_with(
            &plan(&[("A 1", 150), ("B 2", 0)]),
            ExecutionControl::new().with_progress(tx),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            SessionEvent::Started {
                label: "test".into(),
                steps: 2
            },
            SessionEvent::Sent {
                step: 0,
                command: "A 1".into()
            },
            SessionEvent::Settling {
                step: 0,
                delay: Duration::from_millis(150)
            },
            SessionEvent::Sent {
                step: 1,
                command: "B 2".into()
            },
            SessionEvent::Completed { sent: 2 },
        ]
    );
}

#[tokio::test]
async fn failed_result_maps_to_attributable_error() {
    let scope = Arc::new(MockTransport::new());
    scope.trigger_failure();
    let sequencer = SessionSequencer::new(scope);
    let catalog = Catalog::ds1000z();

    let plan = CommandBuilder::new(&catalog)
        .build(
            ds1000z_scpi::LogicalOperation::SetCoupling,
            &ParamValues::new().with("channel", 2).with("coupling", "AC"),
            &BuildContext::default(),
        )
        .unwrap();
    let err = sequencer
        .execute(&plan)
        .await
        .unwrap()
        .into_result()
        .unwrap_err();

    match err {
        ScpiError::TransportFailure {
            operation,
            step,
            command,
            ..
        } => {
            assert_eq!(operation, "SetCoupling");
            assert_eq!(step, 0);
            assert_eq!(command, ":CHANnel2:COUPling AC");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
