use std::sync::{Arc, Mutex};

use csv_ingest::ingestion::{
    example_source, ApplyOutcome, FileHandle, IngestionContext, IngestionController, IngestionObserver,
    IngestionOptions, IngestionPhase, IngestionSeverity, IngestionState, IngestionStats, Navigation,
    PendingSource,
};
use csv_ingest::{ErrorKind, IngestionError};

fn people() -> FileHandle {
    FileHandle::from_path("tests/fixtures/people.csv").unwrap()
}

fn file(name: &str, text: &str) -> FileHandle {
    FileHandle::new(name, text)
}

fn controller() -> IngestionController {
    IngestionController::new(IngestionOptions::default()).unwrap()
}

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<(Option<String>, IngestionStats)>>,
    failures: Mutex<Vec<(ErrorKind, IngestionSeverity)>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
    advances: Mutex<Vec<usize>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.successes.lock().unwrap().push((ctx.source_name.clone(), stats));
    }

    fn on_failure(&self, _ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.failures.lock().unwrap().push((error.kind(), severity));
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &IngestionError) {
        self.alerts.lock().unwrap().push(severity);
    }

    fn on_advance(&self, _ctx: &IngestionContext, step: usize) {
        self.advances.lock().unwrap().push(step);
    }
}

#[tokio::test]
async fn advance_is_gated_on_ready() {
    let mut c = controller();
    let mut nav = c.subscribe_navigation();

    assert_eq!(c.phase(), IngestionPhase::Idle);
    assert!(!c.can_advance());
    assert!(matches!(c.advance(), Err(IngestionError::AdvanceBlocked)));

    let phase = c.ingest_files(vec![people()]).await.unwrap();
    assert_eq!(phase, IngestionPhase::Ready);
    assert!(c.can_advance());
    assert_eq!(nav.try_recv().unwrap(), Navigation { step: 2, generation: 1 });

    let shared = c.shared_state();
    let matrix = shared.matrix().unwrap();
    assert_eq!(matrix.row_count(), 3);
    let config = shared.transformation_config().unwrap();
    assert_eq!(config.source_file_name, "people.csv");
    assert_eq!(config.column_configuration.len(), 4);

    assert_eq!(c.advance().unwrap(), 2);
    assert_eq!(nav.try_recv().unwrap().step, 2);

    // A new selection closes the gate before anything is parsed.
    c.select_files(vec![file("next.csv", "x,y\n1,2\n")]).unwrap();
    assert_eq!(c.phase(), IngestionPhase::Acquiring);
    assert!(!c.can_advance());
    assert!(shared.current().is_none());
}

#[tokio::test]
async fn zero_or_many_files_fail_without_parsing() {
    let mut c = controller();
    c.ingest_files(vec![people()]).await.unwrap();
    let before = c.generation();

    let err = c.select_files(Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoFileSelected);
    assert_eq!(c.phase(), IngestionPhase::Failed);
    assert_eq!(c.error_message().as_deref(), Some("No files selected"));
    assert!(c.start_parse().is_none());
    assert!(c.shared_state().current().is_none());
    assert!(c.generation() > before);

    let err = c.ingest_files(vec![people(), people()]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MultipleFiles);
    assert_eq!(c.phase(), IngestionPhase::Failed);
    assert!(!c.can_advance());
}

#[tokio::test]
async fn empty_source_does_not_reach_ready() {
    let mut c = controller();
    let mut nav = c.subscribe_navigation();

    let phase = c.ingest_files(vec![file("empty.csv", "")]).await.unwrap();
    assert_eq!(phase, IngestionPhase::Empty);
    assert!(!c.can_advance());
    assert!(c.shared_state().current().is_none());
    assert!(nav.try_recv().is_err());
}

#[tokio::test]
async fn parse_failure_clears_previous_ready_data() {
    let mut c = controller();
    c.ingest_files(vec![people()]).await.unwrap();
    assert!(c.shared_state().current().is_some());

    let bad = FileHandle::from_path("tests/fixtures/bad_quotes.csv").unwrap();
    let err = c.ingest_files(vec![bad]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(c.phase(), IngestionPhase::Failed);
    assert!(!c.can_advance());
    assert!(c.committed().is_none());
    assert!(c.shared_state().current().is_none());
    assert!(c.error_message().unwrap().contains("unterminated quoted field"));
}

#[tokio::test]
async fn stale_completion_is_dropped() {
    let mut c = controller();

    c.select_files(vec![file("old.csv", "old_a,old_b\n1,2\n")]).unwrap();
    let old_job = c.start_parse().unwrap();

    c.select_files(vec![file("new.csv", "new_a;new_b;new_c\n1;2;3\n")]).unwrap();
    let new_job = c.start_parse().unwrap();
    assert!(new_job.generation() > old_job.generation());

    let old_done = tokio::spawn(old_job.run()).await.unwrap();
    let new_done = new_job.run().await;

    // The superseded result arrives first and must not land.
    assert_eq!(c.apply(old_done), ApplyOutcome::Stale);
    assert_eq!(c.phase(), IngestionPhase::Parsing);
    assert!(!c.can_advance());

    assert_eq!(c.apply(new_done), ApplyOutcome::Applied);
    let config = c.shared_state().transformation_config().unwrap();
    assert_eq!(config.source_file_name, "new.csv");
    assert_eq!(config.csv_props.delimiter, ';');
}

#[tokio::test]
async fn late_result_after_ready_is_dropped() {
    let mut c = controller();

    c.select_files(vec![file("slow.csv", "s1,s2\n1,2\n")]).unwrap();
    let slow = c.start_parse().unwrap();

    c.ingest_files(vec![file("fast.csv", "f1,f2\n1,2\n")]).await.unwrap();
    assert_eq!(c.phase(), IngestionPhase::Ready);

    assert_eq!(c.apply(slow.run().await), ApplyOutcome::Stale);
    let config = c.shared_state().transformation_config().unwrap();
    assert_eq!(config.source_file_name, "fast.csv");
}

#[tokio::test]
async fn late_result_after_invalid_selection_is_dropped() {
    let mut c = controller();
    c.select_files(vec![people()]).unwrap();
    let job = c.start_parse().unwrap();

    c.select_files(Vec::new()).unwrap_err();
    assert_eq!(c.apply(job.run().await), ApplyOutcome::Stale);
    assert_eq!(c.phase(), IngestionPhase::Failed);
    assert!(c.shared_state().current().is_none());
}

#[tokio::test]
async fn reselecting_resets_key() {
    let mut c = controller();
    c.ingest_files(vec![people()]).await.unwrap();

    let shared = c.shared_state();
    let before = c.committed().unwrap();
    assert!(shared.set_key(Some("id".to_string())));
    assert_eq!(shared.transformation_config().unwrap().key.as_deref(), Some("id"));

    // The controller sees the key, and the matrix is not copied to record it.
    let after = c.committed().unwrap();
    assert_eq!(after.config.key.as_deref(), Some("id"));
    assert!(Arc::ptr_eq(&before.matrix, &after.matrix));
    assert!(matches!(c.state(), IngestionState::Ready { source_name } if source_name == "people.csv"));

    c.ingest_files(vec![people()]).await.unwrap();
    assert_eq!(shared.transformation_config().unwrap().key, None);

    c.select_files(Vec::new()).unwrap_err();
    assert!(!shared.set_key(Some("id".to_string())));
}

#[tokio::test]
async fn example_source_is_ingested_like_a_file() {
    let opts = IngestionOptions {
        example_csv: Some("team|score\nred|3\n".to_string()),
        ..Default::default()
    };
    let mut c = IngestionController::new(opts).unwrap();

    let phase = c.ingest_example().await.unwrap();
    assert_eq!(phase, IngestionPhase::Ready);
    let config = c.shared_state().transformation_config().unwrap();
    assert_eq!(config.source_file_name, "example.csv");
    assert_eq!(config.csv_props.delimiter, '|');
    assert_eq!(c.status_text(), "Current file: example.csv");

    // Same path as an explicit example source.
    let phase = c.ingest(example_source("a,b\n1,2\n", "bundled.csv")).await.unwrap();
    assert_eq!(phase, IngestionPhase::Ready);
}

#[tokio::test]
async fn missing_example_is_a_config_error() {
    let mut c = controller();
    let err = c.ingest_example().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(c.phase(), IngestionPhase::Idle);
}

#[tokio::test]
async fn observer_sees_success_failure_and_alerts() {
    let obs = Arc::new(RecordingObserver::default());
    let opts = IngestionOptions {
        observer: Some(obs.clone()),
        alert_at_or_above: IngestionSeverity::Error,
        ..Default::default()
    };
    let mut c = IngestionController::new(opts).unwrap();

    c.ingest_files(vec![people()]).await.unwrap();
    c.select_files(Vec::new()).unwrap_err();
    c.ingest_files(vec![file("bad.csv", "\"a\"b,c\n")]).await.unwrap_err();

    let successes = obs.successes.lock().unwrap().clone();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].0.as_deref(), Some("people.csv"));
    assert_eq!(successes[0].1.rows, 3);
    assert_eq!(successes[0].1.columns, 4);

    let failures = obs.failures.lock().unwrap().clone();
    assert_eq!(
        failures,
        vec![
            (ErrorKind::NoFileSelected, IngestionSeverity::Warning),
            (ErrorKind::Parse, IngestionSeverity::Error),
        ]
    );
    // Only the parse failure meets the `Error` threshold.
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Error]);
    assert_eq!(obs.advances.lock().unwrap().clone(), vec![2]);
}

#[test]
fn url_input_errors_do_not_touch_ingestion_state() {
    let mut c = controller();
    c.set_remote_url("https://example.com/data.csv").unwrap();

    let err = c.set_remote_url("definitely not a url").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UrlFormat);
    assert_eq!(c.phase(), IngestionPhase::Idle);
    assert_eq!(
        c.url_input().accepted().map(|u| u.as_str()),
        Some("https://example.com/data.csv")
    );
    assert_eq!(c.url_input().error(), Some("Looks like an invalid URL."));

    c.set_remote_url("https://example.com/other.csv").unwrap();
    assert_eq!(c.url_input().error(), None);
}

#[test]
fn status_text_follows_selection() {
    let mut c = controller();
    assert_eq!(c.status_text(), "No file selected");

    c.select_source(PendingSource::LocalFile {
        name: "people.csv".to_string(),
        content: Vec::new(),
    });
    assert_eq!(c.status_text(), "Current file: people.csv");

    c.set_remote_url("https://example.com/data.csv").unwrap();
    c.select_remote().unwrap();
    assert_eq!(c.status_text(), "Input selected");

    // Still a remote source once parsing has started.
    let job = c.start_parse().unwrap();
    assert_eq!(c.phase(), IngestionPhase::Parsing);
    assert_eq!(c.status_text(), "Input selected");
    drop(job);

    c.select_files(vec![file("local.csv", "a,b\n")]).unwrap();
    assert_eq!(c.status_text(), "Current file: local.csv");
}
