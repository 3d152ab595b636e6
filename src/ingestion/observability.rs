use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ErrorKind, IngestionError};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Recoverable user-input problem (bad selection, bad URL).
    Warning,
    /// Operation failed on the content itself.
    Error,
    /// Failure reading or fetching the source.
    Critical,
}

impl IngestionSeverity {
    /// Severity assigned to a captured error.
    pub fn for_error(e: &IngestionError) -> Self {
        match e.kind() {
            ErrorKind::NoFileSelected | ErrorKind::MultipleFiles | ErrorKind::UrlFormat => Self::Warning,
            ErrorKind::AdvanceBlocked => Self::Info,
            ErrorKind::Parse if e.is_io() => Self::Critical,
            ErrorKind::Parse | ErrorKind::Config => Self::Error,
            ErrorKind::Fetch => Self::Critical,
        }
    }
}

/// Context about an ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionContext {
    /// Display name of the source, when one was accepted.
    pub source_name: Option<String>,
    /// Generation token of the attempt.
    pub generation: u64,
}

/// Minimal stats reported on successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of parsed rows, header included.
    pub rows: usize,
    /// Number of drafted columns.
    pub columns: usize,
    pub delimiter: char,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a parse was committed.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when an attempt fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }

    /// Called when the controller signals navigation to `step`.
    fn on_advance(&self, _ctx: &IngestionContext, _step: usize) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_advance(&self, ctx: &IngestionContext, step: usize) {
        for o in &self.observers {
            o.on_advance(ctx, step);
        }
    }
}

/// Emits ingestion events as `tracing` events under the `csv_ingest` target.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            target: "csv_ingest",
            source = ctx.source_name.as_deref().unwrap_or("-"),
            generation = ctx.generation,
            rows = stats.rows,
            columns = stats.columns,
            delimiter = ?stats.delimiter,
            "ingestion ready"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::warn!(
            target: "csv_ingest",
            source = ctx.source_name.as_deref().unwrap_or("-"),
            generation = ctx.generation,
            ?severity,
            %error,
            "ingestion failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::error!(
            target: "csv_ingest",
            source = ctx.source_name.as_deref().unwrap_or("-"),
            generation = ctx.generation,
            ?severity,
            %error,
            "ingestion alert"
        );
    }

    fn on_advance(&self, ctx: &IngestionContext, step: usize) {
        tracing::info!(target: "csv_ingest", generation = ctx.generation, step, "advancing");
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok gen={} source={} rows={} columns={} delimiter={:?}",
            unix_ts(),
            ctx.generation,
            ctx.source_name.as_deref().unwrap_or("-"),
            stats.rows,
            stats.columns,
            stats.delimiter
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} fail severity={:?} gen={} source={} err={}",
            unix_ts(),
            severity,
            ctx.generation,
            ctx.source_name.as_deref().unwrap_or("-"),
            error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} gen={} source={} err={}",
            unix_ts(),
            severity,
            ctx.generation,
            ctx.source_name.as_deref().unwrap_or("-"),
            error
        ));
    }

    fn on_advance(&self, ctx: &IngestionContext, step: usize) {
        self.append_line(&format!("{} advance gen={} step={step}", unix_ts(), ctx.generation));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
