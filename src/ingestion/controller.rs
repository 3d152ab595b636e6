//! Ingestion controller.
//!
//! Drives one ingestion attempt at a time through
//! `Idle → Acquiring → Parsing → Ready | Empty | Failed` and owns the gate over the next
//! pipeline stage: [`IngestionController::can_advance`] is true only in `Ready`.
//!
//! Every selection bumps a generation counter. Parsing happens in a detached [`ParseJob`]; its
//! [`ParseCompletion`] is applied only if it still carries the current generation, so a late
//! result from a superseded selection can never overwrite newer state.
//!
//! # Examples
//!
//! ```no_run
//! use csv_ingest::ingestion::{FileHandle, IngestionController, IngestionOptions};
//!
//! # async fn run() -> Result<(), csv_ingest::IngestionError> {
//! let mut controller = IngestionController::new(IngestionOptions::default())?;
//! let mut navigation = controller.subscribe_navigation();
//!
//! controller
//!     .ingest_files(vec![FileHandle::from_path("people.csv")?])
//!     .await?;
//!
//! assert!(controller.can_advance());
//! let nav = navigation.recv().await.expect("navigation signal");
//! assert_eq!(nav.step, 2);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{ParseMetadata, ParsedMatrix, TransformationConfigDraft};

use super::csv::{parse_csv_in_background, ParsedCsv};
use super::draft::draft;
use super::fetch::RemoteFetcher;
use super::observability::{IngestionContext, IngestionSeverity, IngestionStats};
use super::options::IngestionOptions;
use super::source::{example_source, select_local_file, FileHandle, PendingSource, UrlInput};

/// Step number of the ingestion step in the surrounding pipeline.
pub const INGESTION_STEP: usize = 1;

/// Result of a successful ingestion, committed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedIngestion {
    pub matrix: Arc<ParsedMatrix>,
    pub config: TransformationConfigDraft,
    pub meta: ParseMetadata,
    /// Generation that produced this commit.
    pub generation: u64,
}

/// Pipeline state shared with the next stage.
///
/// Holds either a complete commit or nothing; readers never observe a matrix without its
/// draft configuration.
#[derive(Clone, Default)]
pub struct SharedPipelineState {
    inner: Arc<RwLock<Option<Arc<CommittedIngestion>>>>,
}

impl SharedPipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current commit, if any.
    pub fn current(&self) -> Option<Arc<CommittedIngestion>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn matrix(&self) -> Option<Arc<ParsedMatrix>> {
        self.current().map(|c| Arc::clone(&c.matrix))
    }

    pub fn transformation_config(&self) -> Option<TransformationConfigDraft> {
        self.current().map(|c| c.config.clone())
    }

    /// Record the primary-key column chosen by a later stage. Returns `false` when nothing is
    /// committed.
    ///
    /// The matrix is shared between the old and new commit; only the draft is copied.
    pub fn set_key(&self, key: Option<String>) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(committed) => {
                Arc::make_mut(committed).config.key = key;
                true
            }
            None => false,
        }
    }

    fn commit(&self, committed: Arc<CommittedIngestion>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(committed);
    }

    fn clear(&self) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl fmt::Debug for SharedPipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current();
        f.debug_struct("SharedPipelineState")
            .field("committed_generation", &current.as_ref().map(|c| c.generation))
            .field("rows", &current.as_ref().map(|c| c.matrix.row_count()))
            .finish()
    }
}

/// Signal asking the caller to move to another pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub step: usize,
    pub generation: u64,
}

/// Controller state.
#[derive(Debug)]
pub enum IngestionState {
    /// No source selected.
    Idle,
    /// A source was accepted and awaits parsing.
    Acquiring { source: PendingSource },
    /// A parse job for the current generation is outstanding.
    Parsing { source_name: String },
    /// Matrix and draft are committed to the shared state; advancing is allowed.
    Ready { source_name: String },
    /// The source parsed to zero rows; nothing was drafted or committed.
    Empty { source_name: String },
    /// The attempt failed. The error is shown until the next selection.
    Failed {
        source_name: Option<String>,
        error: IngestionError,
    },
}

/// Payload-free view of [`IngestionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionPhase {
    Idle,
    Acquiring,
    Parsing,
    Ready,
    Empty,
    Failed,
}

impl IngestionState {
    pub fn phase(&self) -> IngestionPhase {
        match self {
            Self::Idle => IngestionPhase::Idle,
            Self::Acquiring { .. } => IngestionPhase::Acquiring,
            Self::Parsing { .. } => IngestionPhase::Parsing,
            Self::Ready { .. } => IngestionPhase::Ready,
            Self::Empty { .. } => IngestionPhase::Empty,
            Self::Failed { .. } => IngestionPhase::Failed,
        }
    }

    fn source_name(&self) -> Option<String> {
        match self {
            Self::Idle => None,
            Self::Acquiring { source } => Some(source.display_name()),
            Self::Parsing { source_name } | Self::Ready { source_name } | Self::Empty { source_name } => {
                Some(source_name.clone())
            }
            Self::Failed { source_name, .. } => source_name.clone(),
        }
    }
}

/// A detached parse for one generation.
///
/// Running it does not borrow the controller, so a newer selection may happen while it is in
/// flight; the controller then treats its completion as stale.
pub struct ParseJob {
    generation: u64,
    source_name: String,
    source: PendingSource,
    fetcher: RemoteFetcher,
}

impl fmt::Debug for ParseJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseJob")
            .field("generation", &self.generation)
            .field("source_name", &self.source_name)
            .finish()
    }
}

impl ParseJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fetch (for remote sources) and parse off the calling task.
    pub async fn run(self) -> ParseCompletion {
        let result = match self.source {
            PendingSource::LocalFile { content, .. } => parse_csv_in_background(content).await,
            PendingSource::RemoteUrl(url) => fetch_and_parse(&self.fetcher, &url).await,
        };
        ParseCompletion {
            generation: self.generation,
            source_name: self.source_name,
            result,
        }
    }
}

async fn fetch_and_parse(fetcher: &RemoteFetcher, url: &Url) -> IngestionResult<ParsedCsv> {
    let body = fetcher.fetch_bytes(url).await?;
    parse_csv_in_background(body).await
}

/// Outcome of a [`ParseJob`], tagged with its generation.
#[derive(Debug)]
pub struct ParseCompletion {
    pub generation: u64,
    pub source_name: String,
    pub result: IngestionResult<ParsedCsv>,
}

/// What [`IngestionController::apply`] did with a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The completion belonged to the current generation and updated the state.
    Applied,
    /// The completion was superseded and dropped.
    Stale,
}

/// Orchestrates source acquisition, parsing and drafting for the ingestion step.
pub struct IngestionController {
    options: IngestionOptions,
    fetcher: RemoteFetcher,
    state: IngestionState,
    generation: u64,
    /// Whether the current attempt's source is a remote URL.
    remote: bool,
    url_input: UrlInput,
    shared: SharedPipelineState,
    navigation: Option<mpsc::UnboundedSender<Navigation>>,
}

impl fmt::Debug for IngestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionController")
            .field("state", &self.state.phase())
            .field("generation", &self.generation)
            .field("url_input", &self.url_input)
            .field("options", &self.options)
            .finish()
    }
}

impl IngestionController {
    /// Create a controller with its own [`SharedPipelineState`].
    pub fn new(options: IngestionOptions) -> IngestionResult<Self> {
        Self::with_shared_state(options, SharedPipelineState::new())
    }

    /// Create a controller that commits into an existing [`SharedPipelineState`].
    pub fn with_shared_state(options: IngestionOptions, shared: SharedPipelineState) -> IngestionResult<Self> {
        let fetcher = RemoteFetcher::new(options.fetch_timeout(), &options.user_agent)?;
        Ok(Self {
            options,
            fetcher,
            state: IngestionState::Idle,
            generation: 0,
            remote: false,
            url_input: UrlInput::new(),
            shared,
            navigation: None,
        })
    }

    /// Receive navigation signals. Replaces any earlier subscription.
    pub fn subscribe_navigation(&mut self) -> mpsc::UnboundedReceiver<Navigation> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.navigation = Some(tx);
        rx
    }

    pub fn state(&self) -> &IngestionState {
        &self.state
    }

    pub fn phase(&self) -> IngestionPhase {
        self.state.phase()
    }

    /// Current generation token.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shared_state(&self) -> SharedPipelineState {
        self.shared.clone()
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    /// The committed result, when `Ready`. Reads through to the shared state, so a key set
    /// by a later stage is visible here too.
    pub fn committed(&self) -> Option<Arc<CommittedIngestion>> {
        match self.state {
            IngestionState::Ready { .. } => self.shared.current(),
            _ => None,
        }
    }

    /// The recorded error, when `Failed`.
    pub fn error(&self) -> Option<&IngestionError> {
        match &self.state {
            IngestionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Display string for the recorded error, when `Failed`.
    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    /// One-line description of the selected source.
    pub fn status_text(&self) -> String {
        match self.state.source_name() {
            Some(_) if self.remote => "Input selected".to_string(),
            Some(name) => format!("Current file: {name}"),
            None => "No file selected".to_string(),
        }
    }

    /// The single gate over the next pipeline stage.
    pub fn can_advance(&self) -> bool {
        matches!(self.state, IngestionState::Ready { .. })
    }

    /// Signal navigation to the next step. Fails with [`IngestionError::AdvanceBlocked`] outside
    /// `Ready`.
    pub fn advance(&self) -> IngestionResult<usize> {
        if !self.can_advance() {
            return Err(IngestionError::AdvanceBlocked);
        }
        let step = INGESTION_STEP + 1;
        self.signal_navigation(step);
        Ok(step)
    }

    pub fn url_input(&self) -> &UrlInput {
        &self.url_input
    }

    /// Validate and store a URL string. Does not touch the ingestion state.
    pub fn set_remote_url(&mut self, raw: &str) -> IngestionResult<Url> {
        self.url_input.set_remote_url(raw).cloned()
    }

    /// Fetch the accepted URL without parsing it.
    ///
    /// Failures are recorded next to the URL field and returned.
    pub async fn fetch_remote(&mut self) -> IngestionResult<String> {
        self.url_input.clear_error();
        let url = self.accepted_url()?;
        let result = self.fetcher.fetch_remote(&url).await;
        if let Err(e) = &result {
            self.url_input.record_error(e.to_string());
        }
        result
    }

    fn accepted_url(&self) -> IngestionResult<Url> {
        self.url_input.accepted().cloned().ok_or_else(|| IngestionError::UrlFormat {
            input: String::new(),
            message: "No URL entered.".to_string(),
        })
    }

    /// Accept a file-selection event.
    ///
    /// Any previous matrix, draft and error are discarded first. An empty or multi-file event
    /// moves to `Failed` without invoking the parser.
    pub fn select_files(&mut self, handles: Vec<FileHandle>) -> IngestionResult<u64> {
        match select_local_file(handles) {
            Ok(source) => Ok(self.select_source(source)),
            Err(e) => {
                self.begin_attempt();
                self.fail(None, e.clone());
                Err(e)
            }
        }
    }

    /// Select the configured example text as the source.
    pub fn select_example(&mut self) -> IngestionResult<u64> {
        let Some(text) = self.options.example_csv.clone() else {
            return Err(IngestionError::Config {
                message: "no example source configured".to_string(),
            });
        };
        let source = example_source(text, self.options.example_file_name.clone());
        Ok(self.select_source(source))
    }

    /// Select the accepted URL as the source.
    pub fn select_remote(&mut self) -> IngestionResult<u64> {
        self.url_input.clear_error();
        let url = self.accepted_url()?;
        Ok(self.select_source(PendingSource::RemoteUrl(url)))
    }

    /// Make `source` the current source and return the new generation.
    pub fn select_source(&mut self, source: PendingSource) -> u64 {
        self.begin_attempt();
        debug!(generation = self.generation, source = %source.display_name(), "source selected");
        self.remote = matches!(source, PendingSource::RemoteUrl(_));
        self.state = IngestionState::Acquiring { source };
        self.generation
    }

    fn begin_attempt(&mut self) {
        self.generation += 1;
        self.remote = false;
        self.shared.clear();
        self.state = IngestionState::Idle;
    }

    /// Hand out the parse job for the accepted source and move to `Parsing`.
    ///
    /// Returns `None` unless the controller is `Acquiring`.
    pub fn start_parse(&mut self) -> Option<ParseJob> {
        let source = match std::mem::replace(&mut self.state, IngestionState::Idle) {
            IngestionState::Acquiring { source } => source,
            other => {
                self.state = other;
                return None;
            }
        };
        let source_name = source.display_name();
        self.state = IngestionState::Parsing {
            source_name: source_name.clone(),
        };
        Some(ParseJob {
            generation: self.generation,
            source_name,
            source,
            fetcher: self.fetcher.clone(),
        })
    }

    /// Apply a finished parse. Completions from older generations are dropped.
    pub fn apply(&mut self, completion: ParseCompletion) -> ApplyOutcome {
        let current = completion.generation == self.generation
            && matches!(self.state, IngestionState::Parsing { .. });
        if !current {
            debug!(
                stale_generation = completion.generation,
                current_generation = self.generation,
                "dropping stale parse result"
            );
            return ApplyOutcome::Stale;
        }

        let ParseCompletion {
            generation,
            source_name,
            result,
        } = completion;

        match result {
            Ok(parsed) if parsed.matrix.is_empty() => {
                debug!(generation, source = %source_name, "source parsed to zero rows");
                self.state = IngestionState::Empty { source_name };
            }
            Ok(ParsedCsv { matrix, meta }) => {
                let config = draft(&matrix, meta.delimiter, &source_name);
                let stats = IngestionStats {
                    rows: matrix.row_count(),
                    columns: config.column_configuration.len(),
                    delimiter: meta.delimiter,
                };
                self.shared.commit(Arc::new(CommittedIngestion {
                    matrix: Arc::new(matrix),
                    config,
                    meta,
                    generation,
                }));
                self.state = IngestionState::Ready { source_name };
                if let Some(obs) = self.options.observer.as_ref() {
                    obs.on_success(&self.context(), stats);
                }
                self.signal_navigation(INGESTION_STEP + 1);
            }
            Err(e) => {
                if let IngestionError::Fetch { message } = &e {
                    self.url_input.record_error(message.clone());
                }
                self.fail(Some(source_name), e);
            }
        }
        ApplyOutcome::Applied
    }

    /// Select `source`, parse it and apply the result.
    ///
    /// Returns the recorded error when the attempt ends in `Failed`. A zero-row source is not an
    /// error; it ends in `Empty`.
    pub async fn ingest(&mut self, source: PendingSource) -> IngestionResult<IngestionPhase> {
        self.select_source(source);
        self.run_current().await
    }

    /// Accept a file-selection event and ingest it.
    pub async fn ingest_files(&mut self, handles: Vec<FileHandle>) -> IngestionResult<IngestionPhase> {
        self.select_files(handles)?;
        self.run_current().await
    }

    /// Ingest the configured example text.
    pub async fn ingest_example(&mut self) -> IngestionResult<IngestionPhase> {
        self.select_example()?;
        self.run_current().await
    }

    /// Fetch the accepted URL and feed the body through the same parser as local files.
    pub async fn ingest_remote(&mut self) -> IngestionResult<IngestionPhase> {
        self.select_remote()?;
        self.run_current().await
    }

    async fn run_current(&mut self) -> IngestionResult<IngestionPhase> {
        if let Some(job) = self.start_parse() {
            let completion = job.run().await;
            self.apply(completion);
        }
        match self.error() {
            Some(e) => Err(e.clone()),
            None => Ok(self.phase()),
        }
    }

    fn fail(&mut self, source_name: Option<String>, error: IngestionError) {
        if let Some(obs) = self.options.observer.as_ref() {
            let ctx = IngestionContext {
                source_name: source_name.clone(),
                generation: self.generation,
            };
            let sev = IngestionSeverity::for_error(&error);
            obs.on_failure(&ctx, sev, &error);
            if sev >= self.options.alert_at_or_above {
                obs.on_alert(&ctx, sev, &error);
            }
        }
        self.state = IngestionState::Failed { source_name, error };
    }

    fn context(&self) -> IngestionContext {
        IngestionContext {
            source_name: self.state.source_name(),
            generation: self.generation,
        }
    }

    fn signal_navigation(&self, step: usize) {
        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_advance(&self.context(), step);
        }
        if let Some(tx) = &self.navigation {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(Navigation {
                step,
                generation: self.generation,
            });
        }
    }
}
