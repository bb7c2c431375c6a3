//! Client side of the pipeline.
//!
//! [`PipelineHandle`] is created once via [`PipelineHandle::start`] (or the
//! builder) and shared as `Arc<PipelineHandle>`. Every method is a message
//! to the coordinator task followed by a reply on a oneshot channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use towebp_codec::Codec;
use towebp_core::format::{validate_quality, EncodeParams};
use towebp_core::report::{AdmissionReport, CompletedResult, ProgressSnapshot, RunSnapshot};
use towebp_core::task::SourceFile;
use towebp_core::types::{Generation, TaskId};
use towebp_events::{BatchEvent, EventBus};

use crate::archive::build_zip;
use crate::config::PipelineConfig;
use crate::coordinator::{Command, Coordinator, SettingsOutcome};
use crate::error::PipelineError;

/// How long [`PipelineHandle::shutdown`] waits for the coordinator to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and starts a pipeline.
pub struct PipelineBuilder {
    config: PipelineConfig,
    codec: Arc<dyn Codec>,
    fallback_codec: Option<Arc<dyn Codec>>,
    bus: Option<Arc<EventBus>>,
}

impl PipelineBuilder {
    /// Codec used by the fallback path. Defaults to the pool codec.
    pub fn fallback_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.fallback_codec = Some(codec);
        self
    }

    /// Publish on an existing bus instead of a private one.
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Spawn the coordinator and its executor pool on the current runtime.
    pub fn start(self) -> Arc<PipelineHandle> {
        let bus = self.bus.unwrap_or_default();
        let fallback_codec = self
            .fallback_codec
            .unwrap_or_else(|| Arc::clone(&self.codec));
        let cancel = CancellationToken::new();
        let pool_size = self.config.pool_size;

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer);
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator::new(
            self.config,
            self.codec,
            fallback_codec,
            Arc::clone(&bus),
            cancel.clone(),
            reply_tx,
        );
        let task = tokio::spawn(coordinator.run(command_rx, reply_rx));

        Arc::new(PipelineHandle {
            commands: command_tx,
            bus,
            cancel,
            pool_size,
            coordinator: Mutex::new(Some(task)),
        })
    }
}

// ---------------------------------------------------------------------------
// PipelineHandle
// ---------------------------------------------------------------------------

pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
    bus: Arc<EventBus>,
    /// Master cancellation token; cancelled during shutdown.
    cancel: CancellationToken,
    pool_size: usize,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineHandle {
    /// Start a pipeline with default options.
    pub fn start(config: PipelineConfig, codec: Arc<dyn Codec>) -> Arc<Self> {
        Self::builder(config, codec).start()
    }

    pub fn builder(config: PipelineConfig, codec: Arc<dyn Codec>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            codec,
            fallback_codec: None,
            bus: None,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Subscribe to pipeline events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.bus.subscribe()
    }

    /// Append a batch of inputs to the session.
    pub async fn admit(&self, files: Vec<SourceFile>) -> Result<AdmissionReport, PipelineError> {
        self.request(|reply| Command::Admit { files, reply }).await
    }

    /// Re-run every archived input, optionally with new parameters.
    ///
    /// Returns the generation of the new run.
    pub async fn reprocess(&self, params: Option<EncodeParams>) -> Result<Generation, PipelineError> {
        if let Some(params) = &params {
            validate_quality(params.quality)?;
        }
        self.request(|reply| Command::Reprocess { params, reply }).await
    }

    /// Store new parameters; reprocesses if they changed and inputs exist.
    pub async fn update_settings(
        &self,
        params: EncodeParams,
    ) -> Result<SettingsOutcome, PipelineError> {
        validate_quality(params.quality)?;
        self.request(|reply| Command::UpdateSettings { params, reply })
            .await
    }

    /// Tear down the run and forget every input.
    pub async fn clear(&self) -> Result<Generation, PipelineError> {
        self.request(|reply| Command::Clear { reply }).await
    }

    pub async fn progress(&self) -> Result<ProgressSnapshot, PipelineError> {
        self.request(|reply| Command::Progress { reply }).await
    }

    pub async fn snapshot(&self) -> Result<RunSnapshot, PipelineError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Completed outputs of the current run in original submission order.
    pub async fn results(&self) -> Result<Vec<CompletedResult>, PipelineError> {
        self.request(|reply| Command::Results { reply }).await
    }

    pub async fn result(&self, task_id: TaskId) -> Result<Option<CompletedResult>, PipelineError> {
        self.request(|reply| Command::Output { task_id, reply })
            .await
    }

    /// Resolve once nothing is pending, queued or in flight.
    pub async fn wait_idle(&self) -> Result<ProgressSnapshot, PipelineError> {
        self.request(|reply| Command::WaitIdle { reply }).await
    }

    /// Zip every completed output of the current run.
    pub async fn export_archive(&self) -> Result<Vec<u8>, PipelineError> {
        let results = self.results().await?;
        let bytes = tokio::task::spawn_blocking(move || build_zip(&results))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        Ok(bytes)
    }

    /// Stop the coordinator and every worker.
    ///
    /// Waits up to 5 seconds for the coordinator to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down pipeline");
        self.cancel.cancel();

        if let Some(task) = self.coordinator.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Pipeline coordinator did not stop in time");
            }
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| PipelineError::Closed)?;
        rx.await.map_err(|_| PipelineError::Closed)
    }
}
