//! Evidence recording trait, implementations, and the command queue.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::RecorderError;

/// Trait for the audio/video capture subsystem.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start_audio(&self) -> Result<(), RecorderError>;

    async fn start_video(&self) -> Result<(), RecorderError>;

    /// Stop every capture in progress.
    async fn stop(&self) -> Result<(), RecorderError>;
}

/// A recorder that does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoOpRecorder;

#[async_trait]
impl Recorder for NoOpRecorder {
    async fn start_audio(&self) -> Result<(), RecorderError> {
        Ok(())
    }

    async fn start_video(&self) -> Result<(), RecorderError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), RecorderError> {
        Ok(())
    }
}

/// A recorder that logs each command.
#[derive(Debug, Clone, Default)]
pub struct LoggingRecorder;

#[async_trait]
impl Recorder for LoggingRecorder {
    async fn start_audio(&self) -> Result<(), RecorderError> {
        info!("[recorder] Audio capture started");
        Ok(())
    }

    async fn start_video(&self) -> Result<(), RecorderError> {
        info!("[recorder] Video capture started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RecorderError> {
        info!("[recorder] Capture stopped");
        Ok(())
    }
}

/// A command for the capture subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingCommand {
    StartAudio,
    StartVideo,
    Stop,
}

/// Fire-and-forget access to a [`Recorder`].
///
/// Commands run one at a time in the order they were issued, so a stop never
/// overtakes the start it follows.
#[derive(Debug, Clone)]
pub(crate) struct RecordingQueue {
    tx: mpsc::UnboundedSender<RecordingCommand>,
}

impl RecordingQueue {
    pub(crate) fn spawn(recorder: Arc<dyn Recorder>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RecordingCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let result = match command {
                    RecordingCommand::StartAudio => recorder.start_audio().await,
                    RecordingCommand::StartVideo => recorder.start_video().await,
                    RecordingCommand::Stop => recorder.stop().await,
                };
                if let Err(e) = result {
                    error!(command = ?command, error = %e, "Recording command failed");
                }
            }
            debug!("Recording queue closed");
        });

        Self { tx }
    }

    pub(crate) fn issue(&self, command: RecordingCommand) {
        if self.tx.send(command).is_err() {
            error!(command = ?command, "Recording queue closed; command dropped");
        }
    }
}
