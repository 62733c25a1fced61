//! Voice distress monitor.
//!
//! Keeps a speech recognition session running and triggers as soon as a
//! partial or final result contains a distress phrase. Recognition pauses for
//! a cool-down after each trigger so one utterance fires once.

use std::time::Duration;

use async_trait::async_trait;
use guardian_core::TriggerMethod;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::MonitorError;
use crate::event::{emit, Detector, DetectorEvent, EventSender, MonitorHandle};

/// Phrases that trigger an SOS, matched as lowercase substrings.
pub const DISTRESS_PHRASES: &[&str] = &[
    "help me",
    "help",
    "emergency",
    "sos",
    "danger",
    "i need help",
    "call for help",
    "call police",
    "save me",
    "i'm in danger",
    "i am in danger",
];

/// The first distress phrase contained in `text`, if any.
pub fn match_distress(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    DISTRESS_PHRASES
        .iter()
        .copied()
        .find(|phrase| lower.contains(phrase))
}

/// Recognizer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    #[error("insufficient permissions")]
    Permission,
    #[error("no match")]
    NoMatch,
    #[error("no speech input")]
    SpeechTimeout,
    #[error("recognition service busy")]
    Busy,
    #[error("network error")]
    Network,
    #[error("audio recording error")]
    Audio,
    #[error("{0}")]
    Other(String),
}

/// Output of a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Hypotheses for speech still in progress.
    Partial(Vec<String>),
    /// Hypotheses for a finished utterance.
    Final(Vec<String>),
    /// The speaker stopped; the session has ended.
    EndOfSpeech,
    Error(SpeechError),
}

/// A speech-to-text session the voice monitor can drive.
#[async_trait]
pub trait SpeechRecognizer: Send + 'static {
    /// Begin (or restart) listening.
    async fn start_listening(&mut self) -> Result<(), SpeechError>;

    /// Stop listening until the next [`start_listening`](Self::start_listening).
    async fn stop_listening(&mut self);

    /// Next event from the session. `None` once the recognizer is gone.
    ///
    /// Must be cancel-safe; the monitor polls it alongside its timers.
    async fn next_event(&mut self) -> Option<SpeechEvent>;
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Recognition stays off this long after a trigger.
    pub cooldown: Duration,
    /// Wait before retrying a session that failed to start.
    pub restart_delay: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            restart_delay: Duration::from_millis(500),
        }
    }
}

/// Commands accepted by a running voice monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    Stop,
}

/// Runs a [`SpeechRecognizer`] and watches it for distress phrases.
pub struct VoiceMonitor<R> {
    recognizer: R,
    config: VoiceConfig,
}

impl<R: SpeechRecognizer> VoiceMonitor<R> {
    pub fn new(recognizer: R, config: VoiceConfig) -> Self {
        Self { recognizer, config }
    }

    /// Start the first session and begin monitoring.
    ///
    /// Fails without spawning if the recognizer cannot start.
    pub async fn spawn(
        mut self,
        events: EventSender,
    ) -> Result<MonitorHandle<VoiceCommand>, MonitorError> {
        if let Err(e) = self.recognizer.start_listening().await {
            error!(error = %e, "Voice monitor failed to start");
            return Err(start_error(e));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx, events));
        info!("Voice monitor started");
        Ok(MonitorHandle::new(Detector::Voice, tx, task))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<VoiceCommand>,
        events: EventSender,
    ) -> Result<(), MonitorError> {
        let rearm = sleep(Duration::ZERO);
        tokio::pin!(rearm);
        let mut paused = false;

        loop {
            tokio::select! {
                biased;

                // Stop is the only command; a closed channel means the same.
                _ = commands.recv() => {
                    self.recognizer.stop_listening().await;
                    info!("Voice monitor stopped");
                    return Ok(());
                }

                () = &mut rearm, if paused => {
                    paused = false;
                    debug!("Re-arming speech recognition");
                    if !self.restart().await? {
                        rearm.as_mut().reset(Instant::now() + self.config.restart_delay);
                        paused = true;
                    }
                }

                event = self.recognizer.next_event(), if !paused => {
                    let Some(event) = event else {
                        info!("Speech recognizer closed; voice monitor stopping");
                        return Ok(());
                    };

                    match event {
                        SpeechEvent::Partial(hypotheses) | SpeechEvent::Final(hypotheses) => {
                            let Some((utterance, phrase)) = hypotheses
                                .iter()
                                .find_map(|h| match_distress(h).map(|p| (h.clone(), p)))
                            else {
                                continue;
                            };

                            info!(phrase = phrase, "Distress phrase detected");
                            if !emit(&events, DetectorEvent::Trigger {
                                method: TriggerMethod::Voice,
                                utterance: Some(utterance),
                            }) {
                                self.recognizer.stop_listening().await;
                                return Ok(());
                            }

                            self.recognizer.stop_listening().await;
                            rearm.as_mut().reset(Instant::now() + self.config.cooldown);
                            paused = true;
                        }
                        SpeechEvent::EndOfSpeech => {
                            if !self.restart().await? {
                                rearm.as_mut().reset(Instant::now() + self.config.restart_delay);
                                paused = true;
                            }
                        }
                        SpeechEvent::Error(SpeechError::Permission) => {
                            error!("Speech recognition permission revoked; voice monitor stopping");
                            return Err(MonitorError::PermissionDenied(
                                SpeechError::Permission.to_string(),
                            ));
                        }
                        SpeechEvent::Error(e) => {
                            warn!(error = %e, "Speech recognition error; restarting");
                            if !self.restart().await? {
                                rearm.as_mut().reset(Instant::now() + self.config.restart_delay);
                                paused = true;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Start a new session. Returns false if it should be retried later.
    ///
    /// A permission failure stops the monitor.
    async fn restart(&mut self) -> Result<bool, MonitorError> {
        match self.recognizer.start_listening().await {
            Ok(()) => Ok(true),
            Err(SpeechError::Permission) => {
                error!("Speech recognition permission denied; voice monitor stopping");
                Err(start_error(SpeechError::Permission))
            }
            Err(e) => {
                warn!(error = %e, "Speech recognition failed to restart; retrying");
                Ok(false)
            }
        }
    }
}

fn start_error(e: SpeechError) -> MonitorError {
    match e {
        SpeechError::Permission => MonitorError::PermissionDenied(e.to_string()),
        other => MonitorError::SensorUnavailable(other.to_string()),
    }
}

/// A recognizer fed from a channel of events.
///
/// Useful where transcription happens elsewhere and results arrive as text.
pub struct ChannelRecognizer {
    events: mpsc::UnboundedReceiver<SpeechEvent>,
    listening: bool,
}

impl ChannelRecognizer {
    pub fn new() -> (mpsc::UnboundedSender<SpeechEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                events: rx,
                listening: false,
            },
        )
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }
}

#[async_trait]
impl SpeechRecognizer for ChannelRecognizer {
    async fn start_listening(&mut self) -> Result<(), SpeechError> {
        if !self.listening {
            // Speech that arrived while stopped was never heard.
            let mut dropped = 0usize;
            while self.events.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped = dropped, "Discarded speech received while not listening");
            }
        }
        self.listening = true;
        Ok(())
    }

    async fn stop_listening(&mut self) {
        self.listening = false;
    }

    async fn next_event(&mut self) -> Option<SpeechEvent> {
        self.events.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrases_match_case_insensitively() {
        assert_eq!(match_distress("Please HELP ME now"), Some("help me"));
        assert_eq!(match_distress("I am in DANGER"), Some("danger"));
        assert_eq!(match_distress("send an SOS"), Some("sos"));
    }

    #[test]
    fn test_ordinary_speech_does_not_match() {
        assert_eq!(match_distress("see you at dinner"), None);
        assert_eq!(match_distress(""), None);
    }
}
