//! Shake gesture monitor.
//!
//! Three hard shakes inside a three second window open a confirmation prompt.
//! Confirming triggers an SOS; cancelling or ignoring the prompt for ten
//! seconds returns to idle without one.

use std::time::Duration;

use guardian_core::TriggerMethod;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::event::{emit, ClearReason, Detector, DetectorEvent, EventSender, MonitorHandle};
use crate::sensor::{AccelSample, AccelerometerSource, STANDARD_GRAVITY};

#[derive(Debug, Clone)]
pub struct ShakeConfig {
    /// Acceleration above gravity, in m/s², that counts as a shake.
    pub threshold: f64,
    /// Shakes closer together than this count once.
    pub min_interval: Duration,
    /// All required shakes must fall within this window.
    pub window: Duration,
    pub required_shakes: u32,
    pub confirmation_timeout: Duration,
    pub shake_haptic: Duration,
    pub prompt_haptic: Duration,
    pub trigger_haptic: Duration,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            min_interval: Duration::from_millis(500),
            window: Duration::from_millis(3000),
            required_shakes: 3,
            confirmation_timeout: Duration::from_secs(10),
            shake_haptic: Duration::from_millis(100),
            prompt_haptic: Duration::from_millis(500),
            trigger_haptic: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeState {
    Idle,
    Counting { count: u32 },
    ConfirmationPending,
}

/// Result of feeding one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeUpdate {
    /// A shake was counted.
    Shake { count: u32 },
    /// The required count was reached; a prompt should open.
    ConfirmationRequested,
}

/// Shake counting state machine. Time is passed in by the caller.
#[derive(Debug, Clone)]
pub struct ShakeDetector {
    config: ShakeConfig,
    count: u32,
    first_shake: Option<Instant>,
    last_shake: Option<Instant>,
    pending: bool,
}

impl ShakeDetector {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            count: 0,
            first_shake: None,
            last_shake: None,
            pending: false,
        }
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    pub fn state(&self) -> ShakeState {
        if self.pending {
            ShakeState::ConfirmationPending
        } else if self.count > 0 {
            ShakeState::Counting { count: self.count }
        } else {
            ShakeState::Idle
        }
    }

    /// Feed one sample taken at `now`. Samples are ignored while a prompt is open.
    pub fn on_sample(&mut self, sample: &AccelSample, now: Instant) -> Option<ShakeUpdate> {
        if self.pending {
            return None;
        }

        let acceleration = sample.magnitude() - STANDARD_GRAVITY;

        if acceleration <= self.config.threshold {
            if let Some(last) = self.last_shake {
                if now.duration_since(last) > self.config.window {
                    self.count = 0;
                    self.first_shake = None;
                }
            }
            return None;
        }

        if let Some(last) = self.last_shake {
            if now.duration_since(last) <= self.config.min_interval {
                return None;
            }
        }

        let first = match self.first_shake {
            Some(first) if self.count > 0 => first,
            _ => {
                self.first_shake = Some(now);
                now
            }
        };
        self.count += 1;
        self.last_shake = Some(now);

        if self.count >= self.config.required_shakes {
            if now.duration_since(first) <= self.config.window {
                self.pending = true;
                return Some(ShakeUpdate::ConfirmationRequested);
            }
            // Too slow; this shake starts a new sequence.
            self.count = 1;
            self.first_shake = Some(now);
        }

        Some(ShakeUpdate::Shake { count: self.count })
    }

    /// Confirm the open prompt. Returns true if there was one.
    pub fn confirm(&mut self) -> bool {
        self.settle()
    }

    /// Dismiss the open prompt. Returns true if there was one.
    pub fn cancel(&mut self) -> bool {
        self.settle()
    }

    /// The prompt timed out. Returns true if it was still open.
    pub fn expire(&mut self) -> bool {
        self.settle()
    }

    fn settle(&mut self) -> bool {
        let was_pending = self.pending;
        self.pending = false;
        self.count = 0;
        self.first_shake = None;
        self.last_shake = None;
        was_pending
    }
}

/// Commands accepted by a running shake monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShakeCommand {
    Confirm,
    Cancel,
    Stop,
}

/// Runs a [`ShakeDetector`] against an accelerometer subscription.
pub struct ShakeMonitor {
    detector: ShakeDetector,
}

impl ShakeMonitor {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            detector: ShakeDetector::new(config),
        }
    }

    /// Subscribe to `source` and start monitoring.
    pub fn spawn(
        self,
        source: &dyn AccelerometerSource,
        events: EventSender,
    ) -> Result<MonitorHandle<ShakeCommand>, MonitorError> {
        let samples = source.subscribe()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(samples, rx, events));
        info!("Shake monitor started");
        Ok(MonitorHandle::new(Detector::Shake, tx, task))
    }

    async fn run(
        mut self,
        mut samples: broadcast::Receiver<AccelSample>,
        mut commands: mpsc::UnboundedReceiver<ShakeCommand>,
        events: EventSender,
    ) -> Result<(), MonitorError> {
        let timeout = self.detector.config().confirmation_timeout;
        let deadline = sleep(timeout);
        tokio::pin!(deadline);
        let mut armed = false;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let command = command.unwrap_or(ShakeCommand::Stop);
                    match command {
                        ShakeCommand::Confirm => {
                            armed = false;
                            if self.detector.confirm() {
                                info!("Shake alert confirmed");
                                emit(&events, DetectorEvent::ConfirmationCleared {
                                    source: Detector::Shake,
                                    reason: ClearReason::Confirmed,
                                });
                                self.haptic(&events, self.detector.config().trigger_haptic);
                                if !emit(&events, DetectorEvent::Trigger {
                                    method: TriggerMethod::Shake,
                                    utterance: None,
                                }) {
                                    return Ok(());
                                }
                            }
                        }
                        ShakeCommand::Cancel => {
                            armed = false;
                            if self.detector.cancel() {
                                info!("Shake alert cancelled");
                                emit(&events, DetectorEvent::ConfirmationCleared {
                                    source: Detector::Shake,
                                    reason: ClearReason::Dismissed,
                                });
                            }
                        }
                        ShakeCommand::Stop => {
                            info!("Shake monitor stopped");
                            return Ok(());
                        }
                    }
                }

                () = &mut deadline, if armed => {
                    armed = false;
                    if self.detector.expire() {
                        info!("Shake confirmation timed out");
                        emit(&events, DetectorEvent::ConfirmationCleared {
                            source: Detector::Shake,
                            reason: ClearReason::TimedOut,
                        });
                    }
                }

                sample = samples.recv() => match sample {
                    Ok(sample) => match self.detector.on_sample(&sample, Instant::now()) {
                        Some(ShakeUpdate::Shake { count }) => {
                            debug!(count = count, "Shake detected");
                            self.haptic(&events, self.detector.config().shake_haptic);
                        }
                        Some(ShakeUpdate::ConfirmationRequested) => {
                            info!("Shake sequence complete; awaiting confirmation");
                            deadline.as_mut().reset(Instant::now() + timeout);
                            armed = true;
                            self.haptic(&events, self.detector.config().prompt_haptic);
                            emit(&events, DetectorEvent::ConfirmationRequested {
                                source: Detector::Shake,
                                timeout,
                            });
                        }
                        None => {}
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Shake monitor lagging; samples dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Accelerometer stream closed; shake monitor stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn haptic(&self, events: &EventSender, duration: Duration) {
        emit(
            events,
            DetectorEvent::Haptic {
                source: Detector::Shake,
                duration,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hard_shake() -> AccelSample {
        AccelSample::new(25.0, 18.0, 9.8)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_three_spaced_shakes_request_confirmation() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        let t0 = Instant::now();

        assert_eq!(
            detector.on_sample(&hard_shake(), t0),
            Some(ShakeUpdate::Shake { count: 1 })
        );
        assert_eq!(
            detector.on_sample(&hard_shake(), t0 + ms(600)),
            Some(ShakeUpdate::Shake { count: 2 })
        );
        assert_eq!(
            detector.on_sample(&hard_shake(), t0 + ms(1200)),
            Some(ShakeUpdate::ConfirmationRequested)
        );
        assert_eq!(detector.state(), ShakeState::ConfirmationPending);

        // Further shakes are ignored until the prompt is answered.
        assert_eq!(detector.on_sample(&hard_shake(), t0 + ms(1800)), None);
        assert_eq!(detector.on_sample(&hard_shake(), t0 + ms(2400)), None);
        assert_eq!(detector.state(), ShakeState::ConfirmationPending);
    }

    #[test]
    fn test_shakes_inside_min_interval_count_once() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        let t0 = Instant::now();

        detector.on_sample(&hard_shake(), t0);
        assert_eq!(detector.on_sample(&hard_shake(), t0 + ms(200)), None);
        assert_eq!(detector.on_sample(&hard_shake(), t0 + ms(450)), None);
        assert_eq!(detector.state(), ShakeState::Counting { count: 1 });
    }

    #[test]
    fn test_slow_sequence_restarts_count() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        let t0 = Instant::now();

        detector.on_sample(&hard_shake(), t0);
        detector.on_sample(&hard_shake(), t0 + ms(1600));
        assert_eq!(
            detector.on_sample(&hard_shake(), t0 + ms(3200)),
            Some(ShakeUpdate::Shake { count: 1 })
        );
    }

    #[test]
    fn test_count_decays_after_quiet_window() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        let t0 = Instant::now();

        detector.on_sample(&hard_shake(), t0);
        detector.on_sample(&hard_shake(), t0 + ms(700));
        detector.on_sample(&AccelSample::at_rest(), t0 + ms(3800));
        assert_eq!(detector.state(), ShakeState::Idle);
    }

    #[test]
    fn test_gentle_motion_is_not_a_shake() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        let t0 = Instant::now();
        assert_eq!(
            detector.on_sample(&AccelSample::new(10.0, 10.0, 9.8), t0),
            None
        );
        assert_eq!(detector.state(), ShakeState::Idle);
    }

    #[test]
    fn test_settling_only_reports_an_open_prompt() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        assert!(!detector.cancel());
        assert!(!detector.expire());

        let t0 = Instant::now();
        for i in 0..3 {
            detector.on_sample(&hard_shake(), t0 + ms(600 * i));
        }
        assert!(detector.confirm());
        assert!(!detector.expire());
        assert_eq!(detector.state(), ShakeState::Idle);
    }
}
