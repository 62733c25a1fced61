//! Fall monitor.
//!
//! A spike in linear acceleration marks a possible fall. If the user is still
//! down two seconds later the phone vibrates and a 30 second countdown starts.
//! "I'm OK" cancels it; "send now" triggers immediately; letting it run out
//! triggers automatically.

use std::time::Duration;

use guardian_core::TriggerMethod;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::event::{emit, ClearReason, Detector, DetectorEvent, EventSender, MonitorHandle};
use crate::sensor::{AccelSample, AccelerometerSource};

#[derive(Debug, Clone)]
pub struct FallConfig {
    /// Linear acceleration, in m/s², that counts as an impact.
    pub threshold: f64,
    /// Weight of the previous gravity estimate in the low-pass filter.
    pub gravity_alpha: f64,
    /// Wait after the impact before asking the user.
    pub lying_check_delay: Duration,
    /// How long the user has to answer before the SOS goes out.
    pub countdown: Duration,
    pub alarm_haptic: Duration,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            gravity_alpha: 0.8,
            lying_check_delay: Duration::from_secs(2),
            countdown: Duration::from_secs(30),
            alarm_haptic: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallState {
    Idle,
    PossibleFall,
    ConfirmationPending,
}

/// Fall detection state machine. Timers are driven by the caller.
#[derive(Debug, Clone)]
pub struct FallDetector {
    config: FallConfig,
    state: FallState,
    gravity: Option<[f64; 3]>,
}

impl FallDetector {
    pub fn new(config: FallConfig) -> Self {
        Self {
            config,
            state: FallState::Idle,
            gravity: None,
        }
    }

    pub fn config(&self) -> &FallConfig {
        &self.config
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    /// Magnitude of the sample with the gravity estimate removed.
    ///
    /// The estimate is seeded from the first sample so a phone at rest does
    /// not read as an impact on startup.
    fn linear_magnitude(&mut self, sample: &AccelSample) -> f64 {
        let raw = [sample.x, sample.y, sample.z];
        let alpha = self.config.gravity_alpha;

        let gravity = match self.gravity {
            Some(previous) => {
                std::array::from_fn(|axis| alpha * previous[axis] + (1.0 - alpha) * raw[axis])
            }
            None => raw,
        };
        self.gravity = Some(gravity);

        raw.iter()
            .zip(gravity.iter())
            .map(|(r, g)| (r - g) * (r - g))
            .sum::<f64>()
            .sqrt()
    }

    /// Feed one sample. Returns true when it starts a possible fall.
    pub fn on_sample(&mut self, sample: &AccelSample) -> bool {
        let magnitude = self.linear_magnitude(sample);
        if self.state == FallState::Idle && magnitude > self.config.threshold {
            debug!(acceleration = magnitude, "Possible fall");
            self.state = FallState::PossibleFall;
            return true;
        }
        false
    }

    /// The lying-still check is due. Returns true if the prompt should open.
    pub fn lying_check(&mut self) -> bool {
        if self.state != FallState::PossibleFall {
            return false;
        }
        self.state = FallState::ConfirmationPending;
        true
    }

    /// The user is fine. Returns true if a fall was being tracked.
    pub fn im_ok(&mut self) -> bool {
        let tracking = self.state != FallState::Idle;
        self.state = FallState::Idle;
        tracking
    }

    /// The user asked for help from the prompt.
    pub fn send_now(&mut self) -> Option<TriggerMethod> {
        self.resolve_prompt().then_some(TriggerMethod::Fall)
    }

    /// Nobody answered the prompt.
    pub fn expire(&mut self) -> Option<TriggerMethod> {
        self.resolve_prompt().then_some(TriggerMethod::FallAutomatic)
    }

    fn resolve_prompt(&mut self) -> bool {
        if self.state != FallState::ConfirmationPending {
            return false;
        }
        self.state = FallState::Idle;
        true
    }
}

/// Commands accepted by a running fall monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallCommand {
    ImOk,
    SendNow,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Off,
    LyingCheck,
    Countdown,
}

/// Runs a [`FallDetector`] against an accelerometer subscription.
pub struct FallMonitor {
    detector: FallDetector,
}

impl FallMonitor {
    pub fn new(config: FallConfig) -> Self {
        Self {
            detector: FallDetector::new(config),
        }
    }

    pub fn spawn(
        self,
        source: &dyn AccelerometerSource,
        events: EventSender,
    ) -> Result<MonitorHandle<FallCommand>, MonitorError> {
        let samples = source.subscribe()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(samples, rx, events));
        info!("Fall monitor started");
        Ok(MonitorHandle::new(Detector::Fall, tx, task))
    }

    async fn run(
        mut self,
        mut samples: broadcast::Receiver<AccelSample>,
        mut commands: mpsc::UnboundedReceiver<FallCommand>,
        events: EventSender,
    ) -> Result<(), MonitorError> {
        let timer = sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut pending = Timer::Off;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command.unwrap_or(FallCommand::Stop) {
                        FallCommand::ImOk => {
                            let prompt_open = self.detector.state() == FallState::ConfirmationPending;
                            pending = Timer::Off;
                            if self.detector.im_ok() {
                                info!("User is OK; fall alert cancelled");
                                if prompt_open {
                                    emit(&events, DetectorEvent::ConfirmationCleared {
                                        source: Detector::Fall,
                                        reason: ClearReason::Dismissed,
                                    });
                                }
                            }
                        }
                        FallCommand::SendNow => {
                            if let Some(method) = self.detector.send_now() {
                                pending = Timer::Off;
                                info!("Fall SOS sent by user");
                                if !self.trigger(&events, method, ClearReason::Confirmed) {
                                    return Ok(());
                                }
                            }
                        }
                        FallCommand::Stop => {
                            info!("Fall monitor stopped");
                            return Ok(());
                        }
                    }
                }

                () = &mut timer, if pending != Timer::Off => {
                    match std::mem::replace(&mut pending, Timer::Off) {
                        Timer::LyingCheck => {
                            if self.detector.lying_check() {
                                let countdown = self.detector.config().countdown;
                                info!(countdown_secs = countdown.as_secs(), "Fall confirmed; awaiting response");
                                timer.as_mut().reset(Instant::now() + countdown);
                                pending = Timer::Countdown;
                                emit(&events, DetectorEvent::Haptic {
                                    source: Detector::Fall,
                                    duration: self.detector.config().alarm_haptic,
                                });
                                emit(&events, DetectorEvent::ConfirmationRequested {
                                    source: Detector::Fall,
                                    timeout: countdown,
                                });
                            }
                        }
                        Timer::Countdown => {
                            if let Some(method) = self.detector.expire() {
                                warn!("No response to fall prompt; sending SOS");
                                if !self.trigger(&events, method, ClearReason::TimedOut) {
                                    return Ok(());
                                }
                            }
                        }
                        Timer::Off => {}
                    }
                }

                sample = samples.recv() => match sample {
                    Ok(sample) => {
                        if self.detector.on_sample(&sample) {
                            timer
                                .as_mut()
                                .reset(Instant::now() + self.detector.config().lying_check_delay);
                            pending = Timer::LyingCheck;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Fall monitor lagging; samples dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Accelerometer stream closed; fall monitor stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn trigger(&self, events: &EventSender, method: TriggerMethod, reason: ClearReason) -> bool {
        emit(
            events,
            DetectorEvent::ConfirmationCleared {
                source: Detector::Fall,
                reason,
            },
        );
        emit(
            events,
            DetectorEvent::Trigger {
                method,
                utterance: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impact() -> AccelSample {
        AccelSample::new(35.0, -20.0, 40.0)
    }

    #[test]
    fn test_resting_phone_is_not_a_fall() {
        let mut detector = FallDetector::new(FallConfig::default());
        for _ in 0..50 {
            assert!(!detector.on_sample(&AccelSample::at_rest()));
        }
        assert_eq!(detector.state(), FallState::Idle);
    }

    #[test]
    fn test_impact_after_rest_is_possible_fall() {
        let mut detector = FallDetector::new(FallConfig::default());
        detector.on_sample(&AccelSample::at_rest());
        assert!(detector.on_sample(&impact()));
        assert_eq!(detector.state(), FallState::PossibleFall);

        // A second spike does not restart tracking.
        assert!(!detector.on_sample(&impact()));
    }

    #[test]
    fn test_expiry_and_send_now_trigger_differently() {
        let mut detector = FallDetector::new(FallConfig::default());
        detector.on_sample(&AccelSample::at_rest());
        detector.on_sample(&impact());
        assert!(detector.lying_check());
        assert_eq!(detector.expire(), Some(TriggerMethod::FallAutomatic));
        assert_eq!(detector.state(), FallState::Idle);

        detector.on_sample(&AccelSample::at_rest());
        detector.on_sample(&impact());
        assert!(detector.lying_check());
        assert_eq!(detector.send_now(), Some(TriggerMethod::Fall));
        assert_eq!(detector.expire(), None);
    }

    #[test]
    fn test_im_ok_before_check_skips_prompt() {
        let mut detector = FallDetector::new(FallConfig::default());
        detector.on_sample(&AccelSample::at_rest());
        detector.on_sample(&impact());
        assert!(detector.im_ok());
        assert!(!detector.lying_check());
        assert_eq!(detector.send_now(), None);
    }
}
