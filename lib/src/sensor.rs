// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::monitor::{Bias, EdgeDetection, LineLevels, Monitor, MonitorConfig};
use crate::Result;
use gpiomon_uapi::Offset;
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A display the sensor can switch on and off.
///
/// Implementations are shared with the timer thread, so they must be
/// internally synchronised.
pub trait Display: Send + Sync {
    /// Whether the display is currently off.
    fn is_off(&self) -> bool;

    /// Switch the display on.
    fn on(&self);

    /// Switch the display off.
    fn off(&self);
}

/// Settings for a [`MotionSensor`] over a single sensor line.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct SensorConfig {
    /// The path of the GPIO character device the sensor is wired to.
    pub device: PathBuf,

    /// The offset of the sensor line.
    pub line: Offset,

    /// How long the line must stay quiet before the display is switched off.
    pub delay: Duration,

    /// The consumer label attached to the line reservation.
    pub consumer: String,

    /// A kernel-side debounce period for the sensor line.
    pub debounce: Option<Duration>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            device: PathBuf::from("/dev/gpiochip0"),
            line: 18,
            delay: Duration::from_secs(60),
            consumer: "kiosk".into(),
            debounce: None,
        }
    }
}

type TimerToken = Arc<(Mutex<bool>, Condvar)>;

/// A cancellable one-shot timer.
///
/// Runs its action on a dedicated thread once the delay elapses, unless
/// cancelled first. Cancellation is idempotent and wakes the thread
/// immediately rather than leaving it parked for the remaining delay.
struct OffTimer {
    cancelled: TimerToken,
}

impl OffTimer {
    fn new() -> OffTimer {
        OffTimer {
            cancelled: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// An identity token for checking whether this timer still occupies a
    /// slot when its deadline is reached.
    fn token(&self) -> TimerToken {
        Arc::clone(&self.cancelled)
    }

    fn is(&self, token: &TimerToken) -> bool {
        Arc::ptr_eq(&self.cancelled, token)
    }

    fn run<F>(&self, delay: Duration, f: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::clone(&self.cancelled);
        thread::Builder::new()
            .name("display-off-timer".into())
            .spawn(move || {
                let (lock, cv) = &*shared;
                let deadline = Instant::now() + delay;
                let mut cancelled = lock.lock();
                while !*cancelled {
                    if cv.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
                if !*cancelled {
                    drop(cancelled);
                    f();
                }
            })?;
        Ok(())
    }

    fn cancel(&self) {
        let (lock, cv) = &*self.cancelled;
        *lock.lock() = true;
        cv.notify_all();
    }
}

struct Inner {
    display: Box<dyn Display>,
    line: Offset,
    delay: Mutex<Duration>,
    timer: Mutex<Option<OffTimer>>,
}

impl Inner {
    fn on_trigger(inner: &Arc<Inner>, levels: &LineLevels) {
        match levels.get(&inner.line) {
            Some(true) => inner.motion(),
            Some(false) => Inner::quiet(inner),
            // an event for a line this sensor does not watch
            None => (),
        }
    }

    fn motion(&self) {
        self.cancel_timer();
        if self.display.is_off() {
            debug!("motion on line {}, switching display on", self.line);
            self.display.on();
        }
    }

    // The sensor line rests inactive between detections, so a falling edge
    // only means "no motion right now" and the display stays on until the
    // line has been quiet for the full delay.
    //
    // The slot lock is held from before the timer thread starts until the
    // timer is installed, so the expiry action cannot run against a slot
    // that does not yet hold its timer. If the thread cannot be started
    // the previously scheduled timer is left in place.
    fn quiet(inner: &Arc<Inner>) {
        let delay = *inner.delay.lock();
        let timer = OffTimer::new();
        let me = timer.token();
        let expired = Arc::clone(inner);
        let mut slot = inner.timer.lock();
        if let Err(e) = timer.run(delay, move || Inner::expire(&expired, delay, &me)) {
            error!("failed to start off timer: {}", e);
            return;
        }
        if let Some(previous) = slot.replace(timer) {
            previous.cancel();
        }
    }

    // Runs on the timer thread at the deadline. A timer superseded or
    // cancelled after its wait expired no longer occupies the slot and
    // must not act.
    fn expire(inner: &Arc<Inner>, delay: Duration, me: &TimerToken) {
        let mut slot = inner.timer.lock();
        if !slot.as_ref().map_or(false, |current| current.is(me)) {
            return;
        }
        *slot = None;
        drop(slot);
        debug!(
            "line {} quiet for {:?}, switching display off",
            inner.line, delay
        );
        inner.display.off();
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }
}

/// Switches a display on when motion is sensed and off again once the
/// sensor line has been quiet for a configurable delay.
///
/// Motion cancels any pending switch-off, and each quiet period supersedes
/// the previous one, so the display only goes dark a full delay after the
/// last detection.
pub struct MotionSensor {
    monitor: Monitor,
    inner: Arc<Inner>,
}

impl MotionSensor {
    /// Create a sensor over the configured line, driving `display`.
    ///
    /// The line is monitored for both edges with pull-down bias, matching a
    /// PIR-style sensor that drives the line high while motion is detected.
    pub fn new<D>(display: D, config: SensorConfig) -> MotionSensor
    where
        D: Display + 'static,
    {
        let monitor = Monitor::new(MonitorConfig {
            path: config.device,
            lines: vec![config.line],
            consumer: config.consumer,
            bias: Some(Bias::PullDown),
            edges: EdgeDetection::BothEdges,
            debounce: config.debounce,
            event_buffer_size: 0,
        });
        MotionSensor::with_monitor(display, monitor, config.line, config.delay)
    }

    /// Create a sensor over an existing monitor.
    ///
    /// The monitor's trigger is replaced with this sensor's policy.
    pub fn with_monitor<D>(
        display: D,
        monitor: Monitor,
        line: Offset,
        delay: Duration,
    ) -> MotionSensor
    where
        D: Display + 'static,
    {
        let inner = Arc::new(Inner {
            display: Box::new(display),
            line,
            delay: Mutex::new(delay),
            timer: Mutex::new(None),
        });
        let trigger = Arc::clone(&inner);
        monitor.set_trigger(move |levels: &LineLevels| Inner::on_trigger(&trigger, levels));
        MotionSensor { monitor, inner }
    }

    /// Start sensing.
    ///
    /// A no-op if the sensor is already enabled.
    pub fn enable(&mut self) -> Result<()> {
        self.monitor.enable()
    }

    /// Stop sensing and cancel any pending switch-off.
    ///
    /// The display is left in whatever state it was in.
    pub fn disable(&mut self) {
        self.inner.cancel_timer();
        self.monitor.disable();
    }

    /// Whether the sensor is enabled.
    pub fn is_enabled(&self) -> bool {
        self.monitor.is_enabled()
    }

    /// The quiet period before the display is switched off.
    pub fn delay(&self) -> Duration {
        *self.inner.delay.lock()
    }

    /// Change the quiet period.
    ///
    /// Takes effect from the next quiet period; a timer already running
    /// keeps its original delay.
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = delay;
    }
}

impl Drop for MotionSensor {
    fn drop(&mut self) {
        self.inner.cancel_timer();
    }
}
