// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::device::Device;
use crate::{Error, Result};
use gpiomon_uapi::v2 as uapi;
use gpiomon_uapi::Offset;
use log::{debug, error, trace};
use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long the loop waits for an event before re-checking its state.
///
/// This bounds how long a stop request can go unobserved, without having to
/// force the line descriptor closed under a blocked read.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The level of each monitored line, keyed by offset, as resolved after an
/// edge event.
pub type LineLevels = HashMap<Offset, bool>;

/// A source of edge events and line levels for the monitor loop.
///
/// The production source is an acquired [`Lines`] handle; tests inject
/// scripted sources.
///
/// [`Lines`]: crate::device::Lines
pub trait EdgeSource: Send {
    /// Wait for an edge event to become readable.
    ///
    /// Returns false if the timeout expires with no event available.
    fn wait_event(&mut self, timeout: Duration) -> Result<bool>;

    /// Read the next edge event.
    fn read_event(&mut self) -> Result<uapi::EdgeEvent>;

    /// Resolve the current level of every monitored line.
    fn line_values(&mut self) -> Result<LineLevels>;
}

/// The internal bias applied to monitored lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum Bias {
    /// The lines have pull-up bias enabled.
    PullUp,

    /// The lines have pull-down bias enabled.
    PullDown,
}

/// The edges the kernel reports for monitored lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum EdgeDetection {
    /// Detect rising (*inactive* to *active*) edges.
    RisingEdge,

    /// Detect falling (*active* to *inactive*) edges.
    FallingEdge,

    /// Detect both rising and falling edges.
    BothEdges,
}

/// Settings for a [`Monitor`] over a set of lines on one chip.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct MonitorConfig {
    /// The path of the GPIO character device.
    pub path: PathBuf,

    /// The lines to monitor, identified by offset.
    pub lines: Vec<Offset>,

    /// The consumer label attached to the line reservation.
    pub consumer: String,

    /// The bias applied to the lines, if any.
    pub bias: Option<Bias>,

    /// The edges to detect.
    pub edges: EdgeDetection,

    /// A kernel-side debounce period applied to all monitored lines.
    pub debounce: Option<Duration>,

    /// A suggested minimum kernel event buffer size, in events.
    ///
    /// Zero leaves the kernel default in place.
    pub event_buffer_size: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            path: PathBuf::from("/dev/gpiochip0"),
            lines: Vec::new(),
            consumer: "gpiomon".into(),
            bias: None,
            edges: EdgeDetection::BothEdges,
            debounce: None,
            event_buffer_size: 0,
        }
    }
}

impl MonitorConfig {
    /// Build the line config the request embeds.
    ///
    /// Constructed fresh for every enable, as the config is consumed by the
    /// acquire call.
    fn line_config(&self) -> std::result::Result<uapi::LineConfig, gpiomon_uapi::Error> {
        let mut lc = uapi::LineConfig::default();
        lc.enable_input();
        match self.bias {
            Some(Bias::PullUp) => lc.enable_pull_up(),
            Some(Bias::PullDown) => lc.enable_pull_down(),
            None => (),
        }
        match self.edges {
            EdgeDetection::RisingEdge => lc.enable_rising_edge(),
            EdgeDetection::FallingEdge => lc.enable_falling_edge(),
            EdgeDetection::BothEdges => {
                lc.enable_rising_edge();
                lc.enable_falling_edge();
            }
        }
        if let Some(period) = self.debounce {
            // the wire field is 32-bit microseconds; longer periods must
            // fail rather than wrap
            let period_us = u32::try_from(period.as_micros()).map_err(|_| {
                gpiomon_uapi::Error::Validation {
                    field: "debounce period",
                    msg: format!("{:?} exceeds the 32-bit microsecond field", period),
                }
            })?;
            lc.add_debounce(uapi::lines_mask(self.lines.len()), period_us)?;
        }
        Ok(lc)
    }
}

type Trigger = Box<dyn Fn(&LineLevels) + Send + 'static>;
type SourceFn = Box<dyn Fn() -> Result<Box<dyn EdgeSource>> + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Idle,
    Running,
    Stopping,
}

struct Shared {
    state: Mutex<State>,
    trigger: Mutex<Option<Trigger>>,
}

/// Runs a background loop reading edge events from an [`EdgeSource`] and
/// delivering resolved line levels to a trigger callback.
///
/// At most one loop runs at a time. Stopping is cooperative: the loop
/// observes a stop request between bounded event waits, so `disable` never
/// blocks the caller and takes effect within one poll interval.
pub struct Monitor {
    shared: Arc<Shared>,
    open: SourceFn,
    thread: Option<thread::JoinHandle<()>>,
}

impl Monitor {
    /// Create a monitor that acquires its lines per `config` on each enable.
    ///
    /// The device is opened, the lines acquired and the device released
    /// again inside [`enable`]; only the line handle is held by the loop.
    ///
    /// [`enable`]: #method.enable
    pub fn new(config: MonitorConfig) -> Monitor {
        Monitor::with_source(move || {
            let device = Device::open(&config.path)?;
            let lines = device.acquire_lines(
                &config.consumer,
                &config.lines,
                config.line_config().map_err(Error::Config)?,
                config.event_buffer_size,
            )?;
            // device drops here; the line handle outlives it
            Ok(Box::new(lines) as Box<dyn EdgeSource>)
        })
    }

    /// Create a monitor over an arbitrary edge source.
    pub fn with_source<F>(open: F) -> Monitor
    where
        F: Fn() -> Result<Box<dyn EdgeSource>> + Send + Sync + 'static,
    {
        Monitor {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Idle),
                trigger: Mutex::new(None),
            }),
            open: Box::new(open),
            thread: None,
        }
    }

    /// Register the trigger callback invoked on every edge event.
    ///
    /// Replaces any previous callback; the replacement takes effect on the
    /// next event.
    pub fn set_trigger<F>(&self, trigger: F)
    where
        F: Fn(&LineLevels) + Send + 'static,
    {
        *self.shared.trigger.lock() = Some(Box::new(trigger));
    }

    /// Start the monitor loop.
    ///
    /// A no-op while the loop is running; while it is stopping, the pending
    /// stop is cancelled instead of starting a second loop. From idle, the
    /// source is opened and the loop thread spawned - open failures surface
    /// here and leave the monitor idle.
    pub fn enable(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            State::Running | State::Stopping => {
                if self.thread.as_ref().map_or(true, |h| h.is_finished()) {
                    // active state but no loop behind it; see Error::AlreadyActive
                    return Err(Error::AlreadyActive);
                }
                *state = State::Running;
                Ok(())
            }
            State::Idle => {
                // reap the previous loop thread, if any
                if let Some(handle) = self.thread.take() {
                    let _ = handle.join();
                }
                let mut source = (self.open)()?;
                let shared = Arc::clone(&self.shared);
                let handle = thread::Builder::new()
                    .name("gpio-monitor".into())
                    .spawn(move || run(&shared, source.as_mut()))?;
                *state = State::Running;
                self.thread = Some(handle);
                Ok(())
            }
        }
    }

    /// Request the monitor loop to stop.
    ///
    /// Cooperative and non-blocking; a no-op when idle. The loop observes
    /// the request within one poll interval, releases the line handle and
    /// returns to idle.
    pub fn disable(&mut self) {
        let mut state = self.shared.state.lock();
        if *state == State::Idle {
            return;
        }
        if self.thread.as_ref().map_or(true, |h| h.is_finished()) {
            // the loop is already gone; nothing left to wind down
            *state = State::Idle;
            return;
        }
        *state = State::Stopping;
    }

    /// Whether the monitor loop is active (running or still stopping).
    pub fn is_enabled(&self) -> bool {
        *self.shared.state.lock() != State::Idle
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.disable();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: &Shared, source: &mut dyn EdgeSource) {
    debug!("edge monitor started");
    loop {
        {
            let mut state = shared.state.lock();
            match *state {
                State::Running => (),
                State::Stopping | State::Idle => {
                    // the transition to idle happens under the same lock the
                    // stop was requested under, so a cancelled stop is never
                    // overwritten
                    *state = State::Idle;
                    break;
                }
            }
        }
        if let Err(e) = poll_once(shared, source) {
            error!("edge monitor terminated: {}", e);
            *shared.state.lock() = State::Idle;
            break;
        }
    }
    debug!("edge monitor stopped");
}

// One bounded wait and, if an event arrived, one read/resolve/trigger pass.
//
// Any failure here is fatal to the loop; retrying a broken handle would
// just spin.
fn poll_once(shared: &Shared, source: &mut dyn EdgeSource) -> Result<()> {
    if !source.wait_event(EVENT_POLL_INTERVAL)? {
        return Ok(());
    }
    let event = source.read_event()?;
    trace!("edge event {:?} on line {}", event.kind, event.offset);
    let levels = source.line_values()?;
    // the callback runs with the trigger slot unlocked, so it may install
    // a replacement; the taken callback is only put back if the slot is
    // still empty
    let trigger = shared.trigger.lock().take();
    if let Some(trigger) = trigger {
        trigger(&levels);
        let mut slot = shared.trigger.lock();
        if slot.is_none() {
            *slot = Some(trigger);
        }
    }
    Ok(())
}
