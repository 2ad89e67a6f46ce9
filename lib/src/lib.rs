// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Motion-activated display control over the Linux GPIO character device.
//!
//! The [`device`] module provides scoped access to a gpiochip and acquires
//! edge-monitored line handles from it.
//!
//! The [`monitor`] module runs a background loop over an acquired handle and
//! delivers line levels to a trigger callback on every edge event.
//!
//! The [`sensor`] module turns those triggers into display on/off actions
//! with a debounce delay, against any backend implementing [`Display`].
//!
//! [`device`]: module@device
//! [`monitor`]: module@monitor
//! [`sensor`]: module@sensor
//! [`Display`]: trait@sensor::Display

use std::fmt;
use std::io;
use std::path::PathBuf;

pub use gpiomon_uapi as uapi;

/// Types and functions specific to the gpiochip device and line handles.
pub mod device;

/// The edge-event monitor loop and its state machine.
pub mod monitor;

/// The motion sensor debounce policy and the display capability it drives.
pub mod sensor;

pub use device::{Device, Lines};
pub use monitor::{Bias, EdgeDetection, EdgeSource, LineLevels, Monitor, MonitorConfig};
pub use sensor::{Display, MotionSensor, SensorConfig};
pub use uapi::Offset;

/// Errors returned by [`gpiomon`] functions.
///
/// [`gpiomon`]: crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The GPIO character device could not be opened.
    #[error("failed to open {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An error returned from an underlying uAPI call.
    #[error("uAPI {0} returned: {1}")]
    Uapi(UapiCall, #[source] uapi::Error),

    /// The line configuration could not be built.
    #[error("invalid line configuration: {0}")]
    Config(#[source] uapi::Error),

    /// The monitor state is active but its loop thread is gone.
    ///
    /// Only seen if the loop terminated abnormally, e.g. through a panicking
    /// trigger callback. Disabling the monitor recovers it to idle.
    #[error("monitor is already active")]
    AlreadyActive,

    /// An error returned from an underlying os call.
    #[error(transparent)]
    Os(#[from] io::Error),
}

/// Identifiers for the underlying uAPI calls.
#[doc(hidden)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UapiCall {
    GetLine,
    GetLineValues,
    ReadEvent,
    WaitEvent,
}

impl fmt::Display for UapiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UapiCall::GetLine => "get_line",
            UapiCall::GetLineValues => "get_line_values",
            UapiCall::ReadEvent => "read_edge_event",
            UapiCall::WaitEvent => "wait_event",
        };
        write!(f, "{}", name)
    }
}

/// The result for [`gpiomon`] functions.
///
/// [`gpiomon`]: crate
pub type Result<T> = std::result::Result<T, Error>;
