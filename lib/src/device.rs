// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::monitor::{EdgeSource, LineLevels};
use crate::{Error, Result, UapiCall};
use gpiomon_uapi::v2 as uapi;
use gpiomon_uapi::Offset;
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A GPIO character device.
///
/// The device descriptor is a scoped resource: it is held open only as long
/// as the `Device` itself and is released when the `Device` drops, on every
/// exit path. Line handles acquired from it have their own descriptor and
/// outlive it.
#[derive(Debug)]
pub struct Device {
    /// The path of the GPIO character device.
    path: PathBuf,
    /// The open GPIO character device file.
    f: File,
}

impl Device {
    /// Open the GPIO character device read-write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Device> {
        let path = path.as_ref().to_path_buf();
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| Error::DeviceOpen {
                path: path.clone(),
                source,
            })?;
        debug!("opened {}", path.display());
        Ok(Device { path, f })
    }

    /// The path of the chip.
    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }

    /// Acquire the given lines for exclusive use, configured by `config`.
    ///
    /// Returns the owned line handle the kernel assigns; the request itself
    /// is consumed by the call.
    pub fn acquire_lines(
        &self,
        consumer: &str,
        offsets: &[Offset],
        config: uapi::LineConfig,
        event_buffer_size: u32,
    ) -> Result<Lines> {
        let mut req = uapi::LineRequest::default();
        for offset in offsets {
            req.add_line(*offset).map_err(Error::Config)?;
        }
        req.set_consumer(consumer);
        req.set_config(config);
        req.set_event_buffer_size(event_buffer_size);
        let f = uapi::get_line(&self.f, &mut req).map_err(|e| Error::Uapi(UapiCall::GetLine, e))?;
        debug!(
            "acquired {} line(s) on {} for {}",
            offsets.len(),
            self.path.display(),
            consumer
        );
        Ok(Lines {
            f,
            offsets: offsets.to_vec(),
        })
    }
}

/// An acquired set of edge-monitored lines.
///
/// Wraps the kernel-assigned line handle descriptor, which is owned
/// exclusively and released on drop.
#[derive(Debug)]
pub struct Lines {
    /// The open line handle file.
    f: File,
    /// The requested lines, in request order.
    offsets: Vec<Offset>,
}

impl Lines {
    /// The offsets of the requested lines.
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// Query the current level of every requested line.
    pub fn values(&self) -> Result<LineLevels> {
        let mut lv = uapi::LineValues::default();
        lv.set_mask(uapi::lines_mask(self.offsets.len()));
        uapi::get_line_values(&self.f, &mut lv)
            .map_err(|e| Error::Uapi(UapiCall::GetLineValues, e))?;
        Ok(self
            .offsets
            .iter()
            .enumerate()
            .map(|(idx, offset)| (*offset, lv.is_set(idx)))
            .collect())
    }

    /// Wait for the handle to have an edge event available to read.
    pub fn wait_edge_event(&self, timeout: Duration) -> Result<bool> {
        gpiomon_uapi::wait_event(&self.f, timeout).map_err(|e| Error::Uapi(UapiCall::WaitEvent, e))
    }

    /// Read one edge event, blocking until the kernel delivers one.
    pub fn read_edge_event(&mut self) -> Result<uapi::EdgeEvent> {
        uapi::read_edge_event(&mut self.f).map_err(|e| Error::Uapi(UapiCall::ReadEvent, e))
    }
}

impl EdgeSource for Lines {
    fn wait_event(&mut self, timeout: Duration) -> Result<bool> {
        Lines::wait_edge_event(self, timeout)
    }

    fn read_event(&mut self) -> Result<uapi::EdgeEvent> {
        Lines::read_edge_event(self)
    }

    fn line_values(&mut self) -> Result<LineLevels> {
        Lines::values(self)
    }
}
