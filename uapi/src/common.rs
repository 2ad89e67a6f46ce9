// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::ptr::null;
use libc::{c_long, pollfd, ppoll, sigset_t, time_t, timespec, POLLIN};
use std::ffi::OsStr;
use std::fs::File;
use std::io::Error as IoError;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::slice;
use std::time::Duration;

pub(crate) const IOCTL_MAGIC: u8 = 0xb4;

/// Check if the file has an event available to read.
pub fn has_event(f: &File) -> Result<bool> {
    wait_event(f, Duration::ZERO)
}

/// Wait for the file to have an event available to read.
///
/// Returns false if the timeout expires with no event available.
pub fn wait_event(f: &File, d: Duration) -> Result<bool> {
    let mut pfd = pollfd {
        fd: f.as_raw_fd(),
        events: POLLIN,
        revents: 0,
    };
    let timeout = timespec {
        tv_sec: d.as_secs() as time_t,
        tv_nsec: d.subsec_nanos() as c_long,
    };
    // SAFETY: pfd and timeout outlive the call and no mask is passed.
    unsafe {
        match ppoll(
            std::ptr::addr_of_mut!(pfd),
            1,
            std::ptr::addr_of!(timeout),
            null() as *const sigset_t,
        ) {
            -1 => Err(Error::from_errno()),
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

/// The result returned by [`gpiomon_uapi`] functions.
///
/// [`gpiomon_uapi`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`gpiomon_uapi`] functions.
///
/// [`gpiomon_uapi`]: crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error returned from an underlying system call.
    #[error(transparent)]
    Os(#[from] std::io::Error),

    /// An encode or decode produced a block of unexpected length.
    ///
    /// This is a protocol-layout defect, never a runtime input problem,
    /// so it is not worth retrying.
    #[error(transparent)]
    Size(#[from] SizeError),

    /// A builder was asked to hold more entries than the ABI allows.
    #[error("{what} holds at most {max} entries")]
    Capacity { what: &'static str, max: usize },

    /// A line request was serialized without an embedded line config.
    #[error("line request has no line config")]
    MissingConfig,

    /// A field value has no valid wire encoding.
    ///
    /// Covers both out-of-range caller input and kernel-returned enum
    /// values this version does not know.
    #[error("invalid {field}: {msg}")]
    Validation { field: &'static str, msg: String },
}

impl Error {
    pub(crate) fn from_errno() -> Error {
        Error::Os(IoError::last_os_error())
    }
}

/// A fixed-length byte block came out at the wrong length.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[error("{what} is {actual} bytes, expected {expected}")]
pub struct SizeError {
    pub what: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl SizeError {
    pub(crate) fn new(what: &'static str, expected: usize, actual: usize) -> SizeError {
        SizeError {
            what,
            expected,
            actual,
        }
    }
}

/// The maximum number of bytes stored in a [`Name`].
pub const NAME_MAX: usize = 32;

/// A uAPI name string.
///
/// Stored null-padded in a fixed 32-byte field; longer names are truncated.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Name([u8; NAME_MAX]);

impl Name {
    /// Construct a Name from a string, truncating to the field size.
    ///
    /// May result in invalid UTF-8 if truncated in the middle of a multi-byte character.
    pub fn new(s: &str) -> Name {
        let mut n: Name = Default::default();
        for (src, dst) in s.as_bytes().iter().zip(n.0.iter_mut()) {
            *dst = *src;
        }
        n
    }

    /// Checks whether the Name is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// The length of the contained name.
    #[inline]
    pub fn strlen(&self) -> usize {
        self.0.iter().position(|&x| x == 0).unwrap_or(self.0.len())
    }

    /// Convert the contained name to an OsStr slice.
    pub fn as_os_str(&self) -> &OsStr {
        // SAFETY: strlen is contained within the fixed array.
        unsafe { OsStr::from_bytes(slice::from_raw_parts(&self.0[0], self.strlen())) }
    }

    /// The null-padded field as sent on the wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; NAME_MAX] {
        &self.0
    }
}

/// An identifier for a line on a particular chip.
pub type Offset = u32;

/// The maximum number of lines that may be requested in a single request.
pub const LINES_MAX: usize = 64;
