// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A thin but safe Rust layer around the v2 Linux GPIO uAPI.
//!
//! The structs exchanged with the kernel are built and parsed as
//! fixed-length little-endian byte blocks, so the block sizes the ABI
//! demands are enforced by the array types rather than by convention.

pub(crate) mod common;

pub use common::{
    has_event, wait_event, Error, Name, Offset, Result, SizeError, LINES_MAX, NAME_MAX,
};

/// This module implements GPIO ABI v2, which is the current version of the ABI,
/// released in Linux v5.10.
pub mod v2;
