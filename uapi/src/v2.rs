// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte-exact builders and parsers for the v2 uAPI structs, and the ioctl
//! calls that exchange them with the kernel.

use bitflags::bitflags;
use std::fs::File;
use std::io::Read;
use std::os::unix::prelude::{AsRawFd, FromRawFd};

pub use super::common::*;
use crate::common::IOCTL_MAGIC;

#[repr(u8)]
enum Ioctl {
    GetLine = 7,
    GetLineValues = 0xE,
}

macro_rules! iorw {
    ($nr:expr, $sz:expr) => {
        ioctl_sys::iorw!(IOCTL_MAGIC, $nr as u8, $sz) as libc::c_ulong
    };
}

/// The encoded size of a [`LineAttribute`].
pub const ATTR_SIZE: usize = 16;

/// The encoded size of a [`ConfigAttribute`].
pub const CONFIG_ATTR_SIZE: usize = 24;

/// The fixed size of the attribute region within a line config block.
///
/// The region is zero-filled beyond the attributes in use.
pub const ATTRS_SIZE: usize = 240;

/// The fixed size of an encoded [`LineConfig`].
pub const LINE_CONFIG_SIZE: usize = 272;

/// The fixed size of an encoded [`LineRequest`].
pub const LINE_REQUEST_SIZE: usize = 592;

/// The fixed size of an encoded [`LineValues`].
pub const LINE_VALUES_SIZE: usize = 16;

/// The size of one kernel edge event record.
pub const EDGE_EVENT_SIZE: usize = 48;

/// The maximum number of attributes in a [`LineConfig`].
pub const NUM_ATTRS_MAX: usize = 8;

bitflags! {
    /// Flags indicating the configuration of a line.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LineFlags: u64 {
        /// The line is in use and is not available for request.
        const USED = 1;

        /// The line active state corresponds to a physical low.
        const ACTIVE_LOW = 2;

        /// The line is an input.
        const INPUT = 4;

        /// The line is an output.
        const OUTPUT = 8;

        /// The line detects rising (*inactive* to *active*) edges.
        const EDGE_RISING = 16;

        /// The line detects falling (*active* to *inactive*) edges.
        const EDGE_FALLING = 32;

        /// The line is an open drain output.
        const OPEN_DRAIN = 64;

        /// The line is an open source output.
        const OPEN_SOURCE = 128;

        /// The line has pull-up bias enabled.
        const BIAS_PULL_UP = 256;

        /// The line has pull-down bias enabled.
        const BIAS_PULL_DOWN = 512;

        /// The line has bias disabled.
        const BIAS_DISABLED = 1024;
    }
}

// Convert an accumulated block into its fixed-size form, checking the length.
fn into_block<const N: usize>(what: &'static str, data: Vec<u8>) -> Result<[u8; N]> {
    let actual = data.len();
    data.try_into()
        .map_err(|_| Error::Size(SizeError::new(what, N, actual)))
}

// Extract a fixed-size field from a decoded block.
fn fixed<const N: usize>(what: &'static str, data: &[u8], at: usize) -> Result<[u8; N]> {
    data.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::Size(SizeError::new(what, at + N, data.len())))
}

/// A configurable attribute of a line.
///
/// The set of attribute kinds the kernel defines is closed, so each kind
/// maps to its own fixed-size encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineAttribute {
    /// Configuration flags overriding the config-level flags.
    Flags(LineFlags),

    /// Output values, with each bit number corresponding to the index
    /// into the request offsets.
    Values(u64),

    /// A debounce period, in microseconds.
    Debounce(u32),
}

impl LineAttribute {
    fn id(&self) -> u32 {
        match self {
            LineAttribute::Flags(_) => 1,
            LineAttribute::Values(_) => 2,
            LineAttribute::Debounce(_) => 3,
        }
    }

    /// Encode the attribute as the kernel's 16-byte attribute struct.
    pub fn encode(&self) -> [u8; ATTR_SIZE] {
        let mut data = [0; ATTR_SIZE];
        data[0..4].copy_from_slice(&self.id().to_le_bytes());
        match self {
            LineAttribute::Flags(flags) => data[8..16].copy_from_slice(&flags.bits().to_le_bytes()),
            LineAttribute::Values(values) => data[8..16].copy_from_slice(&values.to_le_bytes()),
            LineAttribute::Debounce(period_us) => {
                data[8..12].copy_from_slice(&period_us.to_le_bytes())
            }
        }
        data
    }
}

/// A configuration attribute associated with one or more of the requested lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConfigAttribute {
    /// The configurable attribute.
    pub attr: LineAttribute,

    /// The lines to which the attribute applies, with each bit number
    /// corresponding to the index into the request offsets.
    pub mask: u64,
}

impl ConfigAttribute {
    /// Encode the attribute and its line mask as one 24-byte entry.
    pub fn encode(&self) -> [u8; CONFIG_ATTR_SIZE] {
        let mut data = [0; CONFIG_ATTR_SIZE];
        data[..ATTR_SIZE].copy_from_slice(&self.attr.encode());
        data[ATTR_SIZE..].copy_from_slice(&self.mask.to_le_bytes());
        data
    }
}

/// Configuration for a set of requested lines.
///
/// Flags may be combined without exclusivity checks, mirroring the kernel
/// semantics - requesting an incompatible combination is the caller's
/// responsibility and is rejected by the kernel, not here.
#[derive(Clone, Debug, Default)]
pub struct LineConfig {
    flags: LineFlags,
    attrs: Vec<ConfigAttribute>,
}

impl LineConfig {
    /// Switch the lines to input mode.
    pub fn enable_input(&mut self) {
        self.flags |= LineFlags::INPUT;
    }

    /// Enable the internal pull-up.
    pub fn enable_pull_up(&mut self) {
        self.flags |= LineFlags::BIAS_PULL_UP;
    }

    /// Enable the internal pull-down.
    pub fn enable_pull_down(&mut self) {
        self.flags |= LineFlags::BIAS_PULL_DOWN;
    }

    /// Detect rising edges.
    pub fn enable_rising_edge(&mut self) {
        self.flags |= LineFlags::EDGE_RISING;
    }

    /// Detect falling edges.
    pub fn enable_falling_edge(&mut self) {
        self.flags |= LineFlags::EDGE_FALLING;
    }

    /// Add a debounce attribute applying to the masked lines.
    pub fn add_debounce(&mut self, mask: u64, period_us: u32) -> Result<()> {
        self.add_attribute(ConfigAttribute {
            attr: LineAttribute::Debounce(period_us),
            mask,
        })
    }

    /// Add a flags attribute applying to the masked lines.
    pub fn add_flags(&mut self, flags: LineFlags, mask: u64) -> Result<()> {
        self.add_attribute(ConfigAttribute {
            attr: LineAttribute::Flags(flags),
            mask,
        })
    }

    /// Add an output values attribute applying to the masked lines.
    pub fn add_values(&mut self, values: u64, mask: u64) -> Result<()> {
        self.add_attribute(ConfigAttribute {
            attr: LineAttribute::Values(values),
            mask,
        })
    }

    fn add_attribute(&mut self, attr: ConfigAttribute) -> Result<()> {
        if self.attrs.len() >= NUM_ATTRS_MAX {
            return Err(Error::Capacity {
                what: "line config attributes",
                max: NUM_ATTRS_MAX,
            });
        }
        self.attrs.push(attr);
        Ok(())
    }

    fn serialize_attrs(&self) -> Result<[u8; ATTRS_SIZE]> {
        let mut data = Vec::with_capacity(ATTRS_SIZE);
        for attr in &self.attrs {
            data.extend_from_slice(&attr.encode());
        }
        if data.len() < ATTRS_SIZE {
            data.resize(ATTRS_SIZE, 0);
        }
        into_block("line config attributes", data)
    }

    /// Encode the line config as the kernel's 272-byte config struct.
    pub fn serialize(&self) -> Result<[u8; LINE_CONFIG_SIZE]> {
        let mut data = Vec::with_capacity(LINE_CONFIG_SIZE);
        data.extend_from_slice(&self.flags.bits().to_le_bytes());
        data.extend_from_slice(&(self.attrs.len() as u32).to_le_bytes());
        data.extend_from_slice(&[0; 20]);
        data.extend_from_slice(&self.serialize_attrs()?);
        into_block("line config", data)
    }
}

/// A request for exclusive access to a set of lines.
///
/// Constructed per acquire call and consumed by [`get_line`]; the
/// descriptor it returns, not the request, is the long-lived handle.
#[derive(Clone, Debug, Default)]
pub struct LineRequest {
    offsets: Vec<Offset>,
    consumer: Name,
    config: Option<LineConfig>,
    event_buffer_size: u32,
    fd: i32,
}

impl LineRequest {
    /// Add a line, identified by offset, to the request.
    pub fn add_line(&mut self, offset: Offset) -> Result<()> {
        if self.offsets.len() >= LINES_MAX {
            return Err(Error::Capacity {
                what: "line request offsets",
                max: LINES_MAX,
            });
        }
        self.offsets.push(offset);
        Ok(())
    }

    /// Set the consumer label attached to the reservation.
    ///
    /// Truncated to the fixed 32-byte field.
    pub fn set_consumer(&mut self, consumer: &str) {
        self.consumer = Name::new(consumer);
    }

    /// Embed the line configuration.
    ///
    /// Required before the request can be serialized.
    pub fn set_config(&mut self, config: LineConfig) {
        self.config = Some(config);
    }

    /// Suggest a minimum kernel event buffer size, in events.
    ///
    /// Zero leaves the kernel default in place.
    pub fn set_event_buffer_size(&mut self, size: u32) {
        self.event_buffer_size = size;
    }

    /// The kernel-assigned line handle descriptor.
    ///
    /// Only valid after a successful acquire has been deserialized.
    pub fn fd(&self) -> i32 {
        self.fd
    }

    fn serialize_offsets(&self) -> Result<[u8; LINES_MAX * 4]> {
        let mut data = Vec::with_capacity(LINES_MAX * 4);
        for offset in &self.offsets {
            data.extend_from_slice(&offset.to_le_bytes());
        }
        if data.len() < LINES_MAX * 4 {
            data.resize(LINES_MAX * 4, 0);
        }
        into_block("line request offsets", data)
    }

    /// Encode the request as the kernel's 592-byte request struct.
    pub fn serialize(&self) -> Result<[u8; LINE_REQUEST_SIZE]> {
        let config = self.config.as_ref().ok_or(Error::MissingConfig)?;
        let mut data = Vec::with_capacity(LINE_REQUEST_SIZE);
        data.extend_from_slice(&self.serialize_offsets()?);
        data.extend_from_slice(self.consumer.as_bytes());
        data.extend_from_slice(&config.serialize()?);
        data.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.event_buffer_size.to_le_bytes());
        data.extend_from_slice(&[0; 20]);
        data.extend_from_slice(&self.fd.to_le_bytes());
        into_block("line request", data)
    }

    /// Read back the block mutated by the kernel.
    ///
    /// Only the trailing descriptor field is expected to have changed.
    pub fn deserialize(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != LINE_REQUEST_SIZE {
            return Err(
                SizeError::new("line request", LINE_REQUEST_SIZE, data.len()).into(),
            );
        }
        self.fd = i32::from_le_bytes(fixed("line request", data, LINE_REQUEST_SIZE - 4)?);
        Ok(())
    }
}

/// Values of requested lines.
///
/// Bits in the bitmaps correspond to the index into the request offsets.
/// The first requested line is bit 0.
///
/// Transient - rebuilt for every values query.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineValues {
    bits: u64,
    mask: u64,
}

impl LineValues {
    /// Select which of the requested lines to query.
    pub fn set_mask(&mut self, mask: u64) {
        self.mask = mask;
    }

    /// The state of the indexed line, as returned by the kernel.
    #[inline]
    pub fn is_set(&self, idx: usize) -> bool {
        debug_assert!(idx < 64);
        self.bits & (1 << idx) != 0
    }

    /// Encode the values query as the kernel's 16-byte values struct.
    ///
    /// The bits word is zero on send; the fixed return type enforces the
    /// block size at compile time.
    pub fn serialize(&self) -> [u8; LINE_VALUES_SIZE] {
        let mut data = [0; LINE_VALUES_SIZE];
        data[0..8].copy_from_slice(&self.bits.to_le_bytes());
        data[8..16].copy_from_slice(&self.mask.to_le_bytes());
        data
    }

    /// Read back the block mutated by the kernel, extracting the bits word.
    pub fn deserialize(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != LINE_VALUES_SIZE {
            return Err(SizeError::new("line values", LINE_VALUES_SIZE, data.len()).into());
        }
        self.bits = u64::from_le_bytes(fixed("line values", data, 0)?);
        Ok(())
    }
}

/// A mask covering the first `count` requested lines.
pub fn lines_mask(count: usize) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1 << count) - 1
    }
}

/// The trigger identifier for an [`EdgeEvent`].
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// The line transitioned from *inactive* to *active*.
    Rising = 1,
    /// The line transitioned from *active* to *inactive*.
    Falling = 2,
}

impl TryFrom<u32> for EdgeKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            x if x == EdgeKind::Rising as u32 => Ok(EdgeKind::Rising),
            x if x == EdgeKind::Falling as u32 => Ok(EdgeKind::Falling),
            x => Err(format!("invalid value: {}", x)),
        }
    }
}

/// One kernel edge event record for a requested line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EdgeEvent {
    /// The best estimate of time of event occurrence, in nanoseconds.
    ///
    /// Read from **CLOCK_MONOTONIC**, so suitable for measuring the time
    /// between events but not for wall-clock time.
    pub timestamp_ns: u64,

    /// The event trigger identifier.
    pub kind: EdgeKind,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The sequence number for this event across all lines in the request.
    pub seqno: u32,

    /// The sequence number for this event on this particular line.
    pub line_seqno: u32,
}

impl EdgeEvent {
    /// Decode one 48-byte event record read from a line handle.
    ///
    /// The content comes from the kernel, so the trigger kind is validated
    /// before being returned.
    pub fn deserialize(data: &[u8]) -> Result<EdgeEvent> {
        if data.len() != EDGE_EVENT_SIZE {
            return Err(SizeError::new("edge event", EDGE_EVENT_SIZE, data.len()).into());
        }
        let kind = u32::from_le_bytes(fixed("edge event", data, 8)?);
        Ok(EdgeEvent {
            timestamp_ns: u64::from_le_bytes(fixed("edge event", data, 0)?),
            kind: EdgeKind::try_from(kind).map_err(|msg| Error::Validation {
                field: "kind",
                msg,
            })?,
            offset: u32::from_le_bytes(fixed("edge event", data, 12)?),
            seqno: u32::from_le_bytes(fixed("edge event", data, 16)?),
            line_seqno: u32::from_le_bytes(fixed("edge event", data, 20)?),
        })
    }
}

/// Request a line or set of lines for exclusive access.
///
/// Returns the file wrapping the kernel-assigned line handle descriptor.
///
/// * `cf` - The open gpiochip device file.
/// * `lr` - The line request.
pub fn get_line(cf: &File, lr: &mut LineRequest) -> Result<File> {
    let mut block = lr.serialize()?;
    // SAFETY: the block is sized per the ABI and the kernel only writes
    // the trailing descriptor field; the returned file is drawn from that fd.
    match unsafe {
        libc::ioctl(
            cf.as_raw_fd(),
            iorw!(Ioctl::GetLine, LINE_REQUEST_SIZE),
            block.as_mut_ptr(),
        )
    } {
        0 => {
            lr.deserialize(&block)?;
            // SAFETY: ownership of the kernel-assigned fd transfers to the File.
            Ok(unsafe { File::from_raw_fd(lr.fd()) })
        }
        _ => Err(Error::from_errno()),
    }
}

/// Read the current values of requested lines.
///
/// * `lf` - The line handle file returned by [`get_line`].
/// * `lv` - The values query, with the mask selecting the lines to read.
pub fn get_line_values(lf: &File, lv: &mut LineValues) -> Result<()> {
    let mut block = lv.serialize();
    // SAFETY: the block is sized per the ABI and decoded explicitly after the call.
    match unsafe {
        libc::ioctl(
            lf.as_raw_fd(),
            iorw!(Ioctl::GetLineValues, LINE_VALUES_SIZE),
            block.as_mut_ptr(),
        )
    } {
        0 => lv.deserialize(&block),
        _ => Err(Error::from_errno()),
    }
}

/// Read one edge event from a line handle.
///
/// Blocks until the kernel has an event to deliver.
///
/// * `lf` - The line handle file returned by [`get_line`].
pub fn read_edge_event(lf: &mut File) -> Result<EdgeEvent> {
    let mut buf = [0; EDGE_EVENT_SIZE];
    let n = lf.read(&mut buf)?;
    EdgeEvent::deserialize(&buf[..n])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_codes() {
        // the fixed codes from the kernel headers
        assert_eq!(iorw!(Ioctl::GetLine, LINE_REQUEST_SIZE), 0xc250b407);
        assert_eq!(iorw!(Ioctl::GetLineValues, LINE_VALUES_SIZE), 0xc010b40e);
    }

    mod line_attribute {
        use super::*;

        #[test]
        fn encode_flags() {
            let data = LineAttribute::Flags(LineFlags::OUTPUT | LineFlags::ACTIVE_LOW).encode();
            assert_eq!(u32::from_le_bytes(data[0..4].try_into().unwrap()), 1);
            assert_eq!(data[4..8], [0; 4]);
            assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 10);
        }

        #[test]
        fn encode_values() {
            let data = LineAttribute::Values(0xdeadbeef).encode();
            assert_eq!(u32::from_le_bytes(data[0..4].try_into().unwrap()), 2);
            assert_eq!(
                u64::from_le_bytes(data[8..16].try_into().unwrap()),
                0xdeadbeef
            );
        }

        #[test]
        fn encode_debounce() {
            let data = LineAttribute::Debounce(5000).encode();
            assert_eq!(u32::from_le_bytes(data[0..4].try_into().unwrap()), 3);
            assert_eq!(u32::from_le_bytes(data[8..12].try_into().unwrap()), 5000);
            assert_eq!(data[12..16], [0; 4]);
        }
    }

    mod config_attribute {
        use super::*;

        #[test]
        fn encode() {
            let ca = ConfigAttribute {
                attr: LineAttribute::Debounce(200),
                mask: 0b101,
            };
            let data = ca.encode();
            assert_eq!(data.len(), CONFIG_ATTR_SIZE);
            assert_eq!(data[..ATTR_SIZE], ca.attr.encode());
            assert_eq!(u64::from_le_bytes(data[16..24].try_into().unwrap()), 0b101);
        }
    }

    mod line_config {
        use super::*;

        #[test]
        fn serialize_flags() {
            let mut lc = LineConfig::default();
            lc.enable_input();
            lc.enable_pull_down();
            lc.enable_rising_edge();
            lc.enable_falling_edge();
            let data = lc.serialize().unwrap();
            let flags = LineFlags::INPUT
                | LineFlags::BIAS_PULL_DOWN
                | LineFlags::EDGE_RISING
                | LineFlags::EDGE_FALLING;
            assert_eq!(
                u64::from_le_bytes(data[0..8].try_into().unwrap()),
                flags.bits()
            );
            assert_eq!(u32::from_le_bytes(data[8..12].try_into().unwrap()), 0);
            assert!(data[12..].iter().all(|&b| b == 0));
        }

        #[test]
        fn serialize_pull_up() {
            let mut lc = LineConfig::default();
            lc.enable_input();
            lc.enable_pull_up();
            let data = lc.serialize().unwrap();
            assert_eq!(
                u64::from_le_bytes(data[0..8].try_into().unwrap()),
                (LineFlags::INPUT | LineFlags::BIAS_PULL_UP).bits()
            );
        }

        #[test]
        fn serialize_attr_counts() {
            // the block stays at its fixed size for every valid attribute count
            for n in 0..=NUM_ATTRS_MAX {
                let mut lc = LineConfig::default();
                lc.enable_input();
                for i in 0..n {
                    lc.add_debounce(1 << i, 1000 * i as u32).unwrap();
                }
                let data = lc.serialize().unwrap();
                assert_eq!(data.len(), LINE_CONFIG_SIZE, "attrs: {n}");
                assert_eq!(
                    u32::from_le_bytes(data[8..12].try_into().unwrap()),
                    n as u32,
                    "attrs: {n}"
                );
            }
        }

        #[test]
        fn serialize_debounce_layout() {
            let mut lc = LineConfig::default();
            lc.add_debounce(0b11, 5000).unwrap();
            let data = lc.serialize().unwrap();
            // first attribute entry starts after flags, count and padding
            assert_eq!(u32::from_le_bytes(data[32..36].try_into().unwrap()), 3);
            assert_eq!(u32::from_le_bytes(data[40..44].try_into().unwrap()), 5000);
            assert_eq!(u64::from_le_bytes(data[48..56].try_into().unwrap()), 0b11);
            // unused slots are zero-filled
            assert!(data[56..].iter().all(|&b| b == 0));
        }

        #[test]
        fn attr_capacity() {
            let mut lc = LineConfig::default();
            for i in 0..NUM_ATTRS_MAX {
                lc.add_debounce(1 << i, 100).unwrap();
            }
            assert!(matches!(
                lc.add_debounce(1, 100),
                Err(Error::Capacity { max: 8, .. })
            ));
            assert!(matches!(
                lc.add_flags(LineFlags::OUTPUT, 1),
                Err(Error::Capacity { max: 8, .. })
            ));
        }
    }

    mod line_request {
        use super::*;

        fn input_config() -> LineConfig {
            let mut lc = LineConfig::default();
            lc.enable_input();
            lc
        }

        #[test]
        fn serialize_requires_config() {
            let mut lr = LineRequest::default();
            lr.add_line(18).unwrap();
            assert!(matches!(lr.serialize(), Err(Error::MissingConfig)));
        }

        #[test]
        fn serialize_layout() {
            let mut lr = LineRequest::default();
            lr.add_line(18).unwrap();
            lr.add_line(23).unwrap();
            lr.set_consumer("kiosk");
            lr.set_config(input_config());
            lr.set_event_buffer_size(16);
            let data = lr.serialize().unwrap();
            assert_eq!(data.len(), LINE_REQUEST_SIZE);
            // offsets
            assert_eq!(u32::from_le_bytes(data[0..4].try_into().unwrap()), 18);
            assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 23);
            assert!(data[8..256].iter().all(|&b| b == 0));
            // consumer
            assert_eq!(&data[256..261], b"kiosk");
            assert!(data[261..288].iter().all(|&b| b == 0));
            // embedded config
            assert_eq!(
                u64::from_le_bytes(data[288..296].try_into().unwrap()),
                LineFlags::INPUT.bits()
            );
            // trailing scalar fields
            assert_eq!(u32::from_le_bytes(data[560..564].try_into().unwrap()), 2);
            assert_eq!(u32::from_le_bytes(data[564..568].try_into().unwrap()), 16);
            assert!(data[568..588].iter().all(|&b| b == 0));
            assert_eq!(i32::from_le_bytes(data[588..592].try_into().unwrap()), 0);
        }

        #[test]
        fn serialize_empty_request() {
            let mut lr = LineRequest::default();
            lr.set_config(input_config());
            let data = lr.serialize().unwrap();
            assert_eq!(data.len(), LINE_REQUEST_SIZE);
            assert_eq!(u32::from_le_bytes(data[560..564].try_into().unwrap()), 0);
        }

        #[test]
        fn consumer_truncated() {
            let mut lr = LineRequest::default();
            lr.set_consumer("an overly long truncated name -><- cut here");
            lr.set_config(input_config());
            let data = lr.serialize().unwrap();
            assert_eq!(&data[256..288], b"an overly long truncated name ->");
        }

        #[test]
        fn line_capacity() {
            let mut lr = LineRequest::default();
            for offset in 0..LINES_MAX as u32 {
                lr.add_line(offset).unwrap();
            }
            assert!(matches!(
                lr.add_line(64),
                Err(Error::Capacity { max: 64, .. })
            ));
        }

        #[test]
        fn deserialize_requires_exact_size() {
            let mut lr = LineRequest::default();
            let err = lr.deserialize(&[0; LINE_REQUEST_SIZE - 1]).unwrap_err();
            assert!(matches!(
                err,
                Error::Size(SizeError {
                    expected: LINE_REQUEST_SIZE,
                    actual: 591,
                    ..
                })
            ));
            assert!(lr.deserialize(&[0; LINE_REQUEST_SIZE + 1]).is_err());
        }

        #[test]
        fn deserialize_extracts_fd() {
            let mut lr = LineRequest::default();
            lr.add_line(18).unwrap();
            lr.set_config(input_config());
            let mut data = lr.serialize().unwrap();
            assert_eq!(lr.fd(), 0);
            // the kernel mutates only the trailing descriptor field
            data[588..592].copy_from_slice(&42i32.to_le_bytes());
            lr.deserialize(&data).unwrap();
            assert_eq!(lr.fd(), 42);
        }
    }

    mod line_values {
        use super::*;

        #[test]
        fn serialize_layout() {
            let mut lv = LineValues::default();
            lv.set_mask(0b1011);
            let data = lv.serialize();
            assert_eq!(u64::from_le_bytes(data[0..8].try_into().unwrap()), 0);
            assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 0b1011);
        }

        #[test]
        fn deserialize_requires_exact_size() {
            let mut lv = LineValues::default();
            for len in [0, 15, 17] {
                let err = lv.deserialize(&vec![0; len]).unwrap_err();
                assert!(
                    matches!(
                        err,
                        Error::Size(SizeError {
                            expected: LINE_VALUES_SIZE,
                            ..
                        })
                    ),
                    "len: {len}"
                );
            }
        }

        #[test]
        fn deserialize_extracts_bits() {
            let mut lv = LineValues::default();
            lv.set_mask(0b111);
            let mut data = lv.serialize();
            data[0..8].copy_from_slice(&0b101u64.to_le_bytes());
            lv.deserialize(&data).unwrap();
            assert!(lv.is_set(0));
            assert!(!lv.is_set(1));
            assert!(lv.is_set(2));
            assert!(!lv.is_set(3));
        }
    }

    mod lines_mask {
        use super::lines_mask;

        #[test]
        fn masks() {
            assert_eq!(lines_mask(0), 0);
            assert_eq!(lines_mask(1), 1);
            assert_eq!(lines_mask(3), 0b111);
            assert_eq!(lines_mask(64), u64::MAX);
            assert_eq!(lines_mask(65), u64::MAX);
        }
    }

    mod edge_event {
        use super::*;

        fn raw_event(kind: u32) -> [u8; EDGE_EVENT_SIZE] {
            let mut data = [0; EDGE_EVENT_SIZE];
            data[0..8].copy_from_slice(&1234u64.to_le_bytes());
            data[8..12].copy_from_slice(&kind.to_le_bytes());
            data[12..16].copy_from_slice(&18u32.to_le_bytes());
            data[16..20].copy_from_slice(&3u32.to_le_bytes());
            data[20..24].copy_from_slice(&2u32.to_le_bytes());
            data
        }

        #[test]
        fn deserialize() {
            let event = EdgeEvent::deserialize(&raw_event(1)).unwrap();
            assert_eq!(
                event,
                EdgeEvent {
                    timestamp_ns: 1234,
                    kind: EdgeKind::Rising,
                    offset: 18,
                    seqno: 3,
                    line_seqno: 2,
                }
            );
            assert_eq!(EdgeEvent::deserialize(&raw_event(2)).unwrap().kind, EdgeKind::Falling);
        }

        #[test]
        fn deserialize_requires_exact_size() {
            assert!(matches!(
                EdgeEvent::deserialize(&raw_event(1)[..40]),
                Err(Error::Size(SizeError {
                    expected: EDGE_EVENT_SIZE,
                    actual: 40,
                    ..
                }))
            ));
        }

        #[test]
        fn deserialize_validates_kind() {
            for kind in [0, 3, 7] {
                assert!(
                    matches!(
                        EdgeEvent::deserialize(&raw_event(kind)),
                        Err(Error::Validation { field: "kind", .. })
                    ),
                    "kind: {kind}"
                );
            }
        }
    }
}
