//! Capture loading.
//!
//! Both container formats are decoded into the same shape: one contiguous
//! arena holding every packet payload back to back, plus per-packet offset and
//! length arrays. Scanning only ever sees that shape, so nothing downstream
//! knows or cares which container the bytes came from.

mod pcap;
mod pcapng;

use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{ScanError, ScanResult};
use crate::scan::PacketPartition;

/// Shortest file either container format can start with
pub const MIN_CAPTURE_LEN: usize = 12;

/// Container format a capture was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureFormat {
    /// Classic libpcap container (fixed global header, record headers)
    Classic,
    /// Next-generation block container
    NextGen,
    /// Built from in-memory payloads
    InMemory,
}

/// Byte order of a container's header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn read_u16(self, buf: &[u8], at: usize) -> Option<u16> {
        let raw: [u8; 2] = buf.get(at..at.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    pub(crate) fn read_u32(self, buf: &[u8], at: usize) -> Option<u32> {
        let raw: [u8; 4] = buf.get(at..at.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }
}

/// What the loader learned about the container while decoding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub format: CaptureFormat,
    /// Byte order of the first section (classic: of the whole file)
    pub byte_order: ByteOrder,
    /// Classic containers only: timestamps carry nanoseconds
    pub nanosecond: bool,
    /// Link type of the file (classic) or of the first interface (next-gen)
    pub link_type: Option<u32>,
    /// Number of section header blocks seen (next-gen)
    pub sections: usize,
    /// Packets dropped because their declared length overran their block
    pub malformed_packets: usize,
    /// Parsing stopped before reaching the end of the file
    pub truncated: bool,
}

impl CaptureInfo {
    fn in_memory() -> Self {
        Self {
            format: CaptureFormat::InMemory,
            byte_order: ByteOrder::Little,
            nanosecond: false,
            link_type: None,
            sections: 0,
            malformed_packets: 0,
            truncated: false,
        }
    }
}

/// Every packet payload of one capture, packed into a single arena
#[derive(Debug, Clone)]
pub struct Capture {
    arena: Vec<u8>,
    offsets: Vec<usize>,
    lengths: Vec<usize>,
    info: CaptureInfo,
}

impl Capture {
    /// Loads a capture file, detecting its format from the leading magic
    pub fn load(path: &Path) -> ScanResult<Self> {
        let file = File::open(path).map_err(|e| ScanError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| ScanError::from_io(path, e))?
            .len();
        if size < MIN_CAPTURE_LEN as u64 {
            return Err(ScanError::format(
                path,
                format!("file is {} bytes, too small for any capture header", size),
            ));
        }

        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ScanError::from_io(path, e))?;
        debug!("Mapped {} ({} bytes)", path.display(), mmap.len());

        let capture = Self::parse(&mmap, path)?;
        info!(
            "Loaded {} packets ({} bytes) from {} [{:?}]",
            capture.len(),
            capture.total_bytes(),
            path.display(),
            capture.info.format
        );
        if capture.info.truncated {
            warn!(
                "{} ends in a partial or invalid record; packets after it were not loaded",
                path.display()
            );
        }
        if capture.info.malformed_packets > 0 {
            warn!(
                "Dropped {} malformed packets from {}",
                capture.info.malformed_packets,
                path.display()
            );
        }
        Ok(capture)
    }

    /// Decodes a capture already in memory. `origin` is only used in errors.
    pub fn parse(bytes: &[u8], origin: &Path) -> ScanResult<Self> {
        if bytes.len() < MIN_CAPTURE_LEN {
            return Err(ScanError::format(
                origin,
                format!(
                    "file is {} bytes, too small for any capture header",
                    bytes.len()
                ),
            ));
        }

        match detect_format(bytes) {
            Some(CaptureFormat::NextGen) => pcapng::parse(bytes, origin),
            Some(CaptureFormat::Classic) => pcap::parse(bytes, origin),
            _ => Err(ScanError::format(
                origin,
                format!("unknown magic {:02x?}", &bytes[..4]),
            )),
        }
    }

    /// Builds a capture from in-memory payloads, one packet per item
    pub fn from_packets<I, P>(packets: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut builder = ArenaBuilder::default();
        for packet in packets {
            builder.push(packet.as_ref());
        }
        builder.build(CaptureInfo::in_memory())
    }

    /// Number of packets
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Size of the arena, which is the sum of all packet lengths
    pub fn total_bytes(&self) -> usize {
        self.arena.len()
    }

    pub fn arena(&self) -> &[u8] {
        &self.arena
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn info(&self) -> &CaptureInfo {
        &self.info
    }

    /// Payload of packet `index`
    pub fn packet(&self, index: usize) -> &[u8] {
        let start = self.offsets[index];
        &self.arena[start..start + self.lengths[index]]
    }

    /// Iterates packet payloads in capture order
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.len()).map(move |i| self.packet(i))
    }

    /// Splits packet indices into small and large by `large_threshold`
    pub fn partition(&self, large_threshold: usize) -> PacketPartition {
        PacketPartition::new(&self.lengths, large_threshold)
    }
}

/// Identifies the container format from the first four bytes
pub fn detect_format(bytes: &[u8]) -> Option<CaptureFormat> {
    let magic: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    if u32::from_le_bytes(magic) == pcapng::SHB_MAGIC {
        Some(CaptureFormat::NextGen)
    } else if pcap::classify_magic(magic).is_some() {
        Some(CaptureFormat::Classic)
    } else {
        None
    }
}

/// Accumulates payloads into the arena while recording offsets
#[derive(Debug, Default)]
pub(crate) struct ArenaBuilder {
    arena: Vec<u8>,
    offsets: Vec<usize>,
    lengths: Vec<usize>,
}

impl ArenaBuilder {
    pub(crate) fn with_capacity(bytes: usize) -> Self {
        Self {
            arena: Vec::with_capacity(bytes),
            offsets: Vec::new(),
            lengths: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, payload: &[u8]) {
        self.offsets.push(self.arena.len());
        self.lengths.push(payload.len());
        self.arena.extend_from_slice(payload);
    }

    pub(crate) fn packet_count(&self) -> usize {
        self.lengths.len()
    }

    fn build(mut self, info: CaptureInfo) -> Capture {
        self.arena.shrink_to_fit();
        Capture {
            arena: self.arena,
            offsets: self.offsets,
            lengths: self.lengths,
            info,
        }
    }

    /// Finishes a file-backed capture; a file with no packets is an error
    pub(crate) fn finish(self, info: CaptureInfo, origin: &Path) -> ScanResult<Capture> {
        if self.packet_count() == 0 {
            return Err(ScanError::empty_capture(origin));
        }
        Ok(self.build(info))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Classic little-endian capture with microsecond timestamps
    pub(crate) fn classic_capture(packets: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        for (i, p) in packets.iter().enumerate() {
            out.extend_from_slice(&(i as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(p.len() as u32).to_le_bytes());
            out.extend_from_slice(&(p.len() as u32).to_le_bytes());
            out.extend_from_slice(p);
        }
        out
    }

    #[test]
    fn test_from_packets_layout() {
        let capture = Capture::from_packets([&b"abc"[..], &b""[..], &b"defgh"[..]]);
        assert_eq!(capture.len(), 3);
        assert_eq!(capture.total_bytes(), 8);
        assert_eq!(capture.offsets(), &[0, 3, 3]);
        assert_eq!(capture.lengths(), &[3, 0, 5]);
        assert_eq!(capture.packet(2), b"defgh");
        assert_eq!(capture.info().format, CaptureFormat::InMemory);
    }

    #[test]
    fn test_arena_invariants() {
        let capture = Capture::from_packets(vec![vec![1u8; 10], vec![2u8; 7], vec![3u8; 1]]);
        let sum: usize = capture.lengths().iter().sum();
        assert_eq!(sum, capture.total_bytes());
        for i in 0..capture.len() - 1 {
            assert_eq!(
                capture.offsets()[i + 1],
                capture.offsets()[i] + capture.lengths()[i]
            );
        }
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format(&[0x0a, 0x0d, 0x0d, 0x0a]),
            Some(CaptureFormat::NextGen)
        );
        assert_eq!(
            detect_format(&[0xd4, 0xc3, 0xb2, 0xa1]),
            Some(CaptureFormat::Classic)
        );
        assert_eq!(
            detect_format(&[0xa1, 0xb2, 0xc3, 0xd4]),
            Some(CaptureFormat::Classic)
        );
        assert_eq!(detect_format(b"PK\x03\x04"), None);
        assert_eq!(detect_format(b"ab"), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&classic_capture(&[&b"hello"[..], &b"world!"[..]]))
            .unwrap();

        let capture = Capture::load(file.path()).unwrap();
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.packet(1), b"world!");
        assert_eq!(capture.info().format, CaptureFormat::Classic);
    }

    #[test]
    fn test_load_rejects_unknown_magic() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"this is definitely not a capture file")
            .unwrap();

        let err = Capture::load(file.path()).unwrap_err();
        assert!(matches!(err, ScanError::Format { .. }));
    }

    #[test]
    fn test_load_rejects_tiny_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xd4, 0xc3, 0xb2]).unwrap();

        let err = Capture::load(file.path()).unwrap_err();
        assert!(matches!(err, ScanError::Format { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Capture::load(Path::new("/definitely/not/here.pcap")).unwrap_err();
        assert!(matches!(err, ScanError::FileNotFound(_)));
    }
}
