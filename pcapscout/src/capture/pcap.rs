use std::path::Path;
use tracing::trace;

use super::{ArenaBuilder, ByteOrder, Capture, CaptureFormat, CaptureInfo};
use crate::errors::{ScanError, ScanResult};

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
const LINK_TYPE_OFFSET: usize = 20;
const INCL_LEN_OFFSET: usize = 8;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Byte order and nanosecond flag for a classic magic, if it is one
pub(super) fn classify_magic(magic: [u8; 4]) -> Option<(ByteOrder, bool)> {
    match (u32::from_le_bytes(magic), u32::from_be_bytes(magic)) {
        (MAGIC_MICROS, _) => Some((ByteOrder::Little, false)),
        (MAGIC_NANOS, _) => Some((ByteOrder::Little, true)),
        (_, MAGIC_MICROS) => Some((ByteOrder::Big, false)),
        (_, MAGIC_NANOS) => Some((ByteOrder::Big, true)),
        _ => None,
    }
}

/// Walks the record list. A record whose header or payload runs past the end
/// of the file ends the walk; everything before it is kept.
pub(super) fn parse(bytes: &[u8], origin: &Path) -> ScanResult<Capture> {
    if bytes.len() < GLOBAL_HEADER_LEN {
        return Err(ScanError::format(origin, "classic global header is truncated"));
    }
    let magic: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let (order, nanosecond) = classify_magic(magic)
        .ok_or_else(|| ScanError::format(origin, "classic magic mismatch"))?;

    let mut builder = ArenaBuilder::with_capacity(bytes.len() - GLOBAL_HEADER_LEN);
    let mut pos = GLOBAL_HEADER_LEN;
    let mut truncated = false;

    while pos < bytes.len() {
        let data = pos + RECORD_HEADER_LEN;
        let Some(incl_len) = order.read_u32(bytes, pos + INCL_LEN_OFFSET) else {
            truncated = true;
            break;
        };
        let end = data + incl_len as usize;
        if data > bytes.len() || end > bytes.len() {
            trace!(
                "Record at {} claims {} bytes, only {} remain",
                pos,
                incl_len,
                bytes.len().saturating_sub(data)
            );
            truncated = true;
            break;
        }
        builder.push(&bytes[data..end]);
        pos = end;
    }

    let info = CaptureInfo {
        format: CaptureFormat::Classic,
        byte_order: order,
        nanosecond,
        link_type: order.read_u32(bytes, LINK_TYPE_OFFSET),
        sections: 0,
        malformed_packets: 0,
        truncated,
    };
    builder.finish(info, origin)
}
