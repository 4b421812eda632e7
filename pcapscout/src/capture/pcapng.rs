use std::path::Path;
use tracing::{debug, trace};

use super::{ArenaBuilder, ByteOrder, Capture, CaptureFormat, CaptureInfo};
use crate::errors::{ScanError, ScanResult};

/// Section Header Block type; a palindrome, so it reads the same in both orders
pub(super) const SHB_MAGIC: u32 = 0x0A0D_0D0A;
const BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;

const IDB_TYPE: u32 = 0x0000_0001;
const SPB_TYPE: u32 = 0x0000_0003;
const EPB_TYPE: u32 = 0x0000_0006;

/// type + total length + trailing total length
const MIN_BLOCK_LEN: usize = 12;
const TRAILER_LEN: usize = 4;

const SHB_BYTE_ORDER_OFFSET: usize = 8;
const IDB_LINK_TYPE_OFFSET: usize = 8;
const EPB_CAPTURED_LEN_OFFSET: usize = 20;
const EPB_DATA_OFFSET: usize = 28;
const SPB_ORIGINAL_LEN_OFFSET: usize = 8;
const SPB_DATA_OFFSET: usize = 12;

/// Byte order declared by the section header starting at `pos`
fn section_order(bytes: &[u8], pos: usize) -> Option<ByteOrder> {
    let bom = ByteOrder::Little.read_u32(bytes, pos + SHB_BYTE_ORDER_OFFSET)?;
    if bom == BYTE_ORDER_MAGIC {
        Some(ByteOrder::Little)
    } else if bom == BYTE_ORDER_MAGIC.swap_bytes() {
        Some(ByteOrder::Big)
    } else {
        None
    }
}

/// Payload of an Enhanced Packet Block, `None` if its captured length overruns the block
fn enhanced_payload(block: &[u8], order: ByteOrder) -> Option<&[u8]> {
    let captured = order.read_u32(block, EPB_CAPTURED_LEN_OFFSET)? as usize;
    let end = EPB_DATA_OFFSET.checked_add(captured)?;
    if end > block.len().checked_sub(TRAILER_LEN)? {
        return None;
    }
    Some(&block[EPB_DATA_OFFSET..end])
}

/// Payload of a Simple Packet Block: whatever the block holds past its
/// fixed overhead, minus alignment padding
fn simple_payload(block: &[u8], order: ByteOrder) -> Option<&[u8]> {
    let original = order.read_u32(block, SPB_ORIGINAL_LEN_OFFSET)? as usize;
    let available = block.len().checked_sub(SPB_DATA_OFFSET + TRAILER_LEN)?;
    let len = available.min(original);
    Some(&block[SPB_DATA_OFFSET..SPB_DATA_OFFSET + len])
}

/// Walks the block stream. Every block is stepped over by its own declared
/// length, whatever its body claims, so a lying payload length cannot desync
/// the walk.
pub(super) fn parse(bytes: &[u8], origin: &Path) -> ScanResult<Capture> {
    let first_order = section_order(bytes, 0)
        .ok_or_else(|| ScanError::format(origin, "section header has no valid byte-order magic"))?;

    let mut order = first_order;
    let mut builder = ArenaBuilder::with_capacity(bytes.len());
    let mut pos = 0;
    let mut sections = 0;
    let mut malformed_packets = 0;
    let mut link_type = None;
    let mut truncated = false;

    while pos < bytes.len() {
        if pos + MIN_BLOCK_LEN > bytes.len() {
            truncated = true;
            break;
        }

        let raw_type = ByteOrder::Little.read_u32(bytes, pos).unwrap_or_default();
        let block_type = if raw_type == SHB_MAGIC {
            match section_order(bytes, pos) {
                Some(section) => {
                    order = section;
                    sections += 1;
                }
                None => {
                    debug!("Section header at {} has a bad byte-order magic", pos);
                    truncated = true;
                    break;
                }
            }
            SHB_MAGIC
        } else {
            order.read_u32(bytes, pos).unwrap_or_default()
        };

        let block_len = order.read_u32(bytes, pos + 4).unwrap_or_default() as usize;
        if block_len < MIN_BLOCK_LEN || block_len > bytes.len() - pos {
            trace!("Block at {} declares {} bytes, stopping", pos, block_len);
            truncated = true;
            break;
        }
        let block = &bytes[pos..pos + block_len];

        match block_type {
            EPB_TYPE => match enhanced_payload(block, order) {
                Some(payload) => builder.push(payload),
                None => malformed_packets += 1,
            },
            SPB_TYPE => match simple_payload(block, order) {
                Some(payload) => builder.push(payload),
                None => malformed_packets += 1,
            },
            IDB_TYPE if link_type.is_none() => {
                link_type = order
                    .read_u16(block, IDB_LINK_TYPE_OFFSET)
                    .map(u32::from);
            }
            _ => {}
        }

        pos += block_len;
    }

    let info = CaptureInfo {
        format: CaptureFormat::NextGen,
        byte_order: first_order,
        nanosecond: false,
        link_type,
        sections,
        malformed_packets,
        truncated,
    };
    builder.finish(info, origin)
}
