#![allow(dead_code)]

use anyhow::Result;
use pcapscout::{EngineKind, MatchEntry, ScanConfig, StrategyChoice};
use std::collections::BTreeSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tempfile::TempDir;

/// Classic little-endian capture, microsecond timestamps, Ethernet link type
pub fn classic_capture(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&262_144u32.to_le_bytes());
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

fn pcapng_block(out: &mut Vec<u8>, block_type: u32, body: &[u8]) {
    let padded = (body.len() + 3) & !3;
    let total = (12 + padded) as u32;
    out.extend_from_slice(&block_type.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(body);
    out.resize(out.len() + padded - body.len(), 0);
    out.extend_from_slice(&total.to_le_bytes());
}

/// Little-endian pcapng: one section, one interface, one Enhanced Packet
/// Block per packet
pub fn pcapng_capture(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();

    let mut shb = Vec::new();
    shb.extend_from_slice(&0x1A2B_3C4Du32.to_le_bytes());
    shb.extend_from_slice(&1u16.to_le_bytes());
    shb.extend_from_slice(&0u16.to_le_bytes());
    shb.extend_from_slice(&(-1i64).to_le_bytes());
    pcapng_block(&mut out, 0x0A0D_0D0A, &shb);

    let mut idb = Vec::new();
    idb.extend_from_slice(&1u16.to_le_bytes());
    idb.extend_from_slice(&0u16.to_le_bytes());
    idb.extend_from_slice(&0u32.to_le_bytes());
    pcapng_block(&mut out, 1, &idb);

    for p in packets {
        let mut epb = Vec::new();
        epb.extend_from_slice(&0u32.to_le_bytes());
        epb.extend_from_slice(&[0u8; 8]);
        epb.extend_from_slice(&(p.len() as u32).to_le_bytes());
        epb.extend_from_slice(&(p.len() as u32).to_le_bytes());
        epb.extend_from_slice(p);
        pcapng_block(&mut out, 6, &epb);
    }
    out
}

pub fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, bytes)?;
    Ok(path)
}

/// Deterministic packets over a four-letter alphabet, so short patterns hit
/// often. Every fifth packet is long enough to be tiled at small thresholds.
pub fn mixed_packets(seed: u64, count: usize) -> Vec<Vec<u8>> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    (0..count)
        .map(|i| {
            let len = if i % 5 == 0 { 600 + next() % 3000 } else { next() % 300 };
            (0..len).map(|_| b"abcd"[next() % 4]).collect()
        })
        .collect()
}

/// Config with small tiles and thresholds so the tiled path gets real use
pub fn small_tile_config(strategy: StrategyChoice, engine: EngineKind) -> ScanConfig {
    ScanConfig {
        large_packet_threshold_bytes: 512,
        tile_size_bytes: 128,
        lanes_per_group: NonZeroUsize::new(16).unwrap(),
        thread_count: NonZeroUsize::new(4).unwrap(),
        strategy,
        engine,
        ..ScanConfig::default()
    }
}

/// Every occurrence, found the slow way
pub fn naive_matches(packets: &[Vec<u8>], patterns: &[Vec<u8>]) -> BTreeSet<MatchEntry> {
    let mut found = BTreeSet::new();
    for (packet_id, packet) in packets.iter().enumerate() {
        for (pattern_id, pattern) in patterns.iter().enumerate() {
            if pattern.is_empty() || pattern.len() > packet.len() {
                continue;
            }
            for start in 0..=packet.len() - pattern.len() {
                if &packet[start..start + pattern.len()] == pattern.as_slice() {
                    found.insert(MatchEntry::new(
                        packet_id as u32,
                        start as u32,
                        pattern_id as u32,
                    ));
                }
            }
        }
    }
    found
}
