//! Bit-exact on-disk layout and codec for the reserved region: the
//! superblock, the dense directory entry array, and the parallel
//! cluster-list slot array. All multi-byte fields are little-endian and
//! packed, little-endian, fixed-width.

use binrw::{BinRead, BinWrite, binrw};
use std::io::Cursor;

use crate::crc::crc32;

/// Stored as a little-endian 32-bit word; decodes to the ASCII bytes
/// `"SFCA"` even though the documented mnemonic is `"ACFS"` (see
/// DESIGN.md). This is the value actually compared against on mount.
pub const MAGIC: u32 = 0x4143_4653;

/// `(major << 8) | minor`.
pub const VERSION: u16 = 0x0100;

/// Maximum `data_id` length on the medium, including the NUL terminator.
pub const MAX_ID_LEN: usize = 32;

/// Per-entry reserved cluster-list length. Chosen so that
/// `K_MAX * max(cluster_size) >= maximum supported blob size`
/// (64 * 4096 = 256 KiB).
pub const K_MAX: usize = 64;

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuperblockRecord {
    pub magic: u32,
    pub version: u16,
    pub cluster_size: u16,
    pub total_clusters: u16,
    pub sys_clusters: u16,
    pub data_entries: u16,
    pub free_clusters: u16,
    pub crc32: u32,
}

impl SuperblockRecord {
    pub const SIZE: usize = 20;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut cursor = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write_le(&mut cursor)
            .expect("fixed-size superblock always encodes");
        let data = cursor.into_inner();
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&data);
        out
    }

    pub fn decode(buf: &[u8]) -> binrw::BinResult<Self> {
        let mut cursor = Cursor::new(buf);
        Self::read_le(&mut cursor)
    }

    /// Recomputes the CRC-32 over every byte preceding the trailing
    /// `crc32` field.
    pub fn compute_crc(&self) -> u32 {
        let mut zeroed = *self;
        zeroed.crc32 = 0;
        let bytes = zeroed.encode();
        crc32(&bytes[..Self::SIZE - 4])
    }

    pub fn verify_crc(&self) -> bool {
        self.crc32 == self.compute_crc()
    }

    pub fn seal(&mut self) {
        self.crc32 = self.compute_crc();
    }
}

/// Fixed-width on-medium directory entry record. The in-memory cluster
/// list lives separately (embedding raw pointers in the on-medium
/// representation would not survive a remount); `_reserved` is the
/// on-medium placeholder for that pointer slot and is always written zero
/// and ignored on read.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRecordOnDisk {
    pub data_id: [u8; MAX_ID_LEN],
    pub data_size: u32,
    pub cluster_count: u16,
    pub _reserved: u16,
    pub crc32: u32,
    pub is_valid: u8,
    pub _pad: [u8; 3],
}

impl Default for EntryRecordOnDisk {
    fn default() -> Self {
        EntryRecordOnDisk {
            data_id: [0u8; MAX_ID_LEN],
            data_size: 0,
            cluster_count: 0,
            _reserved: 0,
            crc32: 0,
            is_valid: 0,
            _pad: [0u8; 3],
        }
    }
}

impl EntryRecordOnDisk {
    pub const SIZE: usize = 48;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut cursor = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write_le(&mut cursor)
            .expect("fixed-size entry record always encodes");
        let data = cursor.into_inner();
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&data);
        out
    }

    pub fn decode(buf: &[u8]) -> binrw::BinResult<Self> {
        let mut cursor = Cursor::new(buf);
        Self::read_le(&mut cursor)
    }

    pub fn id_str(&self) -> &str {
        let len = self
            .data_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data_id.len());
        std::str::from_utf8(&self.data_id[..len]).unwrap_or("")
    }

    pub fn set_id(&mut self, id: &str) {
        self.data_id = [0u8; MAX_ID_LEN];
        let bytes = id.as_bytes();
        let len = bytes.len().min(MAX_ID_LEN - 1);
        self.data_id[..len].copy_from_slice(&bytes[..len]);
    }
}

/// Encodes a blob's cluster list into its fixed `K_MAX * 2`-byte on-medium
/// slot. Only the first `list.len()` entries are meaningful; the rest of
/// the slot is zero padding.
pub fn encode_cluster_list(list: &[u16]) -> [u8; K_MAX * 2] {
    assert!(list.len() <= K_MAX, "cluster list exceeds K_MAX");
    let mut buf = [0u8; K_MAX * 2];
    for (i, &cluster) in list.iter().enumerate() {
        buf[i * 2..i * 2 + 2].copy_from_slice(&cluster.to_le_bytes());
    }
    buf
}

/// Decodes the first `count` cluster indices out of a `K_MAX * 2`-byte slot.
pub fn decode_cluster_list(buf: &[u8], count: u16) -> Vec<u16> {
    (0..count as usize)
        .map(|i| u16::from_le_bytes([buf[i * 2], buf[i * 2 + 1]]))
        .collect()
}

/// Directory capacity `M`: how many entry slots (and matching cluster-list
/// slots) fit in the reserved region after the superblock.
///
/// The naive formula (`⌊(R·S − sizeof(superblock)) / sizeof(entry_record)⌋`)
/// only accounts for the entry array, but the cluster-list slot array that
/// follows it must also fit in `[0, R)` — otherwise slot `i`'s cluster list
/// would alias live data clusters. This divides by the combined per-entry
/// footprint (entry record + its cluster-list slot) instead; see
/// DESIGN.md.
pub fn directory_capacity(sys_clusters: u16, cluster_size: u16) -> usize {
    let region_bytes = sys_clusters as usize * cluster_size as usize;
    let usable = region_bytes.saturating_sub(SuperblockRecord::SIZE);
    let per_entry = EntryRecordOnDisk::SIZE + K_MAX * 2;
    usable / per_entry
}

pub fn entry_record_offset(capacity_index: usize) -> usize {
    SuperblockRecord::SIZE + capacity_index * EntryRecordOnDisk::SIZE
}

pub fn cluster_list_offset(directory_capacity: usize, capacity_index: usize) -> usize {
    SuperblockRecord::SIZE
        + directory_capacity * EntryRecordOnDisk::SIZE
        + capacity_index * K_MAX * 2
}
