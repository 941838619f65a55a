//! Mount/format/unmount and the directory operations: write, read, delete,
//! exists, get_size, get_free_space, get_stats, check_integrity, defragment.

use log::{debug, error, warn};

use crate::allocator::ClusterAllocator;
use crate::config::Config;
use crate::crc::crc32;
use crate::directory::{Directory, Entry};
use crate::error::{Error, Result};
use crate::layout::{
    self, EntryRecordOnDisk, MAX_ID_LEN, MAGIC, SuperblockRecord, VERSION,
};
use crate::medium::Medium;

/// A point-in-time snapshot of the superblock's liveness counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub cluster_size: u16,
    pub total_clusters: u16,
    pub sys_clusters: u16,
    pub data_entries: u16,
    pub free_clusters: u16,
}

struct MountedState {
    cluster_size: u16,
    total_clusters: u16,
    sys_clusters: u16,
    directory: Directory,
    allocator: ClusterAllocator,
    scratch: Vec<u8>,
}

/// The cluster-based storage engine. Generic over any [`Medium`]
/// implementation; `RamMedium` is the crate's bundled reference.
pub struct Engine<Med: Medium> {
    medium: Med,
    config: Config,
    state: Option<MountedState>,
}

impl<Med: Medium> Engine<Med> {
    pub fn new(medium: Med, config: Config) -> Self {
        Engine {
            medium,
            config,
            state: None,
        }
    }

    fn state(&self) -> Result<&MountedState> {
        self.state.as_ref().ok_or(Error::NotInitialized)
    }

    fn state_mut(&mut self) -> Result<&mut MountedState> {
        self.state.as_mut().ok_or(Error::NotInitialized)
    }

    /// Splits the borrow so the medium and the mounted state can be used
    /// together in one expression (e.g. reading a cluster straight into
    /// the scratch buffer) without going through a method that borrows
    /// `self` as a whole.
    fn medium_and_state(&mut self) -> Result<(&mut Med, &mut MountedState)> {
        let Engine { medium, state, .. } = self;
        let state = state.as_mut().ok_or(Error::NotInitialized)?;
        Ok((medium, state))
    }

    fn check_cluster_size(cluster_size: u16) -> Result<()> {
        if !(64..=4096).contains(&cluster_size) || !cluster_size.is_power_of_two() {
            return Err(Error::InvalidParam);
        }
        Ok(())
    }

    // ---- address helpers -------------------------------------------------

    fn entry_addr(&self, index: usize) -> u32 {
        self.medium.start_addr() + layout::entry_record_offset(index) as u32
    }

    fn cluster_list_addr(&self, capacity: usize, index: usize) -> u32 {
        self.medium.start_addr() + layout::cluster_list_offset(capacity, index) as u32
    }

    fn cluster_addr(&self, cluster_size: u16, cluster: u16) -> u32 {
        self.medium.start_addr() + cluster as u32 * cluster_size as u32
    }

    /// Writes `buf` to `addr`, erasing the covering erase-block(s) first on
    /// media that require it. Erase resets a whole block to `0xFF`, so the
    /// bytes of that block outside `[addr, addr+buf.len())` are read back
    /// before the erase and restored afterward, leaving them unchanged from
    /// the caller's point of view.
    fn write_with_erase(&mut self, addr: u32, buf: &[u8]) -> Result<()> {
        if !self.medium.need_erase() {
            self.medium.write(addr, buf)?;
            return Ok(());
        }

        let block = self.medium.erase_block_size();
        let aligned_start = (addr / block) * block;
        let aligned_end = (addr + buf.len() as u32).div_ceil(block) * block;
        let aligned_len = (aligned_end - aligned_start) as usize;

        let mut region = vec![0u8; aligned_len];
        self.medium.read(aligned_start, &mut region)?;
        self.medium.erase(aligned_start, aligned_len as u32)?;

        let write_offset = (addr - aligned_start) as usize;
        if write_offset > 0 {
            self.medium.write(aligned_start, &region[..write_offset])?;
        }
        let write_end = write_offset + buf.len();
        if write_end < aligned_len {
            self.medium
                .write(aligned_start + write_end as u32, &region[write_end..])?;
        }
        self.medium.write(addr, buf)?;
        Ok(())
    }

    // ---- mount / format / deinit ------------------------------------------

    /// Mounts the filesystem, formatting first if the medium is invalid
    /// and `config.format_if_invalid` is set.
    pub fn mount(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        Self::check_cluster_size(self.config.cluster_size)?;
        debug!("mount: cluster_size={}", self.config.cluster_size);

        let sb_addr = self.medium.start_addr();
        let mut sb_bytes = [0u8; SuperblockRecord::SIZE];
        self.medium.read(sb_addr, &mut sb_bytes)?;
        let sb = SuperblockRecord::decode(&sb_bytes).map_err(|_| Error::InvalidFilesystem)?;

        let valid = sb.magic == MAGIC
            && sb.verify_crc()
            && sb.cluster_size == self.config.cluster_size;

        if !valid {
            if self.config.format_if_invalid {
                debug!("mount: medium invalid, formatting");
                self.do_format()?;
            } else {
                warn!("mount: medium does not hold a valid filesystem");
                return Err(Error::InvalidFilesystem);
            }
        }

        // Re-read: either it was already valid, or do_format just wrote a
        // fresh, valid superblock.
        self.medium.read(sb_addr, &mut sb_bytes)?;
        let sb = SuperblockRecord::decode(&sb_bytes).map_err(|_| Error::InvalidFilesystem)?;
        if sb.magic != MAGIC || !sb.verify_crc() {
            error!("mount: superblock still invalid after format");
            return Err(Error::InvalidFilesystem);
        }

        let capacity = layout::directory_capacity(sb.sys_clusters, sb.cluster_size);
        let mut directory = Directory::new(capacity);
        let mut cluster_lists: Vec<Vec<u16>> = Vec::with_capacity(sb.data_entries as usize);

        for index in 0..sb.data_entries as usize {
            let rec_addr = self.entry_addr(index);
            let mut rec_bytes = [0u8; EntryRecordOnDisk::SIZE];
            self.medium.read(rec_addr, &mut rec_bytes)?;
            let rec = EntryRecordOnDisk::decode(&rec_bytes).map_err(|_| Error::InvalidFilesystem)?;

            let slot_addr = self.cluster_list_addr(capacity, index);
            let mut slot = [0u8; layout::K_MAX * 2];
            self.medium.read(slot_addr, &mut slot)?;
            let cluster_list = layout::decode_cluster_list(&slot, rec.cluster_count);

            cluster_lists.push(cluster_list.clone());
            directory.push(Entry {
                id: rec.id_str().to_string(),
                data_size: rec.data_size,
                cluster_list,
                crc32: rec.crc32,
                is_valid: rec.is_valid != 0,
            });
        }

        let allocator = ClusterAllocator::rebuild(
            sb.total_clusters,
            sb.sys_clusters,
            cluster_lists.iter().map(|v| v.as_slice()),
        );

        self.state = Some(MountedState {
            cluster_size: sb.cluster_size,
            total_clusters: sb.total_clusters,
            sys_clusters: sb.sys_clusters,
            directory,
            allocator,
            scratch: vec![0u8; sb.cluster_size as usize],
        });
        debug!(
            "mount: ok, N={} R={} E={}",
            sb.total_clusters, sb.sys_clusters, sb.data_entries
        );
        Ok(())
    }

    /// Explicit reformat. Requires the engine to be unmounted first:
    /// reformat-over-mounted is not supported, unlike the implicit format
    /// performed by `mount` with `format_if_invalid`.
    pub fn format(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        self.do_format()
    }

    fn do_format(&mut self) -> Result<()> {
        Self::check_cluster_size(self.config.cluster_size)?;
        let cluster_size = self.config.cluster_size;
        let total_clusters_u32 = self.medium.size() / cluster_size as u32;
        if total_clusters_u32 > u16::MAX as u32 {
            return Err(Error::InvalidParam);
        }
        let total_clusters = total_clusters_u32 as u16;

        let sys_clusters = if self.config.reserved_clusters == 0 {
            let min = (SuperblockRecord::SIZE as u32).div_ceil(cluster_size as u32) as u16;
            min.max(2)
        } else {
            self.config.reserved_clusters
        };
        if sys_clusters >= total_clusters {
            return Err(Error::InvalidParam);
        }

        let reserved_bytes = sys_clusters as u32 * cluster_size as u32;
        let base = self.medium.start_addr();

        if self.medium.need_erase() {
            let block = self.medium.erase_block_size();
            if reserved_bytes % block != 0 || base % block != 0 {
                return Err(Error::InvalidParam);
            }
            self.medium.erase(base, reserved_bytes)?;
        }

        let mut sb = SuperblockRecord {
            magic: MAGIC,
            version: VERSION,
            cluster_size,
            total_clusters,
            sys_clusters,
            data_entries: 0,
            free_clusters: total_clusters - sys_clusters,
            crc32: 0,
        };
        sb.seal();

        // The whole reserved region goes out in a single write: the
        // superblock header followed by zeroed entry/cluster-list slots
        // (matching E=0). A second write to the header bytes here would
        // target already-non-erased bytes on erase-required media.
        let mut region = vec![0u8; reserved_bytes as usize];
        region[..SuperblockRecord::SIZE].copy_from_slice(&sb.encode());
        self.medium.write(base, &region)?;
        debug!(
            "format: N={} R={} S={} F={}",
            total_clusters, sys_clusters, cluster_size, sb.free_clusters
        );
        Ok(())
    }

    /// Tears down the in-memory mount state, returning to `Uninitialized`.
    pub fn deinit(&mut self) -> Result<()> {
        if self.state.is_none() {
            return Err(Error::NotInitialized);
        }
        self.state = None;
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.state.is_some()
    }

    /// Direct access to the backing medium, e.g. for tests that need to
    /// corrupt bytes out of band.
    pub fn medium_mut(&mut self) -> &mut Med {
        &mut self.medium
    }

    // ---- persistence helpers ----------------------------------------------

    fn persist_superblock(&mut self) -> Result<()> {
        let state = self.state()?;
        let mut sb = SuperblockRecord {
            magic: MAGIC,
            version: VERSION,
            cluster_size: state.cluster_size,
            total_clusters: state.total_clusters,
            sys_clusters: state.sys_clusters,
            data_entries: state.directory.len() as u16,
            free_clusters: state.allocator.free_clusters(),
            crc32: 0,
        };
        sb.seal();
        let base = self.medium.start_addr();
        self.write_with_erase(base, &sb.encode())?;
        Ok(())
    }

    fn persist_entry(&mut self, index: usize) -> Result<()> {
        let state = self.state()?;
        let capacity = state.directory.capacity();
        let entry = state.directory.get(index).clone();

        let mut rec = EntryRecordOnDisk::default();
        rec.set_id(&entry.id);
        rec.data_size = entry.data_size;
        rec.cluster_count = entry.cluster_count();
        rec.crc32 = entry.crc32;
        rec.is_valid = entry.is_valid as u8;

        let addr = self.entry_addr(index);
        self.write_with_erase(addr, &rec.encode())?;

        let slot = layout::encode_cluster_list(&entry.cluster_list);
        let slot_addr = self.cluster_list_addr(capacity, index);
        self.write_with_erase(slot_addr, &slot)?;
        Ok(())
    }

    fn clear_entry_slot(&mut self, index: usize) -> Result<()> {
        let state = self.state()?;
        let capacity = state.directory.capacity();
        let addr = self.entry_addr(index);
        self.write_with_erase(addr, &EntryRecordOnDisk::default().encode())?;
        let slot_addr = self.cluster_list_addr(capacity, index);
        self.write_with_erase(slot_addr, &[0u8; layout::K_MAX * 2])?;
        Ok(())
    }

    fn write_cluster_list(&mut self, cluster_size: u16, list: &[u16], buf: &[u8]) -> Result<()> {
        let s = cluster_size as usize;
        let mut offset = 0usize;
        for &cluster in list {
            let mut block = vec![0u8; s];
            let end = (offset + s).min(buf.len());
            block[..end - offset].copy_from_slice(&buf[offset..end]);
            let addr = self.cluster_addr(cluster_size, cluster);
            self.write_with_erase(addr, &block)?;
            offset += s;
        }
        Ok(())
    }

    // ---- validation --------------------------------------------------------

    fn check_id(id: &str) -> Result<()> {
        if id.is_empty() || id.len() >= MAX_ID_LEN {
            return Err(Error::InvalidParam);
        }
        Ok(())
    }

    // ---- write --------------------------------------------------------------

    pub fn write(&mut self, id: &str, buf: &[u8]) -> Result<()> {
        Self::check_id(id)?;
        if buf.is_empty() {
            return Err(Error::InvalidParam);
        }
        let state = self.state_mut()?;
        let cluster_size = state.cluster_size;
        let k = (buf.len() as u32).div_ceil(cluster_size as u32) as u16;
        if k as usize > layout::K_MAX {
            return Err(Error::InvalidParam);
        }
        debug!("write: id={id} n={} k={k}", buf.len());

        let existing_index = state.directory.find(id);
        let index = match existing_index {
            Some(index) => {
                let current_k = state.directory.get(index).cluster_count();
                if current_k != k {
                    // Resolved open question: allocate the replacement
                    // first and swap only on success, so a failed
                    // reallocation leaves the existing entry untouched.
                    let new_list = state.allocator.allocate(k)?;
                    let old_list = std::mem::replace(
                        &mut state.directory.get_mut(index).cluster_list,
                        new_list,
                    );
                    state.allocator.free(&old_list);
                }
                index
            }
            None => {
                if state.directory.is_full() {
                    return Err(Error::ClusterFull);
                }
                let new_list = state.allocator.allocate(k)?;
                state.directory.push(Entry {
                    id: id.to_string(),
                    data_size: 0,
                    cluster_list: new_list,
                    crc32: 0,
                    is_valid: true,
                })
            }
        };

        let entry = self.state_mut()?.directory.get_mut(index);
        entry.data_size = buf.len() as u32;
        entry.crc32 = crc32(buf);
        let cluster_list = entry.cluster_list.clone();

        self.write_cluster_list(cluster_size, &cluster_list, buf)?;
        self.persist_superblock()?;
        self.persist_entry(index)?;
        Ok(())
    }

    // ---- read ---------------------------------------------------------------

    pub fn read(&mut self, id: &str, buf: &mut [u8]) -> Result<usize> {
        Self::check_id(id)?;
        let enable_crc_check = self.config.enable_crc_check;
        let state = self.state_mut()?;
        let index = state.directory.find(id).ok_or(Error::DataNotFound)?;
        let entry = state.directory.get(index).clone();
        let cluster_size = state.cluster_size;

        if buf.len() < entry.data_size as usize {
            return Err(Error::InvalidParam);
        }

        let s = cluster_size as usize;
        let n = entry.data_size as usize;
        let k = entry.cluster_list.len();
        for (i, &cluster) in entry.cluster_list.iter().enumerate() {
            let addr = self.cluster_addr(cluster_size, cluster);
            if i + 1 < k {
                self.medium.read(addr, &mut buf[i * s..(i + 1) * s])?;
            } else {
                // Last cluster: read a full cluster through the scratch
                // buffer and copy only the logical tail into the
                // caller's buffer, so `buf_len >= data_size` is always
                // sufficient even when `data_size` isn't a multiple of
                // the cluster size.
                let (medium, state) = self.medium_and_state()?;
                medium.read(addr, &mut state.scratch[..s])?;
                let tail_len = n - i * s;
                buf[i * s..i * s + tail_len].copy_from_slice(&state.scratch[..tail_len]);
            }
        }

        if enable_crc_check {
            let computed = crc32(&buf[..n]);
            if computed != entry.crc32 {
                warn!("read: crc mismatch for id={id}");
                return Err(Error::CrcMismatch);
            }
        }
        debug!("read: id={id} n={n}");
        Ok(n)
    }

    // ---- delete ---------------------------------------------------------------

    pub fn delete(&mut self, id: &str) -> Result<()> {
        Self::check_id(id)?;
        let state = self.state_mut()?;
        let index = state.directory.find(id).ok_or(Error::DataNotFound)?;
        let removed = state.directory.remove(index);
        state.allocator.free(&removed.cluster_list);
        let tail = state.directory.len();
        debug!("delete: id={id}");

        self.persist_superblock()?;
        for i in index..tail {
            self.persist_entry(i)?;
        }
        self.clear_entry_slot(tail)?;
        Ok(())
    }

    // ---- metadata queries -------------------------------------------------

    pub fn exists(&self, id: &str) -> Result<bool> {
        Self::check_id(id)?;
        Ok(self.state()?.directory.find(id).is_some())
    }

    pub fn get_size(&self, id: &str) -> Result<u32> {
        Self::check_id(id)?;
        let state = self.state()?;
        let index = state.directory.find(id).ok_or(Error::DataNotFound)?;
        Ok(state.directory.get(index).data_size)
    }

    pub fn get_free_space(&self) -> Result<u32> {
        let state = self.state()?;
        Ok(state.allocator.free_clusters() as u32 * state.cluster_size as u32)
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let state = self.state()?;
        Ok(Stats {
            cluster_size: state.cluster_size,
            total_clusters: state.total_clusters,
            sys_clusters: state.sys_clusters,
            data_entries: state.directory.len() as u16,
            free_clusters: state.allocator.free_clusters(),
        })
    }

    /// Reads every live entry's data back and recomputes its CRC-32,
    /// failing on the first mismatch. The superblock's CRC is checked at
    /// mount and on every write that touches it, not here.
    pub fn check_integrity(&mut self) -> Result<()> {
        let ids: Vec<String> = self
            .state()?
            .directory
            .entries()
            .iter()
            .map(|e| e.id.clone())
            .collect();
        for id in ids {
            let size = self.get_size(&id)? as usize;
            let mut buf = vec![0u8; size];
            match self.read(&id, &mut buf) {
                Ok(_) => {}
                Err(Error::CrcMismatch) => {
                    error!("check_integrity: data corrupted for id={id}");
                    return Err(Error::DataCorrupted);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Placeholder: the contract is to either reorder cluster lists into
    /// contiguous ascending runs, or return success without modifying
    /// anything. This implementation takes the latter option — the
    /// allocator's bitmap-scan already keeps every fresh allocation
    /// contiguous-by-construction, so there is no accumulated
    /// fragmentation to repair outside of interleaved delete/write
    /// sequences that this engine does not attempt to compact.
    pub fn defragment(&mut self) -> Result<()> {
        self.state()?;
        debug!("defragment: no-op");
        Ok(())
    }
}
