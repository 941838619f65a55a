//! The byte-addressed medium abstraction the engine is built against.
//! Concrete EEPROM/flash/SDRAM adapters live outside this crate; only the
//! contract and an in-memory reference implementation for tests live here.

use crate::error::{Error, Result};

/// What kind of backing device a [`Medium`] represents. Purely descriptive;
/// the engine never branches on it directly, only on `need_erase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumKind {
    Eeprom,
    Flash,
    Sdram,
    Custom,
}

/// Read/write/erase contract for a raw block-addressable storage medium.
///
/// `addr` is always relative to the medium's own `start_addr` (callers of
/// this trait, i.e. the engine, already add `start_addr` before dispatching
/// here is *not* required — implementations own their own addressing).
/// Every method is synchronous and blocking; there is no cancellation.
pub trait Medium {
    /// Offset of this medium's region on the underlying device.
    fn start_addr(&self) -> u32;

    /// Size in bytes of the region this medium exposes.
    fn size(&self) -> u32;

    fn kind(&self) -> MediumKind;

    /// Whether [`Medium::erase`] must be called before rewriting a byte
    /// whose current value is not the erased sentinel `0xFF`.
    fn need_erase(&self) -> bool;

    /// Required granularity of [`Medium::erase`] calls; `addr` and `len`
    /// passed to `erase` must be multiples of this.
    fn erase_block_size(&self) -> u32;

    /// Copy `buf.len()` bytes from medium offset `addr` into `buf`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Copy `buf` to medium offset `addr`. On erase-required media, writing
    /// to a byte whose current value is not `0xFF` is an error.
    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<()>;

    /// Reset `[addr, addr+len)` to `0xFF`. Only called when `need_erase()`
    /// is true; `addr` and `len` must be multiples of `erase_block_size()`.
    fn erase(&mut self, addr: u32, len: u32) -> Result<()>;
}

/// An in-memory [`Medium`] backed by an owned buffer. This is the crate's
/// only bundled `Medium` implementation — a reference for the trait
/// contract and the device every test in this crate drives the engine
/// against. State is instance-local (no module-level buffers), per the
/// "no global mutable state in adapters" requirement.
pub struct RamMedium {
    data: Vec<u8>,
    kind: MediumKind,
    need_erase: bool,
    erase_block_size: u32,
}

impl RamMedium {
    /// A medium that behaves like SDRAM/battery-backed RAM: no erase
    /// required, any byte may be overwritten directly.
    pub fn new(size: u32) -> Self {
        RamMedium {
            data: vec![0u8; size as usize],
            kind: MediumKind::Sdram,
            need_erase: false,
            erase_block_size: 1,
        }
    }

    /// A medium that behaves like NOR/NAND flash: writes must target
    /// pre-erased (`0xFF`) bytes, and erase operates in `erase_block_size`
    /// granules.
    pub fn new_flash(size: u32, erase_block_size: u32) -> Self {
        RamMedium {
            data: vec![0xFFu8; size as usize],
            kind: MediumKind::Flash,
            need_erase: true,
            erase_block_size,
        }
    }

    /// Direct access to the backing bytes, for tests that need to corrupt
    /// the medium out of band (corruption-detection tests).
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Medium for RamMedium {
    fn start_addr(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn kind(&self) -> MediumKind {
        self.kind
    }

    fn need_erase(&self) -> bool {
        self.need_erase
    }

    fn erase_block_size(&self) -> u32 {
        self.erase_block_size
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let start = addr as usize;
        let end = start + buf.len();
        let region = self
            .data
            .get(start..end)
            .ok_or_else(|| Error::Io(std::io::Error::other("read out of range")))?;
        buf.copy_from_slice(region);
        Ok(())
    }

    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<()> {
        let start = addr as usize;
        let end = start + buf.len();
        let region = self
            .data
            .get_mut(start..end)
            .ok_or_else(|| Error::Io(std::io::Error::other("write out of range")))?;
        if self.need_erase && region.iter().any(|&b| b != 0xFF) {
            return Err(Error::Io(std::io::Error::other(
                "write to non-erased bytes on erase-required medium",
            )));
        }
        region.copy_from_slice(buf);
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        if addr % self.erase_block_size != 0 || len % self.erase_block_size != 0 {
            return Err(Error::InvalidParam);
        }
        let start = addr as usize;
        let end = start + len as usize;
        let region = self
            .data
            .get_mut(start..end)
            .ok_or_else(|| Error::Io(std::io::Error::other("erase out of range")))?;
        region.fill(0xFF);
        Ok(())
    }
}
