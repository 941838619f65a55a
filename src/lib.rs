//! A cluster-based key/value store for raw block-addressable storage media.
//!
//! The medium is carved into fixed-size clusters. A reserved run of
//! clusters at the front ("the system region") holds a sealed superblock
//! plus a dense, fixed-capacity directory of entry records; every entry
//! names a run of data clusters holding that blob's bytes. There is no
//! hierarchy: ids are flat and unique, and the whole store lives behind
//! the [`Medium`] trait so it can sit on EEPROM, flash, battery-backed
//! RAM, or a plain file.
//!
//! ```no_run
//! use acfs::{Config, Engine, RamMedium};
//!
//! let medium = RamMedium::new(64 * 1024);
//! let mut fs = Engine::new(medium, Config::default());
//! fs.format().unwrap();
//! fs.mount().unwrap();
//! fs.write("greeting", b"hello").unwrap();
//! let mut buf = [0u8; 5];
//! fs.read("greeting", &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! ```

mod allocator;
mod config;
mod crc;
mod directory;
mod engine;
mod error;
mod layout;
mod medium;

pub use config::Config;
pub use engine::{Engine, Stats};
pub use error::{Error, Result};
pub use medium::{Medium, MediumKind, RamMedium};
