//! Mount/format configuration.

/// Parameters governing how [`crate::Engine::mount`] and
/// [`crate::Engine::format`] interpret a medium.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Cluster size in bytes. Must be a power of two in `[64, 4096]`.
    pub cluster_size: u16,
    /// Reserved (system) cluster count hint. Zero means "compute the
    /// smallest `R` that fits the superblock".
    pub reserved_clusters: u16,
    /// If the medium doesn't hold a valid filesystem at the configured
    /// `cluster_size`, format it instead of failing the mount.
    pub format_if_invalid: bool,
    /// Whether `read` and `check_integrity` verify each blob's CRC-32.
    /// The superblock's own CRC is always verified regardless.
    pub enable_crc_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cluster_size: 256,
            reserved_clusters: 0,
            format_if_invalid: false,
            enable_crc_check: true,
        }
    }
}
