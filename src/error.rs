use thiserror::Error;

/// The closed error taxonomy returned by every mutating or querying engine
/// operation. There is no `Ok` variant: success is `Result::Ok`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter")]
    InvalidParam,

    #[error("filesystem is not mounted")]
    NotInitialized,

    #[error("filesystem is already mounted")]
    AlreadyInitialized,

    #[error("no free clusters available")]
    NoSpace,

    #[error("no entry with the given id")]
    DataNotFound,

    #[error("stored data failed its integrity check")]
    DataCorrupted,

    #[error("medium i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("medium does not hold a valid filesystem")]
    InvalidFilesystem,

    #[error("directory is full")]
    ClusterFull,

    #[error("crc32 mismatch on read")]
    CrcMismatch,
}

pub type Result<T> = std::result::Result<T, Error>;
