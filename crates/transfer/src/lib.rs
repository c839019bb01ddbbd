//! Filesystem side of a file transfer: partial files, file URIs, speed.
//!
//! Incoming transfers accumulate into a `<name>.part` file next to the
//! final destination and are renamed into place on success. [`PartFile`]
//! owns that lifecycle; [`SpeedMeter`] turns processed byte counts into a
//! published throughput once per sampling window.

mod partfile;
mod progress;
mod uri;
mod validation;

pub use partfile::{PartFile, existing_part_size, part_path_for};
pub use progress::SpeedMeter;
pub use uri::{local_path, to_file_uri};
pub use validation::sanitize_file_name;

/// Suffix appended to the destination name while a download is in flight.
pub const PART_SUFFIX: &str = ".part";

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
