use chrono::NaiveDate;
use thiserror::Error;

/// Errors from the archive and solar layers.
///
/// Missing source files are not an error kind: a glob that matches nothing
/// is collected into the run report and the copy loop continues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("directory name {0:?} does not match YYYY_MM_DD-YYYY_MM_DD")]
    ParseDirectoryName(String),

    #[error("solar calculation failed for {date}: {reason}")]
    Calculation { date: NaiveDate, reason: String },

    #[error("unknown event {0:?} (expected sunrise, sunset or goldenhour)")]
    UnknownEvent(String),

    #[error("window must be at least one minute")]
    InvalidWindow,
}

pub type Result<T> = std::result::Result<T, Error>;
