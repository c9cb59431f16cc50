//! Per-device failure taxonomy.
//!
//! Every failure while identifying one device collapses into exactly one
//! [`IdentifyError`] at the session boundary. Nothing is retried; a batch
//! caller keeps going after any per-device failure and reports the most
//! severe one as the overall result.

use thiserror::Error;

use crate::report_desc::MalformedDescriptor;

/// Terminal outcome of a failed identification attempt.
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// The device could not be opened (not present, or no permission).
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// An OS call failed unexpectedly while querying the open handle.
    #[error("{call}: {detail}")]
    Os { call: &'static str, detail: String },

    /// The report descriptor violates HID item framing.
    #[error("malformed report descriptor")]
    MalformedDescriptor,

    /// Vendor/product/interface is not in the allow-list.
    #[error("device not allowed")]
    Disallowed,

    /// The descriptor parsed cleanly but no report matches the raw HID
    /// interface shape.
    #[error("not a QMK raw HID device interface")]
    UnsupportedUsage,

    /// The negotiated report capacity cannot hold the identify payload.
    #[error("report capacity too small for message ({capacity} < {needed})")]
    ReportTooSmall { capacity: u32, needed: u32 },

    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The device accepted fewer bytes than were submitted.
    #[error("write completed with only {written} of {expected} bytes written")]
    ShortWrite { written: usize, expected: usize },

    /// The write did not complete within the bounded wait.
    #[error("report send timed out")]
    WriteTimeout,
}

impl From<MalformedDescriptor> for IdentifyError {
    fn from(_: MalformedDescriptor) -> Self {
        IdentifyError::MalformedDescriptor
    }
}

impl IdentifyError {
    /// sysexits-style process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            IdentifyError::Unavailable(_) => 66,          // EX_NOINPUT
            IdentifyError::MalformedDescriptor => 65,     // EX_DATAERR
            IdentifyError::Os { .. } => 71,               // EX_OSERR
            IdentifyError::Disallowed | IdentifyError::UnsupportedUsage => 69, // EX_UNAVAILABLE
            IdentifyError::ReportTooSmall { .. }
            | IdentifyError::WriteFailed(_)
            | IdentifyError::ShortWrite { .. }
            | IdentifyError::WriteTimeout => 74,          // EX_IOERR
        }
    }

    /// Rank used to pick the overall exit code of a multi-device run.
    /// Higher is more severe.
    pub fn severity(&self) -> u8 {
        match self {
            IdentifyError::Disallowed | IdentifyError::UnsupportedUsage => 0,
            IdentifyError::Unavailable(_) => 1,
            IdentifyError::MalformedDescriptor => 2,
            IdentifyError::ReportTooSmall { .. }
            | IdentifyError::WriteFailed(_)
            | IdentifyError::ShortWrite { .. }
            | IdentifyError::WriteTimeout => 3,
            IdentifyError::Os { .. } => 4,
        }
    }

    /// Whether the failure means "this is not a device we talk to", as
    /// opposed to an I/O or OS problem with a device that might be one.
    pub fn is_unsupported_device(&self) -> bool {
        matches!(
            self,
            IdentifyError::Disallowed
                | IdentifyError::UnsupportedUsage
                | IdentifyError::MalformedDescriptor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::IdentifyError;

    #[test]
    fn io_failures_outrank_unsupported_devices() {
        let unsupported = IdentifyError::UnsupportedUsage;
        let short = IdentifyError::ShortWrite {
            written: 3,
            expected: 7,
        };
        assert!(short.severity() > unsupported.severity());
        assert!(unsupported.is_unsupported_device());
        assert!(!short.is_unsupported_device());
    }

    #[test]
    fn exit_codes_follow_sysexits() {
        assert_eq!(IdentifyError::Unavailable("gone".into()).exit_code(), 66);
        assert_eq!(IdentifyError::MalformedDescriptor.exit_code(), 65);
        assert_eq!(IdentifyError::Disallowed.exit_code(), 69);
        assert_eq!(IdentifyError::WriteTimeout.exit_code(), 74);
    }
}
