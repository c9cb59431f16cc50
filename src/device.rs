//! Device access seam.
//!
//! The session logic talks to hardware only through [`HidHandle`], so the
//! pipeline never branches on platform. Backends hold the OS handle and
//! release it on drop, whatever path the session takes.

use std::time::Duration;

use serde::Serialize;

use crate::error::IdentifyError;
use crate::report_desc::UsageReport;

/// Vendor/product identity of an opened device. Produced once per session
/// and immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UsbIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// USB interface number; `-1` when the platform cannot tell.
    pub interface_number: i16,
}

/// Capability seam over one open HID device handle.
pub trait HidHandle {
    /// Vendor/product/interface identity.
    fn identity(&mut self) -> Result<UsbIdentity, IdentifyError>;

    /// Usage reports discovered from the device's report descriptor.
    fn usage_reports(&mut self) -> Result<Vec<UsageReport>, IdentifyError>;

    /// Fixed output frame length the transport pads to, if it has one.
    /// Only meaningful after [`HidHandle::usage_reports`] has run.
    fn output_frame_len(&self) -> Option<usize> {
        None
    }

    /// Write one output report, waiting at most `timeout` for completion.
    /// Returns the number of bytes the device accepted.
    fn write_report(&mut self, data: &[u8], timeout: Duration) -> Result<usize, IdentifyError>;

    /// Human-readable device identification for log lines: the platform
    /// path, plus the product name when known.
    fn display_name(&self) -> String;
}
