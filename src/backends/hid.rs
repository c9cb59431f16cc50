//! hidapi-backed device access.
//!
//! Portable [`HidHandle`] implementation: hidapi supplies the open handle,
//! the device identity, and the raw report descriptor bytes, which are run
//! through the stream scanner. Writes are plain blocking writes; on hidraw
//! they complete or fail immediately, so the bounded wait only matters for
//! the overlapped Windows backend.

use std::ffi::CString;
use std::path::Path;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::debug;

use crate::device::{HidHandle, UsbIdentity};
use crate::error::IdentifyError;
use crate::report_desc::{scan_reports, UsageReport, MAX_DESCRIPTOR_SIZE};

/// HID device opened by platform path via hidapi.
pub struct HidapiDevice {
    raw: HidDevice,
    path: String,
    name: Option<String>,
}

impl HidapiDevice {
    /// Open `path` for raw HID access. The handle closes on drop.
    pub fn open(path: &Path) -> Result<Self, IdentifyError> {
        let api = HidApi::new_without_enumerate().map_err(|e| IdentifyError::Os {
            call: "hid_init",
            detail: e.to_string(),
        })?;

        let cpath =
            CString::new(path.to_string_lossy().as_bytes()).map_err(|_| {
                IdentifyError::Unavailable("device path contains a NUL byte".to_string())
            })?;

        let raw = api
            .open_path(&cpath)
            .map_err(|e| IdentifyError::Unavailable(e.to_string()))?;

        // Product name is log context only; a device without one is fine.
        let name = raw.get_product_string().ok().flatten();

        Ok(HidapiDevice {
            raw,
            path: path.to_string_lossy().into_owned(),
            name,
        })
    }
}

impl HidHandle for HidapiDevice {
    fn identity(&mut self) -> Result<UsbIdentity, IdentifyError> {
        let info = self.raw.get_device_info().map_err(|e| IdentifyError::Os {
            call: "hid_get_device_info",
            detail: e.to_string(),
        })?;

        // hidapi reports -1 when the transport has no interface number.
        Ok(UsbIdentity {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            interface_number: info.interface_number() as i16,
        })
    }

    fn usage_reports(&mut self) -> Result<Vec<UsageReport>, IdentifyError> {
        // Bounded by the HID maximum; anything larger cannot come back.
        let mut buf = [0u8; MAX_DESCRIPTOR_SIZE];
        let len = self
            .raw
            .get_report_descriptor(&mut buf)
            .map_err(|e| IdentifyError::Os {
                call: "hid_get_report_descriptor",
                detail: e.to_string(),
            })?;

        debug!(device = %self.path, len, "scanning report descriptor");
        Ok(scan_reports(&buf[..len])?)
    }

    fn write_report(&mut self, data: &[u8], _timeout: Duration) -> Result<usize, IdentifyError> {
        self.raw
            .write(data)
            .map_err(|e| IdentifyError::WriteFailed(e.to_string()))
    }

    fn display_name(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({name})", self.path),
            None => self.path.clone(),
        }
    }
}
