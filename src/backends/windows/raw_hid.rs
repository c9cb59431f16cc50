#![cfg(target_os = "windows")]

//! Windows raw HID device access.
//!
//! [`RawHidDevice`] opens the HID interface path with `CreateFileW` and
//! implements the [`HidHandle`] seam on top of the Win32 HID APIs:
//! - identity via `HidD_GetAttributes`, with the USB interface number
//!   recovered from the `&mi_XX` segment of the device path (HIDD
//!   attributes do not carry it),
//! - usage reports via `HidD_GetPreparsedData` / `HidP_GetCaps` /
//!   `HidP_GetSpecificValueCaps` (the capability tables already encode
//!   what the stream scanner extracts elsewhere),
//! - writes via overlapped `WriteFile` with a bounded wait; a write that
//!   misses the deadline is cancelled and its completion awaited before
//!   the buffer goes away.

use core::mem::MaybeUninit;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{null, null_mut};
use std::time::Duration;

use tracing::warn;

use windows_sys::Win32::Devices::HumanInterfaceDevice::{
    HidD_FreePreparsedData, HidD_GetAttributes, HidD_GetPreparsedData, HidP_Feature,
    HidP_GetCaps, HidP_GetSpecificValueCaps, HidP_Input, HidP_Output, HIDD_ATTRIBUTES,
    HIDP_CAPS, HIDP_REPORT_TYPE, HIDP_STATUS_SUCCESS, HIDP_STATUS_USAGE_NOT_FOUND,
    HIDP_VALUE_CAPS, PHIDP_PREPARSED_DATA,
};
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ACCESS_DENIED, ERROR_IO_PENDING, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, WriteFile, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE,
    OPEN_EXISTING,
};
use windows_sys::Win32::System::IO::{CancelIo, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use crate::device::{HidHandle, UsbIdentity};
use crate::error::IdentifyError;
use crate::report_desc::{FieldAttributes, UsageReport};

/// Raw HID device opened through the Win32 HID stack.
pub struct RawHidDevice {
    handle: HANDLE,
    preparsed: PHIDP_PREPARSED_DATA,
    path: String,
    /// `OutputReportByteLength` from the caps, including the report ID
    /// byte. Valid once `usage_reports` has run.
    output_report_len: u16,
}

impl Drop for RawHidDevice {
    fn drop(&mut self) {
        unsafe {
            if self.preparsed != 0 {
                HidD_FreePreparsedData(self.preparsed);
                self.preparsed = 0;
            }
            if !self.handle.is_null() && self.handle != INVALID_HANDLE_VALUE {
                CloseHandle(self.handle);
                self.handle = null_mut();
            }
        }
    }
}

// The handle and preparsed data are opaque OS handles owned exclusively by
// this value; nothing shares internal references to Rust data.
unsafe impl Send for RawHidDevice {}

impl RawHidDevice {
    /// Open a HID interface path for writing. The handle closes on drop.
    pub fn open(path: &Path) -> Result<Self, IdentifyError> {
        let path = path.to_string_lossy().into_owned();
        let handle = open_device_handle(&path)?;

        Ok(RawHidDevice {
            handle,
            preparsed: 0,
            path,
            output_report_len: 0,
        })
    }

    /// Enumerate the value caps of one report type into field attributes.
    fn value_caps(
        &self,
        report_type: HIDP_REPORT_TYPE,
        usage_page: u16,
        len: u16,
    ) -> Result<Vec<FieldAttributes>, IdentifyError> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut caps: Vec<HIDP_VALUE_CAPS> = vec![unsafe { core::mem::zeroed() }; len as usize];
        let mut count = len;

        let status = unsafe {
            HidP_GetSpecificValueCaps(
                report_type,
                usage_page,
                0,
                0,
                caps.as_mut_ptr(),
                &mut count,
                self.preparsed,
            )
        };
        if status == HIDP_STATUS_USAGE_NOT_FOUND {
            return Ok(Vec::new());
        }
        if status != HIDP_STATUS_SUCCESS {
            return Err(IdentifyError::Os {
                call: "HidP_GetSpecificValueCaps",
                detail: format!("{:#010x}", status as u32),
            });
        }
        caps.truncate(count as usize);

        let mut fields = Vec::with_capacity(caps.len());
        for cap in &caps {
            // A usage range cannot describe the raw HID shape.
            if cap.IsRange != 0 {
                return Err(IdentifyError::UnsupportedUsage);
            }
            let usage = unsafe { cap.Anonymous.NotRange.Usage };

            fields.push(FieldAttributes {
                usage: Some(u32::from(usage)),
                logical_minimum: Some(cap.LogicalMin as u32),
                logical_maximum: Some(cap.LogicalMax as u32),
                report_size: Some(u32::from(cap.BitSize)),
                report_count: Some(u32::from(cap.ReportCount)),
            });
        }

        Ok(fields)
    }
}

impl HidHandle for RawHidDevice {
    fn identity(&mut self) -> Result<UsbIdentity, IdentifyError> {
        let mut attrs: HIDD_ATTRIBUTES = unsafe { core::mem::zeroed() };
        attrs.Size = core::mem::size_of::<HIDD_ATTRIBUTES>() as u32;

        if unsafe { HidD_GetAttributes(self.handle, &mut attrs) } == 0 {
            return Err(IdentifyError::Os {
                call: "HidD_GetAttributes",
                detail: last_error(),
            });
        }

        let interface_number = interface_number_from_path(&self.path);
        if interface_number == -1 {
            // Multi-interface keyboards always carry the MI segment; a
            // path without one is not something we should guess about.
            warn!(device = %self.path, "unknown USB interface number");
            return Err(IdentifyError::Disallowed);
        }

        Ok(UsbIdentity {
            vendor_id: attrs.VendorID,
            product_id: attrs.ProductID,
            interface_number,
        })
    }

    fn usage_reports(&mut self) -> Result<Vec<UsageReport>, IdentifyError> {
        if self.preparsed != 0 {
            unsafe { HidD_FreePreparsedData(self.preparsed) };
            self.preparsed = 0;
        }

        let mut preparsed: PHIDP_PREPARSED_DATA = 0;
        if unsafe { HidD_GetPreparsedData(self.handle, &mut preparsed) } == 0 || preparsed == 0 {
            return Err(IdentifyError::Os {
                call: "HidD_GetPreparsedData",
                detail: last_error(),
            });
        }
        self.preparsed = preparsed;

        let mut caps = MaybeUninit::<HIDP_CAPS>::uninit();
        let status = unsafe { HidP_GetCaps(self.preparsed, caps.as_mut_ptr()) };
        if status != HIDP_STATUS_SUCCESS {
            return Err(IdentifyError::Os {
                call: "HidP_GetCaps",
                detail: format!("{:#010x}", status as u32),
            });
        }
        let caps = unsafe { caps.assume_init() };

        self.output_report_len = caps.OutputReportByteLength;

        // One top-level collection per interface path on Windows; the caps
        // describe exactly that collection.
        let report = UsageReport {
            usage_page: u32::from(caps.UsagePage),
            usage: u32::from(caps.Usage),
            input: self.value_caps(HidP_Input, caps.UsagePage, caps.NumberInputValueCaps)?,
            output: self.value_caps(HidP_Output, caps.UsagePage, caps.NumberOutputValueCaps)?,
            feature: self.value_caps(HidP_Feature, caps.UsagePage, caps.NumberFeatureValueCaps)?,
        };

        Ok(vec![report])
    }

    fn output_frame_len(&self) -> Option<usize> {
        (self.output_report_len > 0).then_some(self.output_report_len as usize)
    }

    fn write_report(&mut self, data: &[u8], timeout: Duration) -> Result<usize, IdentifyError> {
        let event = unsafe { CreateEventW(null(), 1, 0, null()) };
        if event.is_null() {
            return Err(IdentifyError::Os {
                call: "CreateEventW",
                detail: last_error(),
            });
        }
        let _event = HandleGuard(event);

        let mut overlapped: OVERLAPPED = unsafe { core::mem::zeroed() };
        overlapped.hEvent = event;

        if unsafe {
            WriteFile(
                self.handle,
                data.as_ptr(),
                data.len() as u32,
                null_mut(),
                &mut overlapped,
            )
        } == 0
        {
            let error = unsafe { GetLastError() };
            if error != ERROR_IO_PENDING {
                return Err(IdentifyError::WriteFailed(format!(
                    "WriteFile: {error:#010x}"
                )));
            }
        }

        let wait = unsafe { WaitForSingleObject(event, timeout.as_millis() as u32) };
        if wait != WAIT_OBJECT_0 {
            // The kernel owns `data` until the cancelled I/O completes;
            // GetOverlappedResult below waits for that before we return.
            unsafe { CancelIo(self.handle) };
        }

        let mut written: u32 = 0;
        if unsafe { GetOverlappedResult(self.handle, &overlapped, &mut written, 1) } == 0 {
            let error = unsafe { GetLastError() };
            if wait == WAIT_TIMEOUT {
                return Err(IdentifyError::WriteTimeout);
            }
            return Err(IdentifyError::WriteFailed(format!(
                "GetOverlappedResult: {error:#010x}"
            )));
        }

        if wait == WAIT_TIMEOUT {
            return Err(IdentifyError::WriteTimeout);
        }

        Ok(written as usize)
    }

    fn display_name(&self) -> String {
        self.path.clone()
    }
}

/// Closes the wrapped event handle on every exit path.
struct HandleGuard(HANDLE);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// Open a Windows HID interface path for overlapped writes.
fn open_device_handle(path: &str) -> Result<HANDLE, IdentifyError> {
    // UTF-16 + NUL
    let wide: Vec<u16> = OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            null(),
            OPEN_EXISTING,
            FILE_FLAG_OVERLAPPED,
            null_mut(),
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        let error = unsafe { GetLastError() };
        if error == ERROR_ACCESS_DENIED {
            return Err(IdentifyError::Unavailable("access denied".to_string()));
        }
        return Err(IdentifyError::Unavailable(format!(
            "CreateFileW: {error:#010x}"
        )));
    }

    Ok(handle)
}

/// USB interface number from the `&mi_XX` segment of a device interface
/// path, or -1 when the path has none.
fn interface_number_from_path(path: &str) -> i16 {
    let lower = path.to_ascii_lowercase();
    let Some(pos) = lower.find("&mi_") else {
        return -1;
    };

    let hex = &lower.as_bytes()[pos + 4..];
    if hex.len() < 2 || !hex[..2].iter().all(u8::is_ascii_hexdigit) {
        return -1;
    }
    match std::str::from_utf8(&hex[..2])
        .ok()
        .and_then(|s| u8::from_str_radix(s, 16).ok())
    {
        Some(n) => i16::from(n),
        None => -1,
    }
}

fn last_error() -> String {
    format!("{:#010x}", unsafe { GetLastError() })
}

#[cfg(test)]
mod tests {
    use super::interface_number_from_path;

    #[test]
    fn interface_number_is_parsed_from_mi_segment() {
        let path = r"\\?\hid#vid_1209&pid_0001&mi_01#8&2f9a3c0&0&0000#{4d1e55b2-f16f-11cf-88cb-001111000030}";
        assert_eq!(interface_number_from_path(path), 1);
    }

    #[test]
    fn mi_segment_is_case_insensitive() {
        assert_eq!(interface_number_from_path(r"\\?\hid#vid&pid&MI_02#x"), 2);
    }

    #[test]
    fn paths_without_mi_segment_are_unknown() {
        assert_eq!(interface_number_from_path(r"\\?\hid#vid_1209&pid_0001#x"), -1);
        assert_eq!(interface_number_from_path(r"\\?\hid#&mi_"), -1);
        assert_eq!(interface_number_from_path(r"\\?\hid#&mi_zz#"), -1);
        assert_eq!(interface_number_from_path(r"\\?\hid#&mi_+5#"), -1);
    }
}
