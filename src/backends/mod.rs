//! Device access backends.
//!
//! Implementations of [`HidHandle`](crate::device::HidHandle) for
//! platform-specific device access. [`open`] picks the preferred backend
//! for the current platform: the Win32 backend on Windows (overlapped
//! writes with a bounded wait, HIDP capability tables), hidapi everywhere
//! else (raw descriptor bytes via hidraw or the platform equivalent).

pub mod hid;

#[cfg(target_os = "windows")]
#[cfg_attr(docsrs, doc(cfg(target_os = "windows")))]
pub mod windows;

use std::path::Path;

use crate::device::HidHandle;
use crate::error::IdentifyError;

/// Open the device at `path` with the platform's preferred backend.
pub fn open(path: &Path) -> Result<Box<dyn HidHandle>, IdentifyError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::raw_hid::RawHidDevice::open(path)?))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Ok(Box::new(hid::HidapiDevice::open(path)?))
    }
}
