//! End-to-end identification of one device.
//!
//! Linear pipeline over an open handle: identity → interface gate +
//! allow-list → descriptor qualification → identify report. Every failure
//! is terminal for the device and maps to one
//! [`IdentifyError`](crate::error::IdentifyError) kind; the handle itself
//! is released by the backend's drop whatever happens here.

use std::time::Duration;

use tracing::{debug, info};

use crate::allow_list::device_allowed;
use crate::device::{HidHandle, UsbIdentity};
use crate::error::IdentifyError;
use crate::qualify::qualify;
use crate::report::{os_identity, send_identify};

/// USB interface QMK firmware exposes raw HID on.
const RAW_INTERFACE_NUMBER: i16 = 1;

/// Bounded wait for the report write before the I/O is abandoned.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Identify the host OS to one opened device.
pub fn identify<D>(device: &mut D) -> Result<(), IdentifyError>
where
    D: HidHandle + ?Sized,
{
    let name = device.display_name();

    let id = device.identity()?;
    check_allowed(&id)?;

    let reports = device.usage_reports()?;
    let capacity = qualify(&reports)?;
    debug!(device = %name, capacity, "raw HID interface qualified");

    let frame_len = device.output_frame_len();
    send_identify(capacity, os_identity(), frame_len, |data| {
        device.write_report(data, WRITE_TIMEOUT)
    })?;

    info!(device = %name, "report sent");
    Ok(())
}

/// Interface gate plus vendor allow-list. The raw interface index is
/// checked only when the platform knows it at all.
fn check_allowed(id: &UsbIdentity) -> Result<(), IdentifyError> {
    if id.interface_number == -1 || id.interface_number == RAW_INTERFACE_NUMBER {
        if device_allowed(id.vendor_id, id.product_id) {
            return Ok(());
        }
    }

    Err(IdentifyError::Disallowed)
}
