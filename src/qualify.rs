//! Raw-HID interface qualification.
//!
//! Decides whether a scanned device exposes the QMK raw HID report shape
//! and, if so, how many bytes one output report can carry.

use crate::error::IdentifyError;
use crate::report_desc::{FieldAttributes, UsageReport};

/// Vendor-defined usage page QMK raw HID lives on.
pub const RAW_USAGE_PAGE: u32 = 0xFF60;
/// Usage of the raw HID application collection.
pub const RAW_USAGE: u32 = 0x0061;

const RAW_IN_USAGE: u32 = 0x0062;
const RAW_OUT_USAGE: u32 = 0x0063;

/// Output-report capacity of a qualified interface, in fields. Fields are
/// 8 bits wide, so this is also the capacity in bytes (excluding the
/// report ID).
pub type ReportCapacity = u32;

/// Find the raw HID interface among the scanned reports.
///
/// The match is exact: one input field set (usage 0x62), one output field
/// set (usage 0x63), no feature fields, byte-wide values spanning 0..=255,
/// and a positive report count on both directions.
pub fn qualify(reports: &[UsageReport]) -> Result<ReportCapacity, IdentifyError> {
    for report in reports {
        if report.usage_page != RAW_USAGE_PAGE || report.usage != RAW_USAGE {
            continue;
        }
        if report.input.len() != 1 || report.output.len() != 1 || !report.feature.is_empty() {
            continue;
        }

        let output = &report.output[0];
        if field_matches(&report.input[0], RAW_IN_USAGE) && field_matches(output, RAW_OUT_USAGE) {
            if let Some(count) = output.report_count {
                return Ok(count);
            }
        }
    }

    Err(IdentifyError::UnsupportedUsage)
}

// All five attributes must be present; a platform that withheld one can
// never qualify by accident.
fn field_matches(field: &FieldAttributes, usage: u32) -> bool {
    field.usage == Some(usage)
        && field.logical_minimum == Some(0)
        && field.logical_maximum == Some(0xFF)
        && field.report_size == Some(8)
        && field.report_count.is_some_and(|count| count > 0)
}
