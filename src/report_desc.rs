//! HID report descriptor scanning.
//!
//! Walks a raw report descriptor byte stream (HID 1.11 §6.2.2) and yields
//! one [`UsageReport`] per terminated Collection that had a Usage Page and
//! Usage in scope, carrying the Input/Output field attributes supplied
//! inside it. The walk follows the hidraw scanner lineage that QMK-era
//! firmware was tested against: strict about item framing, lenient about
//! item values that run off the end of the buffer.
//!
//! Two behaviors are deliberate compatibility quirks, not bugs:
//! - A Usage Page (Global) item that appears while already inside a
//!   Collection is ignored rather than recorded.
//! - A truncated item *value* reads as 0; only a truncated item *header*
//!   is a malformed descriptor.

use serde::Serialize;
use thiserror::Error;

/// Largest report descriptor the HID specification allows, in bytes.
pub const MAX_DESCRIPTOR_SIZE: usize = 4096;

/// The descriptor byte stream violates HID item framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("malformed report descriptor")]
pub struct MalformedDescriptor;

/// Value-capability attributes for one Input/Output/Feature main item.
///
/// Each attribute is independently optional: capability-table platforms
/// always fill all five, the stream scanner only fills what the descriptor
/// re-supplied since the last Main item. Matching logic must treat absence
/// as "cannot match", never as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldAttributes {
    pub usage: Option<u32>,
    pub logical_minimum: Option<u32>,
    pub logical_maximum: Option<u32>,
    /// Bits per field.
    pub report_size: Option<u32>,
    /// Fields per report.
    pub report_count: Option<u32>,
}

/// One matched (usage page, usage) pair at Collection scope.
///
/// `input`/`output` hold 0 or 1 entries when produced by [`UsageScanner`]
/// (the last captured main item wins) and exactly the enumerated value
/// caps when produced by a capability-table platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub usage_page: u32,
    pub usage: u32,
    pub input: Vec<FieldAttributes>,
    pub output: Vec<FieldAttributes>,
    pub feature: Vec<FieldAttributes>,
}

/// Lazy scanner over a descriptor byte stream.
///
/// Each `next()` call runs the item walk until it can emit one complete
/// [`UsageReport`], ends the iteration, or fails the whole scan with
/// [`MalformedDescriptor`]. Only the byte position survives between calls;
/// every other piece of parse state is per-call, so re-scanning the same
/// buffer with a fresh scanner yields an identical sequence.
pub struct UsageScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> UsageScanner<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        UsageScanner {
            bytes,
            pos: 0,
            done: false,
        }
    }
}

impl Iterator for UsageScanner<'_> {
    type Item = Result<UsageReport, MalformedDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Used to handle descriptors with no top-level Application
        // Collection at all.
        let initial = self.pos == 0;

        let mut report = UsageReport::default();
        let mut in_collection = false;
        let mut pair_ready = false;
        let mut page_found = false;

        // Local items (6.2.2.8) are consumed by each Main item; the found
        // flags gate capture, the pending struct holds the values.
        let mut pending = FieldAttributes::default();
        let mut usage_found = false;
        let mut min_found = false;
        let mut max_found = false;
        let mut count_found = false;
        let mut size_found = false;

        while self.pos < self.bytes.len() {
            let key = self.bytes[self.pos];
            let (data_len, key_size) = match item_size(self.bytes, self.pos) {
                Some(v) => v,
                None => {
                    self.done = true;
                    return Some(Err(MalformedDescriptor));
                }
            };

            match key & 0xFC {
                // Usage Page 6.2.2.7 (Global). Ignored once inside a
                // Collection; shipped firmware depends on this.
                0x04 => {
                    if !in_collection {
                        report.usage_page = item_value(self.bytes, self.pos, data_len);
                        page_found = true;
                    }
                }

                // Usage 6.2.2.8 (Local)
                0x08 => {
                    pending.usage = Some(item_value(self.bytes, self.pos, data_len));
                    usage_found = true;
                }

                // Logical Minimum; scoped per Main item here like the
                // Locals, matching the scanner lineage.
                0x14 => {
                    if in_collection {
                        pending.logical_minimum = Some(item_value(self.bytes, self.pos, data_len));
                        min_found = true;
                    }
                }

                // Logical Maximum
                0x24 => {
                    if in_collection {
                        pending.logical_maximum = Some(item_value(self.bytes, self.pos, data_len));
                        max_found = true;
                    }
                }

                // Report Size
                0x74 => {
                    if in_collection {
                        pending.report_size = Some(item_value(self.bytes, self.pos, data_len));
                        size_found = true;
                    }
                }

                // Report Count
                0x94 => {
                    if in_collection {
                        pending.report_count = Some(item_value(self.bytes, self.pos, data_len));
                        count_found = true;
                    }
                }

                // Collection 6.2.2.4 (Main). A Usage (Local) must be in
                // scope for the pair to become emittable.
                0xA0 => {
                    in_collection = true;
                    if page_found && usage_found {
                        report.usage = pending.usage.unwrap_or(0);
                        pair_ready = true;
                    }
                    usage_found = false;
                    min_found = false;
                    max_found = false;
                    count_found = false;
                    size_found = false;
                }

                // Input (Main)
                0x80 => {
                    if in_collection
                        && usage_found
                        && min_found
                        && max_found
                        && count_found
                        && size_found
                    {
                        report.input = vec![pending.clone()];
                    }
                }

                // Output (Main)
                0x90 => {
                    if in_collection
                        && usage_found
                        && min_found
                        && max_found
                        && count_found
                        && size_found
                    {
                        report.output = vec![pending.clone()];
                    }
                }

                // End Collection (Main)
                0xC0 => {
                    if in_collection && pair_ready {
                        // The cursor stays on the End Collection item; the
                        // next call re-reads it with fresh state.
                        return Some(Ok(report));
                    }
                    in_collection = false;
                    pair_ready = false;
                }

                _ => {}
            }

            // Any Main item consumes the Local items in scope.
            if matches!(key & 0xFC, 0x80 | 0x90 | 0xB0 | 0xC0) {
                usage_found = false;
                min_found = false;
                max_found = false;
                count_found = false;
                size_found = false;
            }

            self.pos += data_len + key_size;
        }

        self.done = true;

        // No top-level Application Collection, but a usable pair was found
        // on the first pass: report it anyway.
        if initial && page_found && usage_found {
            report.usage = pending.usage.unwrap_or(0);
            return Some(Ok(report));
        }

        None
    }
}

/// Scan a whole descriptor into its usage reports.
pub fn scan_reports(bytes: &[u8]) -> Result<Vec<UsageReport>, MalformedDescriptor> {
    UsageScanner::new(bytes).collect()
}

/// Data length and header length of the item at `pos`, per HID 1.11
/// §6.2.2.2 (short items) and §6.2.2.3 (long items). `None` when the
/// header itself is truncated.
fn item_size(bytes: &[u8], pos: usize) -> Option<(usize, usize)> {
    let key = bytes[pos];

    // Long item: the next byte holds the data length.
    if key & 0xF0 == 0xF0 {
        if pos + 1 < bytes.len() {
            return Some((bytes[pos + 1] as usize, 3));
        }
        return None;
    }

    // Short item: the bottom two bits encode the data length.
    match key & 0x3 {
        3 => Some((4, 1)),
        n => Some((n as usize, 1)),
    }
}

/// Little-endian item value starting one byte past the key. A value that
/// runs off the end of the buffer reads as 0; older firmware ships such
/// descriptors and the scanner lineage this follows accepts them.
fn item_value(bytes: &[u8], pos: usize, data_len: usize) -> u32 {
    if pos + data_len >= bytes.len() {
        return 0;
    }

    match data_len {
        1 => u32::from(bytes[pos + 1]),
        2 => u32::from(bytes[pos + 2]) << 8 | u32::from(bytes[pos + 1]),
        4 => u32::from_le_bytes([
            bytes[pos + 1],
            bytes[pos + 2],
            bytes[pos + 3],
            bytes[pos + 4],
        ]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{scan_reports, FieldAttributes, MalformedDescriptor, UsageScanner};

    /// The raw HID interface descriptor QMK firmware generates.
    static QMK_RAW_DESCRIPTOR: &[u8] = &[
        0x06, 0x60, 0xFF, // Usage Page (Vendor Defined 0xFF60)
        0x09, 0x61, // Usage (0x61)
        0xA1, 0x01, // Collection (Application)
        0x09, 0x62, //   Usage (0x62)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x95, 0x20, //   Report Count (32)
        0x75, 0x08, //   Report Size (8)
        0x81, 0x02, //   Input (Data, Variable, Absolute)
        0x09, 0x63, //   Usage (0x63)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x95, 0x20, //   Report Count (32)
        0x75, 0x08, //   Report Size (8)
        0x91, 0x02, //   Output (Data, Variable, Absolute)
        0xC0, // End Collection
    ];

    fn raw_field(usage: u32) -> FieldAttributes {
        FieldAttributes {
            usage: Some(usage),
            logical_minimum: Some(0),
            logical_maximum: Some(0xFF),
            report_size: Some(8),
            report_count: Some(32),
        }
    }

    #[test]
    fn scans_qmk_raw_interface() {
        let reports = scan_reports(QMK_RAW_DESCRIPTOR).unwrap();
        assert_eq!(reports.len(), 1);

        let report = &reports[0];
        assert_eq!(report.usage_page, 0xFF60);
        assert_eq!(report.usage, 0x61);
        assert_eq!(report.input, vec![raw_field(0x62)]);
        assert_eq!(report.output, vec![raw_field(0x63)]);
        assert!(report.feature.is_empty());
    }

    #[test]
    fn scans_composite_descriptor_in_order() {
        // Boot keyboard collection followed by the raw interface; each
        // top-level collection re-states its usage page.
        let mut bytes = vec![
            0x05, 0x01, // Usage Page (Generic Desktop)
            0x09, 0x06, // Usage (Keyboard)
            0xA1, 0x01, // Collection (Application)
            0x09, 0x06, //   Usage
            0x15, 0x00, //   Logical Minimum (0)
            0x25, 0x01, //   Logical Maximum (1)
            0x95, 0x08, //   Report Count (8)
            0x75, 0x01, //   Report Size (1)
            0x81, 0x02, //   Input
            0xC0, // End Collection
        ];
        bytes.extend_from_slice(QMK_RAW_DESCRIPTOR);

        let reports = scan_reports(&bytes).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!((reports[0].usage_page, reports[0].usage), (0x01, 0x06));
        assert_eq!((reports[1].usage_page, reports[1].usage), (0xFF60, 0x61));
    }

    #[test]
    fn truncated_long_item_header_is_malformed() {
        // 0xFE opens a long item but the length byte is missing.
        let bytes = [0x06, 0x60, 0xFF, 0xFE];
        let mut scanner = UsageScanner::new(&bytes);
        assert_eq!(scanner.next(), Some(Err(MalformedDescriptor)));
        // The failure ends the iteration.
        assert_eq!(scanner.next(), None);
    }

    #[test]
    fn truncated_item_value_reads_as_zero() {
        // The usage page item claims two data bytes but only one remains.
        // That is tolerated (the value reads as 0), not malformed.
        let bytes = [0x06, 0x60];
        assert_eq!(scan_reports(&bytes).unwrap(), vec![]);
    }

    #[test]
    fn emits_pair_without_any_collection() {
        let bytes = [0x06, 0x60, 0xFF, 0x09, 0x61];
        let reports = scan_reports(&bytes).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].usage_page, 0xFF60);
        assert_eq!(reports[0].usage, 0x61);
        assert!(reports[0].input.is_empty());
        assert!(reports[0].output.is_empty());
    }

    #[test]
    fn no_usage_pair_means_no_reports() {
        let bytes = [0x06, 0x60, 0xFF];
        assert_eq!(scan_reports(&bytes).unwrap(), vec![]);
        assert_eq!(scan_reports(&[]).unwrap(), vec![]);
    }

    #[test]
    fn usage_page_inside_collection_is_ignored() {
        let bytes = [
            0x06, 0x60, 0xFF, // Usage Page (0xFF60)
            0x09, 0x61, // Usage (0x61)
            0xA1, 0x01, // Collection (Application)
            0x05, 0x01, //   Usage Page (Generic Desktop) -- ignored
            0x09, 0x62, //   Usage (0x62)
            0x15, 0x00, 0x26, 0xFF, 0x00, 0x95, 0x20, 0x75, 0x08, //
            0x81, 0x02, //   Input
            0xC0, // End Collection
        ];
        let reports = scan_reports(&bytes).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].usage_page, 0xFF60);
    }

    #[test]
    fn main_items_consume_local_usage() {
        // The collection consumes the Usage local item; with no Usage
        // re-supplied before the Input item, nothing is captured.
        let bytes = [
            0x06, 0x60, 0xFF, // Usage Page
            0x09, 0x61, // Usage
            0xA1, 0x01, // Collection
            0x15, 0x00, 0x26, 0xFF, 0x00, 0x95, 0x20, 0x75, 0x08, //
            0x81, 0x02, // Input (no Usage in scope)
            0xC0, // End Collection
        ];
        let reports = scan_reports(&bytes).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].input.is_empty());
    }

    #[test]
    fn partial_attribute_set_is_not_captured() {
        // Report Size never supplied: the Input item must capture nothing.
        let bytes = [
            0x06, 0x60, 0xFF, //
            0x09, 0x61, //
            0xA1, 0x01, //
            0x09, 0x62, //
            0x15, 0x00, 0x26, 0xFF, 0x00, 0x95, 0x20, //
            0x81, 0x02, //
            0xC0, //
        ];
        let reports = scan_reports(&bytes).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].input.is_empty());
    }

    #[test]
    fn rescanning_yields_identical_sequence() {
        let first = scan_reports(QMK_RAW_DESCRIPTOR).unwrap();
        let second = scan_reports(QMK_RAW_DESCRIPTOR).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn four_byte_item_values_decode_little_endian() {
        let bytes = [
            0x07, 0x60, 0xFF, 0x00, 0x00, // Usage Page, 4-byte value
            0x0B, 0x61, 0x00, 0x00, 0x00, // Usage, 4-byte value
            0xA1, 0x01, //
            0xC0, //
        ];
        let reports = scan_reports(&bytes).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].usage_page, 0xFF60);
        assert_eq!(reports[0].usage, 0x61);
    }
}
