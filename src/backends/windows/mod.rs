#![cfg(target_os = "windows")]

//! Windows device backend.
//!
//! Raw HID access through the Win32 HID APIs directly rather than hidapi:
//! the HIDP capability tables stand in for descriptor scanning (user mode
//! cannot read raw descriptor bytes on Windows), and writes go through
//! overlapped I/O so they can be abandoned after a bounded wait.

pub mod raw_hid;

pub use raw_hid::RawHidDevice;
