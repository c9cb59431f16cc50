//! Identify the host OS to QMK keyboards over raw HID.
//!
//! Each device given on the command line is processed independently: a
//! failure on one never aborts the rest, and the process exit code is the
//! most severe per-device outcome.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use qmk_hid_identify::allow_list::device_allowed;
use qmk_hid_identify::backends;
use qmk_hid_identify::device::UsbIdentity;
use qmk_hid_identify::error::IdentifyError;
use qmk_hid_identify::session;

/// Send the host OS identity to QMK raw HID devices.
#[derive(Parser)]
#[command(name = "qmk-hid-identify", version, about)]
struct Cli {
    /// HID device paths (e.g. /dev/hidraw0).
    #[arg(required_unless_present = "list")]
    devices: Vec<PathBuf>,

    /// Enumerate HID interfaces and print one JSON line per interface.
    #[arg(long, conflicts_with = "devices")]
    list: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn identify_path(path: &Path) -> Result<(), IdentifyError> {
    let mut device = backends::open(path)?;
    session::identify(device.as_mut())
}

/// Dump every HID interface hidapi can see, with its identity and whether
/// the allow-list recognizes it.
fn list_devices() -> Result<(), IdentifyError> {
    let api = hidapi::HidApi::new().map_err(|e| IdentifyError::Os {
        call: "hid_enumerate",
        detail: e.to_string(),
    })?;

    for info in api.device_list() {
        let identity = UsbIdentity {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            interface_number: info.interface_number() as i16,
        };
        let line = serde_json::json!({
            "path": info.path().to_string_lossy(),
            "identity": identity,
            "product": info.product_string(),
            "allowed": device_allowed(identity.vendor_id, identity.product_id),
        });
        println!("{line}");
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if cli.list {
        return match list_devices() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(%err, "device enumeration failed");
                ExitCode::from(err.exit_code())
            }
        };
    }

    // Worst failure wins; one bad device never aborts the batch.
    let mut worst: Option<IdentifyError> = None;
    for path in &cli.devices {
        if let Err(err) = identify_path(path) {
            error!(device = %path.display(), %err, "identification failed");
            if worst.as_ref().map_or(true, |w| err.severity() > w.severity()) {
                worst = Some(err);
            }
        }
    }

    match worst {
        None => ExitCode::SUCCESS,
        Some(err) => ExitCode::from(err.exit_code()),
    }
}
