use hidapi::HidApi;
use qmk_hid_identify::allow_list::device_allowed;

fn main() {
    let api = HidApi::new().expect("init hidapi");
    for info in api.device_list() {
        println!(
            "VID:PID={:04x}:{:04x} up=0x{:02x} u=0x{:02x} iface={} allowed={} prod={:?} path={}",
            info.vendor_id(),
            info.product_id(),
            info.usage_page(),
            info.usage(),
            info.interface_number(),
            device_allowed(info.vendor_id(), info.product_id()),
            info.product_string(),
            info.path().to_string_lossy()
        );
    }
}
