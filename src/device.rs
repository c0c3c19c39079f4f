use crate::{BridgeError, Result};
use hidapi::HidApi;

/// One HID interface exposed by the glasses.
///
/// The telemetry channel talks to the device through the vendor library; this
/// is only a presence and diagnostics check that needs no vendor code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidInterface {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// -1 on macOS IOKit, which does not report interface numbers.
    pub interface_number: i32,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl HidInterface {
    fn from_hidapi(d: &hidapi::DeviceInfo) -> Self {
        Self {
            path: d.path().to_string_lossy().into_owned(),
            vendor_id: d.vendor_id(),
            product_id: d.product_id(),
            interface_number: d.interface_number(),
            manufacturer: d.manufacturer_string().map(str::to_string),
            product: d.product_string().map(str::to_string),
            serial_number: d.serial_number().map(str::to_string),
        }
    }
}

fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // Shared opens so the vendor library can still claim the device.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

/// Interfaces matching `vendor_id`/`product_id`, deduplicated by path.
pub(crate) fn select<I>(interfaces: I, vendor_id: u16, product_id: u16) -> Vec<HidInterface>
where
    I: IntoIterator<Item = HidInterface>,
{
    let mut found: Vec<HidInterface> = Vec::new();
    for iface in interfaces {
        if iface.vendor_id != vendor_id || iface.product_id != product_id {
            continue;
        }
        if found.iter().any(|f| f.path == iface.path) {
            continue;
        }
        found.push(iface);
    }
    found
}

/// List connected HID interfaces of the target device.
pub fn list_devices(vendor_id: u16, product_id: u16) -> Result<Vec<HidInterface>> {
    let api = create_hid_api()?;
    let all = api.device_list().map(HidInterface::from_hidapi);
    Ok(select(all, vendor_id, product_id))
}

/// First HID interface of the target device, or `DeviceNotFound`.
pub fn find_first(vendor_id: u16, product_id: u16) -> Result<HidInterface> {
    list_devices(vendor_id, product_id)?
        .into_iter()
        .next()
        .ok_or(BridgeError::DeviceNotFound {
            vid: vendor_id,
            pid: product_id,
        })
}

/// Log whether the device is visible on the HID bus. Never fails.
pub fn log_presence(vendor_id: u16, product_id: u16) -> bool {
    match list_devices(vendor_id, product_id) {
        Ok(found) if !found.is_empty() => {
            for iface in &found {
                log::info!(
                    "HID interface {} ({} {}) at {}",
                    iface.interface_number,
                    iface.manufacturer.as_deref().unwrap_or("?"),
                    iface.product.as_deref().unwrap_or("?"),
                    iface.path
                );
            }
            true
        }
        Ok(_) => {
            log::warn!(
                "No HID interface for VID={:04X} PID={:04X}",
                vendor_id,
                product_id
            );
            false
        }
        Err(e) => {
            log::warn!("HID enumeration failed: {}", e);
            false
        }
    }
}
