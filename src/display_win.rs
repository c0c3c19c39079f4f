//! Windows display enumeration.
//!
//! Identification records come from the monitor device class registry keys
//! (SetupAPI, `EDID` value); desktop placement comes from the GDI
//! adapter/monitor tree and the adapter's current display mode.

use crate::display::{DesktopOutput, DisplayEnumerator};
use crate::edid::DisplayIdentity;
use crate::types::Rect;
use crate::{BridgeError, Result};
use std::mem;
use windows::core::{w, PCWSTR};
use windows::Win32::Devices::DeviceAndDriverInstallation::{
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInfo, SetupDiGetClassDevsW,
    SetupDiGetDeviceInstanceIdW, SetupDiOpenDevRegKey, DICS_FLAG_GLOBAL, DIGCF_PRESENT,
    DIREG_DEV, GUID_DEVCLASS_MONITOR, HDEVINFO, SP_DEVINFO_DATA,
};
use windows::Win32::Foundation::{ERROR_SUCCESS, HWND};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayDevicesW, EnumDisplaySettingsExW, DEVMODEW, DISPLAY_DEVICEW,
    DISPLAY_DEVICE_ACTIVE, ENUM_CURRENT_SETTINGS, ENUM_DISPLAY_SETTINGS_FLAGS,
};
use windows::Win32::System::Registry::{
    RegCloseKey, RegQueryValueExW, HKEY, KEY_READ, REG_BINARY, REG_VALUE_TYPE,
};

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// Closes the device info set on drop.
struct DevInfoSet(HDEVINFO);

impl Drop for DevInfoSet {
    fn drop(&mut self) {
        unsafe {
            let _ = SetupDiDestroyDeviceInfoList(self.0);
        }
    }
}

/// Closes the registry key on drop.
struct RegKey(HKEY);

impl Drop for RegKey {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

fn read_registry_binary(key: &RegKey, name: PCWSTR) -> Option<Vec<u8>> {
    let mut kind = REG_VALUE_TYPE::default();
    let mut size = 0u32;
    let rc = unsafe { RegQueryValueExW(key.0, name, None, Some(&mut kind), None, Some(&mut size)) };
    if rc != ERROR_SUCCESS || kind != REG_BINARY || size == 0 {
        return None;
    }
    let mut data = vec![0u8; size as usize];
    let rc = unsafe {
        RegQueryValueExW(
            key.0,
            name,
            None,
            None,
            Some(data.as_mut_ptr()),
            Some(&mut size),
        )
    };
    if rc != ERROR_SUCCESS {
        return None;
    }
    data.truncate(size as usize);
    Some(data)
}

/// Enumerator over SetupAPI monitor records and the GDI display tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct WinEnumerator;

impl DisplayEnumerator for WinEnumerator {
    fn identities(&self) -> Result<Vec<DisplayIdentity>> {
        let set = unsafe {
            SetupDiGetClassDevsW(
                Some(&GUID_DEVCLASS_MONITOR),
                w!("DISPLAY"),
                HWND::default(),
                DIGCF_PRESENT,
            )
        }
        .map(DevInfoSet)
        .map_err(|e| BridgeError::DisplayEnumeration(format!("SetupDiGetClassDevs: {}", e)))?;

        let mut found = Vec::new();
        for index in 0.. {
            let mut data = SP_DEVINFO_DATA {
                cbSize: mem::size_of::<SP_DEVINFO_DATA>() as u32,
                ..Default::default()
            };
            if unsafe { SetupDiEnumDeviceInfo(set.0, index, &mut data) }.is_err() {
                break;
            }

            let mut instance = [0u16; 256];
            if unsafe { SetupDiGetDeviceInstanceIdW(set.0, &data, Some(&mut instance), None) }
                .is_err()
            {
                continue;
            }
            let instance_id = from_wide(&instance);

            let key = match unsafe {
                SetupDiOpenDevRegKey(
                    set.0,
                    &data,
                    DICS_FLAG_GLOBAL.0,
                    0,
                    DIREG_DEV,
                    KEY_READ.0,
                )
            } {
                Ok(key) => RegKey(key),
                Err(_) => continue,
            };

            match read_registry_binary(&key, w!("EDID")) {
                Some(edid) => match DisplayIdentity::parse(instance_id.clone(), &edid) {
                    Some(identity) => found.push(identity),
                    None => log::debug!("Short EDID for {}", instance_id),
                },
                None => log::trace!("No EDID value for {}", instance_id),
            }
        }
        Ok(found)
    }

    fn outputs(&self) -> Result<Vec<DesktopOutput>> {
        let mut outputs = Vec::new();

        let mut adapter = DISPLAY_DEVICEW {
            cb: mem::size_of::<DISPLAY_DEVICEW>() as u32,
            ..Default::default()
        };
        let mut adapter_index = 0;
        while unsafe { EnumDisplayDevicesW(PCWSTR::null(), adapter_index, &mut adapter, 0) }
            .as_bool()
        {
            adapter_index += 1;
            let active = adapter.StateFlags.0 & DISPLAY_DEVICE_ACTIVE.0 != 0;
            let adapter_name = PCWSTR(adapter.DeviceName.as_ptr());

            let rect = if active {
                let mut mode = DEVMODEW {
                    dmSize: mem::size_of::<DEVMODEW>() as u16,
                    ..Default::default()
                };
                let ok = unsafe {
                    EnumDisplaySettingsExW(
                        adapter_name,
                        ENUM_CURRENT_SETTINGS,
                        &mut mode,
                        ENUM_DISPLAY_SETTINGS_FLAGS(0),
                    )
                }
                .as_bool();
                if ok {
                    let pos = unsafe { mode.Anonymous1.Anonymous2.dmPosition };
                    Some(Rect {
                        x: pos.x,
                        y: pos.y,
                        width: mode.dmPelsWidth,
                        height: mode.dmPelsHeight,
                    })
                } else {
                    None
                }
            } else {
                None
            };

            let mut monitor = DISPLAY_DEVICEW {
                cb: mem::size_of::<DISPLAY_DEVICEW>() as u32,
                ..Default::default()
            };
            let mut monitor_index = 0;
            while unsafe { EnumDisplayDevicesW(adapter_name, monitor_index, &mut monitor, 0) }
                .as_bool()
            {
                monitor_index += 1;
                let device_id = from_wide(&monitor.DeviceID);
                if device_id.is_empty() {
                    continue;
                }
                outputs.push(DesktopOutput {
                    device_id,
                    name: from_wide(&adapter.DeviceName),
                    rect: rect.unwrap_or_default(),
                    active: rect.is_some(),
                });
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wide_stops_at_nul() {
        let mut buf = [0u16; 16];
        for (dst, src) in buf.iter_mut().zip("MONITOR\\X".encode_utf16()) {
            *dst = src;
        }
        assert_eq!(from_wide(&buf), "MONITOR\\X");
    }
}
