//! X11/RandR display enumeration (Linux).
//!
//! Each connected output that drives a CRTC is one [`DesktopOutput`] keyed
//! `X11:<output name>`; its EDID output property, when present, is one
//! [`DisplayIdentity`] with the same key, so matching is exact per output.

use crate::display::{DesktopOutput, DisplayEnumerator};
use crate::edid::{DisplayIdentity, EDID_BLOCK_LEN};
use crate::types::Rect;
use crate::{BridgeError, Result};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

/// Property names carrying the raw EDID, newest first.
const EDID_ATOMS: [&[u8]; 2] = [b"EDID", b"XFREE86_DDC_EDID"];

/// EDID property length to request, in 32-bit units.
const EDID_PROPERTY_LONGS: u32 = 128;

fn x11_error(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::DisplayEnumeration(format!("X11: {}", e))
}

struct ScannedOutput {
    name: String,
    rect: Rect,
    edid: Option<Vec<u8>>,
}

/// Enumerator that opens a short-lived X connection per call.
#[derive(Debug, Clone, Default)]
pub struct X11Enumerator {
    /// `None` uses `$DISPLAY`.
    display: Option<String>,
}

impl X11Enumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display(display: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
        }
    }

    fn connect(&self) -> Result<(RustConnection, usize)> {
        x11rb::connect(self.display.as_deref()).map_err(x11_error)
    }

    fn edid_atom(conn: &RustConnection) -> Result<Option<Atom>> {
        for name in EDID_ATOMS {
            // only_if_exists: an unknown name yields atom 0 instead of creating it
            let atom = conn
                .intern_atom(true, name)
                .map_err(x11_error)?
                .reply()
                .map_err(x11_error)?
                .atom;
            if atom != u32::from(AtomEnum::NONE) {
                return Ok(Some(atom));
            }
        }
        Ok(None)
    }

    fn scan(&self) -> Result<Vec<ScannedOutput>> {
        let (conn, screen_num) = self.connect()?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| x11_error("no such screen"))?
            .root;
        let resources = conn
            .randr_get_screen_resources_current(root)
            .map_err(x11_error)?
            .reply()
            .map_err(x11_error)?;
        let edid_atom = Self::edid_atom(&conn)?;

        let mut scanned = Vec::new();
        for &output in &resources.outputs {
            let info = match conn
                .randr_get_output_info(output, resources.config_timestamp)
                .map_err(x11_error)?
                .reply()
            {
                Ok(info) => info,
                Err(e) => {
                    log::debug!("RandR output {} vanished: {}", output, e);
                    continue;
                }
            };
            if info.connection != randr::Connection::CONNECTED || info.crtc == 0 {
                continue;
            }

            let crtc = match conn
                .randr_get_crtc_info(info.crtc, resources.config_timestamp)
                .map_err(x11_error)?
                .reply()
            {
                Ok(crtc) => crtc,
                Err(e) => {
                    log::debug!("RandR crtc {} vanished: {}", info.crtc, e);
                    continue;
                }
            };

            let edid = match edid_atom {
                Some(atom) => conn
                    .randr_get_output_property(
                        output,
                        atom,
                        AtomEnum::ANY,
                        0,
                        EDID_PROPERTY_LONGS,
                        false,
                        false,
                    )
                    .map_err(x11_error)?
                    .reply()
                    .ok()
                    .map(|prop| prop.data)
                    .filter(|data| data.len() >= EDID_BLOCK_LEN),
                None => None,
            };

            scanned.push(ScannedOutput {
                name: String::from_utf8_lossy(&info.name).into_owned(),
                rect: Rect {
                    x: crtc.x as i32,
                    y: crtc.y as i32,
                    width: crtc.width as u32,
                    height: crtc.height as u32,
                },
                edid,
            });
        }
        Ok(scanned)
    }
}

impl DisplayEnumerator for X11Enumerator {
    fn identities(&self) -> Result<Vec<DisplayIdentity>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter_map(|out| {
                let edid = out.edid?;
                DisplayIdentity::parse(format!("X11:{}", out.name), &edid)
            })
            .collect())
    }

    fn outputs(&self) -> Result<Vec<DesktopOutput>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|out| DesktopOutput {
                device_id: format!("X11:{}", out.name),
                name: out.name,
                rect: out.rect,
                active: out.rect.width > 0 && out.rect.height > 0,
            })
            .collect())
    }
}
