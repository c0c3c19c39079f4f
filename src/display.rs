//! Display geometry resolution.
//!
//! Finds the glasses' display by its identification record and resolves where
//! the OS placed it on the virtual desktop. The OS side sits behind
//! [`DisplayEnumerator`]; matching, retrying and fallback live here and are
//! shared by every platform.

use crate::config::DisplayTarget;
use crate::edid::DisplayIdentity;
use crate::types::{DisplayConfig, Rect, RetryPolicy};
use crate::{BridgeError, Result};

/// One output as the OS currently lays it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopOutput {
    /// OS per-output device record (monitor device id, RandR output id).
    pub device_id: String,
    /// Adapter or output name, for logs.
    pub name: String,
    pub rect: Rect,
    pub active: bool,
}

/// OS display enumeration.
pub trait DisplayEnumerator: Send + Sync {
    /// All identification records of currently attached displays.
    fn identities(&self) -> Result<Vec<DisplayIdentity>>;

    /// All desktop outputs with their current position and mode size.
    fn outputs(&self) -> Result<Vec<DesktopOutput>>;
}

/// Enumerator for platforms without a display backend. Always empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEnumerator;

impl DisplayEnumerator for NullEnumerator {
    fn identities(&self) -> Result<Vec<DisplayIdentity>> {
        Ok(Vec::new())
    }

    fn outputs(&self) -> Result<Vec<DesktopOutput>> {
        Ok(Vec::new())
    }
}

/// The enumerator for the build target.
pub fn platform_enumerator() -> Box<dyn DisplayEnumerator> {
    #[cfg(target_os = "linux")]
    {
        Box::new(crate::display_x11::X11Enumerator::new())
    }
    #[cfg(windows)]
    {
        Box::new(crate::display_win::WinEnumerator)
    }
    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(NullEnumerator)
    }
}

/// Model segment of an OS device id, compared case-insensitively.
///
/// `DISPLAY\TCL03D4\7&26951BDF&0&UID268` and `MONITOR\TCL03D4\{guid}\0001`
/// both yield `TCL03D4`; `X11:HDMI-1` yields `HDMI-1`.
pub fn model_key(device_id: &str) -> Option<&str> {
    let key = if device_id.contains('\\') {
        device_id.split('\\').nth(1)?
    } else {
        device_id.strip_prefix("X11:")?
    };
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// How an output was matched to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMatch {
    Model,
    Resolution,
    FirstActive,
}

/// Pick the output that shows `identity`, in priority order.
///
/// When per-output records exist only a model match counts, so a display the
/// OS has not placed yet is retried instead of guessed. Without records the
/// preferred resolution is matched, then the first active output is taken.
pub fn match_output<'a>(
    identity: &DisplayIdentity,
    outputs: &'a [DesktopOutput],
) -> Option<(&'a DesktopOutput, PlacementMatch)> {
    let active = || outputs.iter().filter(|o| o.active);

    let wanted = model_key(&identity.source_handle);
    let has_records = wanted.is_some() && active().any(|o| model_key(&o.device_id).is_some());
    if let Some(wanted) = wanted {
        let hit = active().find(|o| {
            model_key(&o.device_id).is_some_and(|k| k.eq_ignore_ascii_case(wanted))
        });
        if let Some(output) = hit {
            return Some((output, PlacementMatch::Model));
        }
    }
    if has_records {
        return None;
    }

    if identity.has_preferred_mode() {
        let hit = active().find(|o| {
            o.rect.width == identity.preferred_width && o.rect.height == identity.preferred_height
        });
        if let Some(output) = hit {
            return Some((output, PlacementMatch::Resolution));
        }
    }

    active().next().map(|o| (o, PlacementMatch::FirstActive))
}

/// Run `attempt` up to `policy.attempts()` times, sleeping between tries.
fn retry<T>(policy: &RetryPolicy, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
    let attempts = policy.attempts();
    for n in 1..=attempts {
        if let Some(found) = attempt() {
            return Some(found);
        }
        if n < attempts {
            std::thread::sleep(policy.interval);
        }
    }
    None
}

/// First attached display whose product code (and serial, if given) match.
pub fn find_by_identity(
    enumerator: &dyn DisplayEnumerator,
    product_code: u16,
    serial_number: Option<u32>,
) -> Option<DisplayIdentity> {
    match enumerator.identities() {
        Ok(all) => all
            .into_iter()
            .find(|id| id.matches(product_code, serial_number)),
        Err(e) => {
            log::debug!("Display identity enumeration failed: {}", e);
            None
        }
    }
}

/// [`find_by_identity`] retried across `policy`.
pub fn wait_for_identity(
    enumerator: &dyn DisplayEnumerator,
    product_code: u16,
    serial_number: Option<u32>,
    policy: &RetryPolicy,
) -> Option<DisplayIdentity> {
    retry(policy, || find_by_identity(enumerator, product_code, serial_number))
}

/// Desktop rectangle of `identity`, retried across `policy`.
pub fn resolve_desktop_placement(
    enumerator: &dyn DisplayEnumerator,
    identity: &DisplayIdentity,
    policy: &RetryPolicy,
) -> Result<Rect> {
    let found = retry(policy, || {
        let outputs = match enumerator.outputs() {
            Ok(outputs) => outputs,
            Err(e) => {
                log::debug!("Desktop output enumeration failed: {}", e);
                return None;
            }
        };
        match_output(identity, &outputs).map(|(output, how)| {
            log::debug!(
                "Display '{}' matched output '{}' by {:?}",
                identity.source_handle,
                output.name,
                how
            );
            output.rect
        })
    });
    found.ok_or(BridgeError::DisplayNotFound)
}

/// Combine what was resolved with the fallback, field group by field group.
///
/// Size comes from the preferred timing, origin from the desktop placement;
/// each falls back independently.
pub fn build_display_config(
    identity: Option<&DisplayIdentity>,
    placement: Option<Rect>,
    fallback: &DisplayConfig,
) -> DisplayConfig {
    let mut config = *fallback;
    if let Some(id) = identity.filter(|id| id.has_preferred_mode()) {
        config.window_width = id.preferred_width;
        config.window_height = id.preferred_height;
        config.render_width = id.preferred_width;
        config.render_height = id.preferred_height;
    }
    if let Some(rect) = placement {
        config.window_x = rect.x;
        config.window_y = rect.y;
    }
    config
}

/// Display resolution bound to one target identity and fallback.
pub struct DisplayResolver {
    enumerator: Box<dyn DisplayEnumerator>,
    target: DisplayTarget,
    fallback: DisplayConfig,
}

impl DisplayResolver {
    pub fn new(
        enumerator: Box<dyn DisplayEnumerator>,
        target: DisplayTarget,
        fallback: DisplayConfig,
    ) -> Self {
        Self {
            enumerator,
            target,
            fallback,
        }
    }

    pub fn target(&self) -> &DisplayTarget {
        &self.target
    }

    /// Every identification record currently visible.
    pub fn enumerate(&self) -> Result<Vec<DisplayIdentity>> {
        self.enumerator.identities()
    }

    pub fn find_by_identity(&self) -> Option<DisplayIdentity> {
        find_by_identity(
            self.enumerator.as_ref(),
            self.target.product_code,
            self.target.serial_number,
        )
    }

    pub fn resolve_desktop_placement(&self, identity: &DisplayIdentity) -> Result<Rect> {
        resolve_desktop_placement(self.enumerator.as_ref(), identity, &self.target.placement_wait)
    }

    /// Startup grace period: wait for the target display to be on the desktop.
    ///
    /// Returns the identity with `desktop` set, or `None` once the startup
    /// window passes. Callers continue either way.
    pub fn wait_for_desktop(&self) -> Option<DisplayIdentity> {
        let ready = retry(&self.target.startup_wait, || {
            let mut identity = self.find_by_identity()?;
            let rect = resolve_desktop_placement(
                self.enumerator.as_ref(),
                &identity,
                &RetryPolicy::once(),
            )
            .ok()?;
            identity.desktop = Some(rect);
            Some(identity)
        });
        match &ready {
            Some(id) => {
                if let Some(r) = id.desktop {
                    log::info!(
                        "Desktop output ready at ({},{}) {}x{}",
                        r.x,
                        r.y,
                        r.width,
                        r.height
                    );
                }
            }
            None => log::warn!("Desktop output not ready within grace period; continuing"),
        }
        ready
    }

    /// Window and render configuration for the device. Never fails.
    pub fn display_config(&self) -> DisplayConfig {
        let identity = wait_for_identity(
            self.enumerator.as_ref(),
            self.target.product_code,
            self.target.serial_number,
            &self.target.identity_wait,
        );

        let placement = match &identity {
            Some(id) => {
                log::info!(
                    "Display detected: handle='{}' product={} serial={} name='{}' mfr={}",
                    id.source_handle,
                    id.product_code,
                    id.serial_number,
                    id.friendly_name,
                    id.manufacturer_code()
                );
                match self.resolve_desktop_placement(id) {
                    Ok(rect) => {
                        log::info!("Using monitor desktop origin ({},{})", rect.x, rect.y);
                        Some(rect)
                    }
                    Err(e) => {
                        log::warn!("Desktop placement unresolved ({}); using fallback origin", e);
                        None
                    }
                }
            }
            None => {
                log::warn!(
                    "Display (product={} serial={:?}) not present; using fallback settings",
                    self.target.product_code,
                    self.target.serial_number
                );
                None
            }
        };

        let config = build_display_config(identity.as_ref(), placement, &self.fallback);
        log::info!(
            "Display config: window ({},{}) {}x{}, render {}x{}",
            config.window_x,
            config.window_y,
            config.window_width,
            config.window_height,
            config.render_width,
            config.render_height
        );
        config
    }
}
