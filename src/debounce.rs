//! Notification-to-button debouncing.
//!
//! The device reports a click as a single notification pulse. The event loop
//! latches it into an edge flag ([`NotificationLatch`]); once per host frame
//! the [`Debouncer`] consumes the edge and turns it into a fixed-length hold
//! that the host reads as a level. The app-menu button additionally waits for
//! a possible second click, which recenters instead of pressing.

use crate::config::DebounceConfig;
use crate::protocol::Notification;
use crate::types::{Button, Buttons, FrameReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Edge flags and device state written by the event loop.
///
/// Lock-free: the event loop sets, the host frame consumes.
#[derive(Debug, Default)]
pub struct NotificationLatch {
    pending: [AtomicBool; Button::COUNT],
    sleeping: AtomicBool,
    imu_streaming: AtomicBool,
}

impl NotificationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a vendor notification code and record its effect.
    pub fn on_notification(&self, code: u32) -> Notification {
        let notification = Notification::from_code(code);
        match notification {
            Notification::SleepEnter => {
                self.sleeping.store(true, Ordering::Release);
                log::info!("Sleep state entered");
            }
            Notification::SleepExit => {
                self.sleeping.store(false, Ordering::Release);
                log::info!("Wake state");
            }
            Notification::ImuOn => {
                self.imu_streaming.store(true, Ordering::Release);
                log::debug!("IMU ON notify");
            }
            Notification::ImuOff => {
                self.imu_streaming.store(false, Ordering::Release);
                log::debug!("IMU OFF notify");
            }
            Notification::Unrecognized(code) => {
                log::debug!("Ignoring unrecognized notification 0x{:X}", code);
            }
            _ => {
                if let Some(button) = notification.button() {
                    self.latch(button);
                    log::debug!("{:?} -> {:?} click", notification, button);
                }
            }
        }
        notification
    }

    pub fn latch(&self, button: Button) {
        self.pending[button.index()].store(true, Ordering::Release);
    }

    /// Return and clear the pending edge for `button`. True at most once per latch.
    pub fn consume(&self, button: Button) -> bool {
        self.pending[button.index()].swap(false, Ordering::AcqRel)
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping.load(Ordering::Acquire)
    }

    pub fn imu_streaming(&self) -> bool {
        self.imu_streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_imu_streaming(&self, on: bool) {
        self.imu_streaming.store(on, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClickArbiter {
    waiting_for_second_click: bool,
    last_click_time: Option<Instant>,
    single_click_delay_frames: u32,
}

/// Per-frame button state machine. Owned by the host frame thread.
#[derive(Debug)]
pub struct Debouncer {
    latch: Arc<NotificationLatch>,
    config: DebounceConfig,
    frames_remaining: [u32; Button::COUNT],
    app_menu: ClickArbiter,
}

impl Debouncer {
    pub fn new(latch: Arc<NotificationLatch>, config: DebounceConfig) -> Self {
        Self {
            latch,
            config,
            frames_remaining: [0; Button::COUNT],
            app_menu: ClickArbiter::default(),
        }
    }

    pub fn latch(&self) -> &Arc<NotificationLatch> {
        &self.latch
    }

    pub fn on_notification(&self, code: u32) -> Notification {
        self.latch.on_notification(code)
    }

    pub fn consume(&self, button: Button) -> bool {
        self.latch.consume(button)
    }

    /// Advance one host frame.
    pub fn tick(&mut self) -> FrameReport {
        self.tick_at(Instant::now())
    }

    /// Advance one host frame with an explicit wall-clock reading.
    ///
    /// A hold started this frame reads as pressed for `hold_frames - 1`
    /// frames, this one included; the countdown runs after edges are taken.
    pub fn tick_at(&mut self, now: Instant) -> FrameReport {
        let mut report = FrameReport::default();

        for button in [Button::System, Button::Trigger, Button::Grip] {
            if self.latch.consume(button) {
                log::debug!("{:?} button event - starting press", button);
                self.hold(button);
            }
        }

        if self.latch.consume(Button::AppMenu) {
            report.recenter = self.app_menu_click(now);
        }

        let arbiter = &mut self.app_menu;
        if arbiter.single_click_delay_frames > 0 {
            arbiter.single_click_delay_frames -= 1;
            if arbiter.single_click_delay_frames == 0 && arbiter.waiting_for_second_click {
                arbiter.waiting_for_second_click = false;
                log::debug!("AppMenu single click");
                self.hold(Button::AppMenu);
            }
        }

        for frames in self.frames_remaining.iter_mut() {
            *frames = frames.saturating_sub(1);
        }

        report.pressed = self.pressed();
        report
    }

    /// Returns true when this click completes a double click.
    fn app_menu_click(&mut self, now: Instant) -> bool {
        let arbiter = &mut self.app_menu;
        let within_window = arbiter.waiting_for_second_click
            && arbiter
                .last_click_time
                .is_some_and(|t| {
                    now.saturating_duration_since(t) < self.config.double_click_window
                });

        if within_window {
            log::info!("AppMenu double click - recenter");
            *arbiter = ClickArbiter::default();
            return true;
        }

        // Too late to pair with the previous click, which still owes its single press.
        let owed_single = arbiter.waiting_for_second_click;
        arbiter.waiting_for_second_click = true;
        arbiter.last_click_time = Some(now);
        arbiter.single_click_delay_frames = self.config.single_click_delay_frames.max(1);
        if owed_single {
            self.hold(Button::AppMenu);
        }
        log::debug!("AppMenu click - waiting for potential double click");
        false
    }

    /// Start (or restart) a hold. Holds do not stack.
    fn hold(&mut self, button: Button) {
        self.frames_remaining[button.index()] = self.config.hold_frames;
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.frames_remaining[button.index()] > 0
    }

    pub fn pressed(&self) -> Buttons {
        Button::ALL
            .iter()
            .filter(|b| self.is_pressed(**b))
            .fold(Buttons::empty(), |acc, b| acc | b.flag())
    }

    pub fn is_waiting_for_second_click(&self) -> bool {
        self.app_menu.waiting_for_second_click
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::*;
    use std::time::Duration;

    fn debouncer() -> Debouncer {
        Debouncer::new(Arc::new(NotificationLatch::new()), DebounceConfig::default())
    }

    #[test]
    fn test_simple_button_holds_for_n_frames() {
        for (code, button) in [
            (NOTIFY_BUTTON, Button::System),
            (NOTIFY_BUTTON_VOLUME_UP, Button::Trigger),
            (NOTIFY_BUTTON_VOLUME_DOWN, Button::Grip),
        ] {
            let mut d = debouncer();
            let n = d.config.hold_frames;
            d.on_notification(code);
            for frame in 1..=n + 5 {
                d.tick();
                assert_eq!(d.is_pressed(button), frame < n, "frame {} of {:?}", frame, button);
            }
        }
    }

    #[test]
    fn test_renotify_restarts_hold_without_stacking() {
        let mut d = debouncer();
        d.on_notification(NOTIFY_BUTTON_VOLUME_UP);
        for _ in 0..10 {
            d.tick();
        }
        d.on_notification(NOTIFY_BUTTON_VOLUME_UP);
        d.on_notification(NOTIFY_BUTTON_VOLUME_UP);
        let mut held = 0;
        while d.tick().pressed.contains(Buttons::TRIGGER) {
            held += 1;
        }
        assert_eq!(held, 29);
    }

    #[test]
    fn test_consume_is_exactly_once() {
        let d = debouncer();
        assert!(!d.consume(Button::Grip));
        d.on_notification(NOTIFY_BUTTON_VOLUME_DOWN);
        assert!(d.consume(Button::Grip));
        assert!(!d.consume(Button::Grip));
        assert!(!d.consume(Button::Grip));
        d.on_notification(NOTIFY_BUTTON_VOLUME_DOWN);
        assert!(d.consume(Button::Grip));
    }

    #[test]
    fn test_is_pressed_is_idempotent() {
        let mut d = debouncer();
        d.on_notification(NOTIFY_BUTTON);
        d.tick();
        for _ in 0..10 {
            assert!(d.is_pressed(Button::System));
        }
        assert_eq!(d.pressed(), Buttons::SYSTEM);
    }

    #[test]
    fn test_double_click_recenters_without_press() {
        let mut d = debouncer();
        let t0 = Instant::now();
        let mut recenters = 0;
        let mut press_starts = 0;
        let mut was_pressed = false;

        for frame in 0..200u64 {
            if frame == 0 || frame == 10 {
                d.on_notification(NOTIFY_BUTTON_BRIGHTNESS);
            }
            let report = d.tick_at(t0 + Duration::from_millis(frame * 5));
            recenters += report.recenter as u32;
            let pressed = report.pressed.contains(Buttons::APP_MENU);
            press_starts += (pressed && !was_pressed) as u32;
            was_pressed = pressed;
        }
        assert_eq!(recenters, 1);
        assert_eq!(press_starts, 0);
        assert!(!d.is_waiting_for_second_click());
    }

    #[test]
    fn test_single_click_is_deferred_then_held() {
        let mut d = debouncer();
        let t0 = Instant::now();
        let delay = d.config.single_click_delay_frames as u64;
        let mut recenters = 0;
        let mut press_starts = 0;
        let mut first_pressed_frame = None;
        let mut was_pressed = false;

        d.on_notification(NOTIFY_BUTTON_BRIGHTNESS);
        for frame in 1..=200u64 {
            let report = d.tick_at(t0 + Duration::from_millis(frame * 5));
            recenters += report.recenter as u32;
            let pressed = report.pressed.contains(Buttons::APP_MENU);
            if pressed && !was_pressed {
                press_starts += 1;
                first_pressed_frame.get_or_insert(frame);
            }
            was_pressed = pressed;
        }
        assert_eq!(recenters, 0);
        assert_eq!(press_starts, 1);
        assert_eq!(first_pressed_frame, Some(delay));
    }

    #[test]
    fn test_late_second_click_emits_first_single() {
        let mut d = debouncer();
        let t0 = Instant::now();
        d.on_notification(NOTIFY_BUTTON_BRIGHTNESS);
        d.tick_at(t0);
        d.on_notification(NOTIFY_BUTTON_BRIGHTNESS);
        let report = d.tick_at(t0 + Duration::from_millis(500));
        assert!(!report.recenter);
        assert!(report.pressed.contains(Buttons::APP_MENU));
        assert!(d.is_waiting_for_second_click());
    }

    #[test]
    fn test_sleep_and_imu_flags() {
        let latch = NotificationLatch::new();
        assert!(!latch.is_sleeping());
        assert_eq!(latch.on_notification(NOTIFY_SLEEP), Notification::SleepEnter);
        assert!(latch.is_sleeping());
        latch.on_notification(NOTIFY_WAKE);
        assert!(!latch.is_sleeping());

        latch.on_notification(NOTIFY_IMU_ON);
        assert!(latch.imu_streaming());
        latch.on_notification(NOTIFY_IMU_OFF);
        assert!(!latch.imu_streaming());
    }

    #[test]
    fn test_unrecognized_code_changes_nothing() {
        let mut d = debouncer();
        assert_eq!(d.on_notification(0x7777), Notification::Unrecognized(0x7777));
        assert_eq!(d.tick().pressed, Buttons::empty());
        assert!(Button::ALL.iter().all(|b| !d.consume(*b)));
        assert!(!d.latch().is_sleeping());
    }
}
