//! Stream head poses to stdout while running the per-frame button logic.
//!
//! Usage:
//!   cargo run --example stream                       # real device (needs --features vendor-sdk)
//!   cargo run --example stream -- --replay           # synthetic slow yaw, no hardware
//! Press Ctrl+C to stop.

use rayneo_bridge::channel::{self, ReplayBehavior};
use rayneo_bridge::display::NullEnumerator;
use rayneo_bridge::{Bridge, BridgeConfig, BridgeError, ImuSample, TelemetryEvent};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let replay = std::env::args().any(|a| a == "--replay");
    let config = BridgeConfig::from_env();

    let bridge = if replay {
        let (connector, handle) = channel::replay(ReplayBehavior::default());
        let feed = handle.sender();
        std::thread::spawn(move || {
            let mut tick: u32 = 1;
            // 10 deg/s yaw at 100 Hz
            while feed
                .send(TelemetryEvent::Imu(ImuSample::from_rad(
                    [0.0, 10f32.to_radians(), 0.0],
                    tick,
                )))
                .is_ok()
            {
                tick = tick.wrapping_add(10);
                std::thread::sleep(Duration::from_millis(10));
            }
        });
        Bridge::with_parts(config, Box::new(connector), Box::new(NullEnumerator))
    } else {
        Bridge::init(config)
    };

    let display = bridge.display_config();
    println!("Tracking: {}", bridge.is_tracking());
    println!("Window:   {:?}", display.window_bounds());
    println!();

    if let Err(e) = bridge.activate() {
        eprintln!("Failed to start pose producer: {}", e);
        std::process::exit(1);
    }

    println!("Streaming poses (Ctrl+C to stop)...");

    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let frame = bridge.run_frame();
        if frame.recenter {
            println!("-- recentered --");
        }

        match bridge.next_pose(Duration::from_secs(2)) {
            Ok(p) => {
                count += 1;

                // Print every ~100th pose to avoid flooding the terminal
                if count % 100 == 1 {
                    println!(
                        concat!(
                            "t={:<10.3} quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  ",
                            "rpy=[{:+6.1}, {:+6.1}, {:+6.1}]  valid={} buttons={:?}",
                        ),
                        p.host_timestamp_s,
                        p.quaternion[0], p.quaternion[1], p.quaternion[2], p.quaternion[3],
                        p.euler_deg[0], p.euler_deg[1], p.euler_deg[2],
                        p.pose_is_valid,
                        frame.pressed,
                    );
                }

                // Report rate every 3 seconds
                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(3) {
                    let elapsed = now.duration_since(last_report).as_secs_f64();
                    println!("--- {:.0} poses/s ---", count as f64 / elapsed);
                    count = 0;
                    last_report = now;
                }
            }
            Err(BridgeError::Timeout) => {
                eprintln!("No pose for 2s");
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
}
