//! List RayNeo HID interfaces visible to the OS.
//!
//! Usage: cargo run --example presence

use rayneo_bridge::{device, protocol};

fn main() {
    env_logger::init();

    match device::list_devices(protocol::VID, protocol::PID) {
        Ok(devices) => {
            println!("Found {} RayNeo HID interface(s):", devices.len());
            for (i, dev) in devices.iter().enumerate() {
                println!(
                    "  [{}] {:04X}:{:04X} if={} product='{}' manufacturer='{}' serial='{}' path={}",
                    i,
                    dev.vendor_id,
                    dev.product_id,
                    dev.interface_number,
                    dev.product.as_deref().unwrap_or("?"),
                    dev.manufacturer.as_deref().unwrap_or("?"),
                    dev.serial_number.as_deref().unwrap_or("?"),
                    dev.path,
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    // Non-zero exit when absent, for use in launch scripts.
    match device::find_first(protocol::VID, protocol::PID) {
        Ok(first) => println!("Primary interface: {}", first.path),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    }
}
