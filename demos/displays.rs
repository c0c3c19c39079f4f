//! List attached display identities and the resolved device window.
//!
//! Usage: cargo run --example displays

use rayneo_bridge::display::{self, DisplayResolver};
use rayneo_bridge::{BridgeConfig, Eye};

fn main() {
    env_logger::init();

    let config = BridgeConfig::from_env();
    let resolver = DisplayResolver::new(
        display::platform_enumerator(),
        config.display,
        config.fallback_display,
    );

    match resolver.enumerate() {
        Ok(identities) => {
            println!("Found {} display identit(ies):", identities.len());
            for (i, id) in identities.iter().enumerate() {
                println!(
                    "  [{}] {}  mfr={} product={} serial={} name='{}' preferred={}x{} made={}/w{}",
                    i,
                    id.source_handle,
                    id.manufacturer_code(),
                    id.product_code,
                    id.serial_number,
                    id.friendly_name,
                    id.preferred_width,
                    id.preferred_height,
                    id.manufacture_year,
                    id.manufacture_week,
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    println!();
    match resolver.find_by_identity() {
        Some(id) => match resolver.resolve_desktop_placement(&id) {
            Ok(rect) => println!("Target display '{}' placed at {:?}", id.source_handle, rect),
            Err(e) => println!("Target display '{}' found, placement: {}", id.source_handle, e),
        },
        None => println!(
            "Target display (product={} serial={:?}) not attached",
            resolver.target().product_code,
            resolver.target().serial_number
        ),
    }

    let cfg = resolver.display_config();
    println!("Window:     {:?}", cfg.window_bounds());
    println!("Render:     {}x{}", cfg.render_width, cfg.render_height);
    println!("Left eye:   {:?}", cfg.eye_viewport(Eye::Left));
    println!("Right eye:  {:?}", cfg.eye_viewport(Eye::Right));
}
