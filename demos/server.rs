//! Pose server: RayNeo head pose -> WebSocket, plus a small JSON control API.
//!
//!   - Runs the bridge frame loop at ~90 Hz (buttons, double-click recenter)
//!   - Broadcasts pose JSON over WebSocket on :8080 to all connected clients
//!   - Serves GET /pose, GET /display, GET /status, POST /recenter on :8081
//!
//! Usage:
//!   cargo run --release --example server
//!   cargo run --release --example server -- --replay   # synthetic yaw, no hardware

use rayneo_bridge::channel::{self, ReplayBehavior};
use rayneo_bridge::display::NullEnumerator;
use rayneo_bridge::{
    Bridge, BridgeConfig, Button, Buttons, DisplayConfig, ImuSample, PoseReport, TelemetryEvent,
};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::Message;

const WS_PORT: u16 = 8080;
const API_PORT: u16 = 8081;

type WsClient = Arc<Mutex<tungstenite::WebSocket<TcpStream>>>;

fn main() {
    env_logger::init();

    let bridge = Arc::new(open_bridge());
    let clients: Arc<Mutex<Vec<WsClient>>> = Arc::new(Mutex::new(Vec::new()));

    let frame_bridge = bridge.clone();
    let frame_clients = clients.clone();
    std::thread::Builder::new()
        .name("rayneo-frames".into())
        .spawn(move || frame_loop(frame_bridge, frame_clients))
        .expect("Failed to spawn frame thread");

    let api_bridge = bridge.clone();
    std::thread::Builder::new()
        .name("rayneo-api".into())
        .spawn(move || api_loop(api_bridge))
        .expect("Failed to spawn API thread");

    let listener = TcpListener::bind(format!("0.0.0.0:{}", WS_PORT)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", WS_PORT, e);
        std::process::exit(1);
    });

    eprintln!();
    eprintln!("  RayNeo pose server");
    eprintln!("    ws://localhost:{}        pose stream", WS_PORT);
    eprintln!("    http://localhost:{}/pose  control API", API_PORT);
    eprintln!();

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[TCP] accept error: {}", e);
                continue;
            }
        };
        let clients = clients.clone();
        std::thread::spawn(move || handle_websocket(stream, clients));
    }
}

fn open_bridge() -> Bridge {
    let config = BridgeConfig::from_env();
    if !std::env::args().any(|a| a == "--replay") {
        return Bridge::init(config);
    }

    let (connector, handle) = channel::replay(ReplayBehavior::default());
    let feed = handle.sender();
    std::thread::spawn(move || {
        let mut tick: u32 = 1;
        while feed
            .send(TelemetryEvent::Imu(ImuSample::from_rad(
                [0.0, 15f32.to_radians(), 0.0],
                tick,
            )))
            .is_ok()
        {
            tick = tick.wrapping_add(10);
            std::thread::sleep(Duration::from_millis(10));
        }
    });
    Bridge::with_parts(config, Box::new(connector), Box::new(NullEnumerator))
}

/// Add the client to the broadcast list and wait for the frame loop to drop it.
fn handle_websocket(stream: TcpStream, clients: Arc<Mutex<Vec<WsClient>>>) {
    stream.set_nodelay(true).ok();
    // Write timeout keeps a slow client from stalling the frame loop
    stream.set_write_timeout(Some(Duration::from_secs(2))).ok();

    let ws = match tungstenite::accept(stream) {
        Ok(ws) => Arc::new(Mutex::new(ws)),
        Err(e) => {
            eprintln!("[WS] handshake error: {}", e);
            return;
        }
    };

    {
        let mut list = clients.lock().unwrap();
        list.push(ws.clone());
        eprintln!("[WS] Client connected ({} total)", list.len());
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
        let still_active = clients.lock().unwrap().iter().any(|c| Arc::ptr_eq(c, &ws));
        if !still_active {
            break;
        }
    }

    eprintln!("[WS] Client disconnected ({} total)", clients.lock().unwrap().len());
}

/// Host frame loop: buttons at ~90 Hz, WebSocket broadcast at ~60 Hz.
fn frame_loop(bridge: Arc<Bridge>, clients: Arc<Mutex<Vec<WsClient>>>) {
    let frame_interval = Duration::from_micros(11_111);
    let broadcast_interval = Duration::from_millis(16);
    let mut last_broadcast = Instant::now();
    let mut last_report = Instant::now();
    let mut frames: u64 = 0;
    let mut ws_sent: u64 = 0;

    loop {
        let frame = bridge.run_frame();
        let pose = bridge.pose();
        frames += 1;
        if frame.recenter {
            eprintln!("[BRIDGE] Recentered by double click");
        }

        let now = Instant::now();
        if now.duration_since(last_broadcast) >= broadcast_interval {
            last_broadcast = now;
            let msg = Message::Text(pose_json(&pose, frame.pressed));
            let mut list = clients.lock().unwrap();
            list.retain(|ws_arc| {
                let mut ws = ws_arc.lock().unwrap();
                ws.send(msg.clone()).is_ok()
            });
            drop(list);
            ws_sent += 1;
        }

        if now.duration_since(last_report) >= Duration::from_secs(5) {
            let elapsed = now.duration_since(last_report).as_secs_f64();
            eprintln!(
                "[BRIDGE] {} frames/s, {} ws/s, {} client(s), tracking={}",
                (frames as f64 / elapsed) as u32,
                (ws_sent as f64 / elapsed) as u32,
                clients.lock().unwrap().len(),
                bridge.is_tracking(),
            );
            frames = 0;
            ws_sent = 0;
            last_report = now;
        }

        std::thread::sleep(frame_interval);
    }
}

fn api_loop(bridge: Arc<Bridge>) {
    let server = match tiny_http::Server::http(format!("0.0.0.0:{}", API_PORT)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[API] Failed to bind port {}: {}", API_PORT, e);
            return;
        }
    };

    for request in server.incoming_requests() {
        let path = request.url().split('?').next().unwrap_or("/").to_string();
        let (status, body) = match (request.method(), path.as_str()) {
            (tiny_http::Method::Get, "/pose") => (200, pose_json(&bridge.pose(), Buttons::empty())),
            (tiny_http::Method::Get, "/display") => (200, display_json(&bridge.display_config())),
            (tiny_http::Method::Get, "/status") => {
                let b = &bridge;
                (
                    200,
                    format!(
                        "{{\"tracking\":{},\"sleeping\":{},\"active\":{}}}",
                        b.is_tracking(),
                        b.is_sleeping(),
                        b.is_active()
                    ),
                )
            }
            (tiny_http::Method::Post, "/recenter") => {
                bridge.recenter();
                (200, "{\"ok\":true}".to_string())
            }
            _ => (404, "{\"error\":\"not found\"}".to_string()),
        };

        let response = tiny_http::Response::from_string(body)
            .with_status_code(status)
            .with_header(
                tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .expect("static header"),
            )
            .with_header(
                tiny_http::Header::from_bytes(&b"Access-Control-Allow-Origin"[..], &b"*"[..])
                    .expect("static header"),
            );
        if let Err(e) = request.respond(response) {
            eprintln!("[API] respond error: {}", e);
        }
    }
}

fn pose_json(p: &PoseReport, pressed: Buttons) -> String {
    // Pressed buttons by input component path, e.g. ["/input/trigger/click"]
    let buttons = Button::ALL
        .iter()
        .filter(|b| pressed.contains(b.flag()))
        .map(|b| format!("\"{}\"", b.component_path()))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        concat!(
            "{{\"qx\":{:.5},\"qy\":{:.5},\"qz\":{:.5},\"qw\":{:.5},",
            "\"roll\":{:.1},\"pitch\":{:.1},\"yaw\":{:.1},\"y\":{:.2},",
            "\"valid\":{},\"buttons\":[{}],\"t\":{:.4}}}",
        ),
        p.quaternion[0],
        p.quaternion[1],
        p.quaternion[2],
        p.quaternion[3],
        p.euler_deg[0],
        p.euler_deg[1],
        p.euler_deg[2],
        p.position[1],
        p.pose_is_valid,
        buttons,
        p.host_timestamp_s,
    )
}

fn display_json(d: &DisplayConfig) -> String {
    format!(
        "{{\"x\":{},\"y\":{},\"width\":{},\"height\":{},\"renderWidth\":{},\"renderHeight\":{}}}",
        d.window_x, d.window_y, d.window_width, d.window_height, d.render_width, d.render_height,
    )
}
