/**
 * Cloud Polling Example
 *
 * Authenticates against the Tuya OpenAPI with credentials taken from the
 * environment (TUYA_CLIENT_ID, TUYA_SECRET, optionally TUYA_API_URL and
 * TUYA_SCHEMA), builds the device cache and polls status periodically.
 *
 * Run with RUST_LOG=debug to see every signed request.
 */
use rustuya_cloud::{ApiClientBuilder, ClientConfig, DeviceListener, DeviceRecord, Manager, TokenInfo};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

struct PrintListener;

impl DeviceListener for PrintListener {
    fn update_device(&self, device: &DeviceRecord) {
        let mut codes: Vec<_> = device.status.iter().collect();
        codes.sort_by(|a, b| a.0.cmp(b.0));
        println!("[UPDATE] {} ({})", device.name, device.id);
        for (code, value) in codes {
            println!("    {code} = {}", value.to_json());
        }
    }

    fn add_device(&self, device: &DeviceRecord) {
        println!(
            "[ADDED] {} ({}) category={} online={} functions={}",
            device.name,
            device.id,
            device.category,
            device.online,
            device.functions.len()
        );
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("--- Rustuya Cloud - Polling Example ---");

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            return;
        }
    };

    let api = match ApiClientBuilder::from_config(config)
        .token_listener(|token: &TokenInfo| {
            // A real host would persist this snapshot and restore it on start.
            println!("[TOKEN] New token for uid {}, expires at {}", token.uid, token.expires_at);
        })
        .build()
    {
        Ok(api) => api,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            return;
        }
    };

    let token = match api.acquire_token().await {
        Ok(token) => token,
        Err(e) => {
            eprintln!("[ERROR] Authentication failed: {e}");
            return;
        }
    };

    let manager = Manager::with_concurrency(api.clone(), token.uid, 4);
    manager.add_device_listener(Arc::new(PrintListener));

    if let Err(e) = manager.rebuild_cache().await {
        eprintln!("[ERROR] Could not load devices: {e}");
        return;
    }
    println!("[INFO] {} devices loaded", manager.len());

    for round in 1..=3 {
        sleep(Duration::from_secs(10)).await;
        println!("[INFO] Poll round {round}");
        if let Err(e) = manager.refresh_status().await {
            eprintln!("[ERROR] Polling stopped: {e}");
            break;
        }
    }

    api.close();
    println!("[INFO] Done.");
}
