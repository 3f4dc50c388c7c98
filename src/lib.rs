//! # Rustuya Cloud
//!
//! Asynchronous Tuya OpenAPI (cloud) client: HMAC-signed requests, token
//! lifecycle management and an in-memory device registry kept in sync with
//! the cloud.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rustuya_cloud::{ApiClient, Command, Manager};
//!
//! # async fn run() -> rustuya_cloud::Result<()> {
//! let api = ApiClient::builder("CLIENT_ID", "SECRET").build()?;
//! let token = api.acquire_token().await?;
//!
//! let manager = Manager::new(api, token.uid);
//! manager.rebuild_cache().await?;
//! manager.dispatch_commands("DEVICE_ID", &[Command::new("switch_1", true)]).await?;
//! manager.refresh_status().await?;
//! # Ok(())
//! # }
//! ```
//!
#[macro_use]
pub mod macros;
pub mod client;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod home;
pub mod manager;
pub mod protocol;
pub mod token;

pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use device::{DeviceCapabilitySpec, DeviceRecord, StatusValue};
pub use error::{Result, TuyaError};
pub use home::Home;
pub use manager::{DeviceListener, Manager};
pub use protocol::{ApiResponse, Command, StreamType};
pub use token::{TokenInfo, TokenListener, TokenStore};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
