//! Runpilot Library
//!
//! Client for a project/job/run service: uploads packages, artifacts and
//! results through a chunked three-phase protocol and downloads stored
//! objects with ranged reads when the storage backend supports them.
//!
//! # Features
//!
//! - **Chunked Upload**: register, upload every chunk, then finish
//! - **Ranged Download**: follows storage redirects and probes for range support
//! - **Push-Target Cache**: skips re-registering a project's package
//!
//! # Example
//!
//! ```no_run
//! use runpilot::config::Config;
//! use runpilot::routes::Routes;
//! use runpilot::transport::{HttpTransport, TransportConfig};
//! use runpilot::upload::{SourceFile, UploadEngine, UploadTarget};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("runpilot.yaml")?;
//!     let routes = Routes::new(&config.api.base_url)?;
//!     let transport = HttpTransport::new(TransportConfig::from_api(
//!         &config.api,
//!         config.api.token.clone(),
//!     ))?;
//!
//!     let engine = UploadEngine::new(transport, routes, config.upload.clone());
//!     let source = SourceFile::open("model.bin").await?;
//!     let outcome = engine
//!         .upload(source, &UploadTarget::artifact("run-suuid", "train"))
//!         .await;
//!     println!("{}", outcome.message);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use download::{DownloadOutcome, RangedDownloader};
pub use upload::{UploadEngine, UploadOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
