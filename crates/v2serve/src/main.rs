//! v2serve - Main Entry Point
//!
//! Serves the KServe V2 inference protocol for a fixed softmax classifier.
//!
//! Usage:
//!     v2serve --port 8080
//!     v2serve --address 127.0.0.1:9000 --seed 7

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use v2serve::config::{ModelConfig, ServerConfig};
use v2serve::{http, Error, InferenceService, ModelInfo, ModelServer, Registry};
use v2serve_core::SeededNormal;

#[derive(Parser, Debug)]
#[command(name = "v2serve")]
#[command(about = "KServe V2-style model inference server")]
#[command(version)]
struct Args {
    /// HTTP server port
    #[arg(short, long, default_value_t = v2serve::config::DEFAULT_PORT)]
    port: u16,

    /// HTTP server address (overrides port)
    #[arg(short, long)]
    address: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seed for the random weight matrix
    #[arg(long, default_value_t = v2serve::config::DEFAULT_SEED)]
    seed: u64,

    /// Model name reported by the API
    #[arg(long, default_value = v2serve::config::DEFAULT_MODEL_NAME)]
    model_name: String,

    /// Model version reported by the API
    #[arg(long, default_value = v2serve::config::DEFAULT_MODEL_VERSION)]
    model_version: String,
}

impl Args {
    fn into_config(self) -> v2serve::Result<ServerConfig> {
        let address: SocketAddr = if let Some(address) = self.address {
            address.parse().map_err(|e| {
                Error::Config(format!("failed to parse address '{}': {}", address, e))
            })?
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        };

        Ok(ServerConfig {
            address,
            model: ModelConfig {
                name: self.model_name,
                version: self.model_version,
                seed: self.seed,
                ..ModelConfig::default()
            },
        })
    }
}

#[tokio::main]
async fn main() -> v2serve::Result<()> {
    let args = Args::parse();
    v2serve::tracing::init_with_filter(&args.log_level);

    let config = args.into_config()?;
    config.validate()?;

    let registry = Arc::new(Registry::new());
    let service = Arc::new(InferenceService::new(
        ModelInfo::from(&config.model),
        registry,
    )?);

    let server = ModelServer::new("v2serve", env!("CARGO_PKG_VERSION"))
        .address(config.address)
        .bind()
        .await?;

    let loader = Arc::clone(&service);
    let seed = config.model.seed;
    tokio::task::spawn_blocking(move || {
        if let Err(e) = loader.load_model(&SeededNormal::new(seed)) {
            error!("Model load failed: {}", e);
        }
    });

    info!("Serving model '{}'", config.model.name);
    server.serve(http::router(service)).await?;

    Ok(())
}
