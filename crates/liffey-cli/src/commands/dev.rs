//! `liffey dev`: serve, watch, rebuild, push.

use liffey_core::BundlerConfig;
use miette::{miette, Result};
use std::path::Path;

pub async fn run(config_path: &Path, port: Option<u16>, host: Option<String>) -> Result<()> {
    let mut config = BundlerConfig::load(config_path).map_err(|e| miette!("{e}"))?;
    if let Some(port) = port {
        config.dev.port = port;
    }
    if let Some(host) = host {
        config.dev.host = host;
    }

    liffey_core::dev::run(config).await.map_err(|e| miette!("{e}"))
}
