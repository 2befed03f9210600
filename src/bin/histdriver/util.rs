use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use histdriver::{open_sink, register_datasource, DriverConfig, FileConfig, Sink};

use crate::cli::LoopArgs;

/// env -> file -> flags
pub fn load_config(file: Option<&Path>, args: &LoopArgs) -> Result<DriverConfig> {
    let mut cfg = DriverConfig::from_env();
    if let Some(p) = file {
        cfg = cfg.apply_file(FileConfig::load(p)?)?;
    }
    if let Some(s) = &args.store {
        cfg = cfg.with_store_endpoint(s.clone());
    }
    if let Some(n) = args.interval_secs {
        cfg = cfg.with_poll_interval_secs(n);
    }
    if let Some(n) = args.max_items {
        cfg = cfg.with_max_items(n);
    }
    if let Some(p) = &args.fetch_program {
        cfg = cfg.with_fetch_program(p.clone());
    }
    if let Some(d) = &args.delivery {
        cfg = cfg.with_delivery(d.parse()?);
    }
    Ok(cfg)
}

/// Open the configured store and register the datasource once.
pub fn open_registered_sink(cfg: &DriverConfig) -> Result<Arc<dyn Sink>> {
    let endpoint = cfg.effective_store_endpoint()?;
    let sink = open_sink(Some(&endpoint))?;
    log::info!("store: {}", sink.target());
    register_datasource(&sink, &cfg.datasource())?;
    log::info!("registered datasource {}", cfg.datasource_id);
    Ok(Arc::new(sink))
}
