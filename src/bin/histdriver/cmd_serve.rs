use anyhow::Result;
use log::{info, warn};

use histdriver::http::{tls, AppContext, ControlServer};
use histdriver::{DriverConfig, SessionRegistry};

use crate::util::open_registered_sink;

pub fn exec(cfg: DriverConfig) -> Result<()> {
    info!("{}", cfg);
    info!("history provider: {}", cfg.command_provider().program());

    // TLS material is checked before anything touches the store.
    let tls_cfg = if cfg.plaintext {
        warn!("serving plain HTTP: credentials cross the wire unencrypted");
        None
    } else {
        let (cert, key) = cfg.tls_paths()?;
        Some(tls::server_config(&cert, &key)?)
    };

    let sink = open_registered_sink(&cfg)?;
    let registry = SessionRegistry::new(cfg.loop_builder(sink));
    let ctx = AppContext::new(registry.clone(), cfg.static_dir.clone());

    let server = ControlServer::bind(&cfg.listen, ctx, tls_cfg, cfg.io_timeout())?;
    let res = server.serve();
    registry.shutdown();
    res
}
