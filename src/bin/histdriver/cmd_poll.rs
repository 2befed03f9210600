use anyhow::{Context, Result};
use log::{info, warn};

use histdriver::{metrics, Credentials, DriverConfig, StopSignal};

use crate::util::open_registered_sink;

pub fn exec(cfg: DriverConfig, email: String, password_env: &str, cycles: Option<u64>) -> Result<()> {
    let password = match std::env::var(password_env) {
        Ok(p) => p,
        Err(_) => {
            warn!("{} is not set; fetching with an empty password", password_env);
            String::new()
        }
    };
    info!("{}", cfg);
    info!("history provider: {}", cfg.command_provider().program());

    let sink = open_registered_sink(&cfg)?;
    let build = cfg.loop_builder(sink);
    let mut ingest = build(Credentials::new(email, password));
    let stop = StopSignal::new();

    match cycles {
        None => ingest.run(&stop, |_| {}).context("ingestion loop")?,
        Some(n) => {
            for i in 0..n {
                let r = ingest.run_cycle().context("ingestion cycle")?;
                info!(
                    "cycle {}: fetched={} new={} published={} failed={} pending={}",
                    r.cycle, r.fetched, r.new, r.published, r.failed, r.pending
                );
                if i + 1 < n {
                    stop.wait(cfg.loop_options().interval);
                }
            }
        }
    }

    let m = metrics::snapshot();
    println!(
        "cycles={} new={} published={} publish_errors={} publish_ok={:.3} dropped={} pending={}",
        m.cycles_total,
        m.records_new,
        m.records_published,
        m.publish_errors,
        m.publish_success_ratio(),
        m.records_dropped,
        ingest.pending().len()
    );
    Ok(())
}
