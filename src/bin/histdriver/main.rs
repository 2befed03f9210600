use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

mod cli;
mod util;
mod cmd_serve;
mod cmd_poll;
mod cmd_diff;

fn init_logger() {
    // RUST_LOG wins; default is info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Serve {
            listen,
            plaintext,
            tls_cert,
            tls_key,
            static_dir,
            loop_args,
        } => {
            let mut cfg = util::load_config(cli.config.as_deref(), &loop_args)?;
            if let Some(l) = listen {
                cfg = cfg.with_listen(l);
            }
            if plaintext {
                cfg = cfg.with_plaintext(true);
            }
            if let Some(cert) = tls_cert {
                let key = tls_key.unwrap_or_else(|| cert.clone());
                cfg = cfg.with_tls(cert, key);
            } else if let Some(key) = tls_key {
                cfg.tls_key = Some(key);
            }
            if let Some(d) = static_dir {
                cfg = cfg.with_static_dir(d);
            }
            cmd_serve::exec(cfg)
        }

        cli::Cmd::Poll {
            email,
            password_env,
            cycles,
            loop_args,
        } => {
            let cfg = util::load_config(cli.config.as_deref(), &loop_args)?;
            cmd_poll::exec(cfg, email, &password_env, cycles)
        }

        cli::Cmd::Diff {
            previous,
            current,
            json,
        } => cmd_diff::exec(previous, current, json),
    }
}
