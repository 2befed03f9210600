//! Control surface: liveness probe, credential submission, session control,
//! metrics and the static UI.
//!
//! Routing is a pure function ([`route`]) over a parsed request so it can be
//! tested without sockets. [`ControlServer`] binds, accepts and hands every
//! connection to its own thread, optionally wrapping it in TLS first.

pub mod form;
pub mod static_files;
pub mod tls;
pub mod wire;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use serde_json::json;

use crate::metrics;
use crate::registry::{SessionRegistry, StartError};

pub use wire::{HttpRequest, HttpResponse};

pub const STATUS_BODY: &str = "active\n";
const UI_PREFIX: &str = "/ui";

/// Shared state visible to request handlers.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<SessionRegistry>,
    pub static_dir: PathBuf,
}

impl AppContext {
    pub fn new<P: Into<PathBuf>>(registry: Arc<SessionRegistry>, static_dir: P) -> Self {
        Self {
            registry,
            static_dir: static_dir.into(),
        }
    }
}

/// Dispatch one request.
pub fn route(ctx: &AppContext, req: &HttpRequest) -> HttpResponse {
    let method = req.method.as_str();
    let path = req.path.as_str();

    match path {
        "/status" => match method {
            "GET" => HttpResponse::text(200, STATUS_BODY),
            _ => HttpResponse::method_not_allowed("GET"),
        },
        "/ui/info" => match method {
            "GET" | "POST" => submit_credentials(ctx, req),
            _ => HttpResponse::method_not_allowed("GET, POST"),
        },
        "/sessions" => match method {
            "GET" => HttpResponse::json(200, &ctx.registry.list()),
            _ => HttpResponse::method_not_allowed("GET"),
        },
        "/metrics" => match method {
            "GET" => HttpResponse::new(
                200,
                "text/plain; version=0.0.4",
                metrics::render_prometheus().into_bytes(),
            ),
            _ => HttpResponse::method_not_allowed("GET"),
        },
        _ => {
            if let Some(id) = parse_stop_path(path) {
                return match method {
                    "POST" => stop_session(ctx, id),
                    _ => HttpResponse::method_not_allowed("POST"),
                };
            }
            if let Some(rel) = ui_relative(path) {
                return match method {
                    "GET" | "HEAD" => static_files::serve(&ctx.static_dir, rel),
                    _ => HttpResponse::method_not_allowed("GET"),
                };
            }
            HttpResponse::not_found()
        }
    }
}

fn submit_credentials(ctx: &AppContext, req: &HttpRequest) -> HttpResponse {
    let body: &[u8] = if req.method == "POST" { &req.body } else { &[] };
    let creds = match form::parse_credentials(req.query.as_deref(), body) {
        Ok(c) => c,
        Err(e) => return HttpResponse::json(400, &json!({ "error": e.to_string() })),
    };
    let session = crate::registry::mask_session(&creds.session_key());
    match ctx.registry.start(creds) {
        Ok(id) => HttpResponse::json(202, &json!({ "id": id, "session": session })),
        Err(StartError::AlreadyRunning(id)) => HttpResponse::json(
            409,
            &json!({ "error": "collection already running", "id": id, "session": session }),
        ),
        Err(StartError::EmptySession) => {
            HttpResponse::json(400, &json!({ "error": StartError::EmptySession.to_string() }))
        }
        Err(e @ StartError::Spawn(_)) => HttpResponse::json(500, &json!({ "error": e.to_string() })),
    }
}

fn stop_session(ctx: &AppContext, id: u64) -> HttpResponse {
    if !ctx.registry.stop(id) {
        return HttpResponse::not_found();
    }
    match ctx.registry.status(id) {
        Some(st) => HttpResponse::json(200, &st),
        None => HttpResponse::json(200, &json!({ "id": id })),
    }
}

/// `/sessions/{id}/stop` -> id
fn parse_stop_path(path: &str) -> Option<u64> {
    path.strip_prefix("/sessions/")?
        .strip_suffix("/stop")?
        .parse()
        .ok()
}

/// `/ui`, `/ui/`, `/ui/x` -> ``, `/`, `/x`; `/uix` is not under the prefix.
fn ui_relative(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(UI_PREFIX)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Blocking HTTP(S) server for the control surface.
pub struct ControlServer {
    listener: TcpListener,
    ctx: Arc<AppContext>,
    tls: Option<Arc<ServerConfig>>,
    io_timeout: Duration,
}

impl ControlServer {
    /// Bind `addr`. `tls: None` serves plain HTTP.
    pub fn bind(
        addr: &str,
        ctx: AppContext,
        tls: Option<Arc<ServerConfig>>,
        io_timeout: Duration,
    ) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).with_context(|| format!("bind control surface at {}", addr))?;
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
            tls,
            io_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("control surface local addr")
    }

    /// Accept forever; each connection is served on its own thread.
    pub fn serve(&self) -> Result<()> {
        info!(
            "control surface listening on {} ({})",
            self.local_addr()?,
            if self.tls.is_some() { "https" } else { "http, plaintext" }
        );
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(x) => x,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };
            debug!("accepted from {}", peer);
            let ctx = self.ctx.clone();
            let tls = self.tls.clone();
            let timeout = self.io_timeout;
            let spawned = thread::Builder::new()
                .name("http-conn".to_string())
                .spawn(move || {
                    if let Err(e) = handle_connection(&ctx, tls, stream, timeout) {
                        metrics::record_http_error();
                        debug!("connection {} error: {:#}", peer, e);
                    }
                });
            if let Err(e) = spawned {
                warn!("spawn connection thread: {}", e);
            }
        }
    }
}

fn handle_connection(
    ctx: &AppContext,
    tls: Option<Arc<ServerConfig>>,
    stream: TcpStream,
    timeout: Duration,
) -> Result<()> {
    stream.set_read_timeout(Some(timeout)).ok();
    stream.set_write_timeout(Some(timeout)).ok();
    stream.set_nodelay(true).ok();

    match tls {
        None => serve_stream(ctx, stream),
        Some(cfg) => {
            let conn = ServerConnection::new(cfg).context("create tls server connection")?;
            let mut tls_stream = StreamOwned::new(conn, stream);
            let res = serve_stream(ctx, &mut tls_stream);
            if tls_stream.conn.is_handshaking() {
                // Refused or abandoned handshake: send the pending alert, do not wait for the peer.
                flush_tls(&mut tls_stream);
                return res.and(Err(anyhow!("tls handshake not completed")));
            }
            tls_stream.conn.send_close_notify();
            flush_tls(&mut tls_stream);
            res
        }
    }
}

/// Write out whatever TLS records are queued, without reading.
fn flush_tls(s: &mut StreamOwned<ServerConnection, TcpStream>) {
    while s.conn.wants_write() {
        match s.conn.write_tls(&mut s.sock) {
            Ok(n) if n > 0 => {}
            _ => break,
        }
    }
}

fn serve_stream<S: std::io::Read + std::io::Write>(ctx: &AppContext, mut stream: S) -> Result<()> {
    let mut head_only = false;
    let resp = match wire::read_request(&mut stream) {
        None => return Ok(()),
        Some(Err(e)) => {
            metrics::record_http_error();
            HttpResponse::text(400, &format!("bad request: {}\n", e))
        }
        Some(Ok(req)) => {
            metrics::record_http_request();
            head_only = req.method == "HEAD";
            let resp = route(ctx, &req);
            debug!("{} {} -> {}", req.method, req.path, resp.status);
            resp
        }
    };
    if resp.status >= 500 {
        metrics::record_http_error();
    }
    let written = if head_only {
        wire::write_head(&mut stream, &resp)
    } else {
        wire::write_response(&mut stream, &resp)
    };
    written.context("write response")
}
