// tests/http_surface.rs
//
// Control surface routing (pure `route`) plus one real plaintext round-trip
// over TCP through ControlServer.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use common::{fast_opts, snap, unique_root, wait_until, RecordingSink, ScriptedProvider, Step};
use histdriver::http::{route, AppContext, ControlServer, HttpRequest};
use histdriver::{Credentials, IngestLoop, LoopBuilder, SessionRegistry, SinkPublisher};

fn steady_builder(sink: Arc<RecordingSink>) -> LoopBuilder {
    Arc::new(move |creds: Credentials| {
        IngestLoop::new(
            Box::new(ScriptedProvider::new(vec![Step::Ok(snap(&["a", "b"]))])),
            SinkPublisher::new(sink.clone(), "YoutubeHistory"),
            creds,
            fast_opts(),
        )
    })
}

fn context(prefix: &str) -> Result<(AppContext, Arc<RecordingSink>)> {
    let root = unique_root(prefix);
    std::fs::create_dir_all(root.join("css"))?;
    std::fs::write(root.join("index.html"), "<h1>history</h1>")?;
    std::fs::write(root.join("css/site.css"), "body{}")?;
    let sink = RecordingSink::new();
    let reg = SessionRegistry::new(steady_builder(sink.clone()));
    Ok((AppContext::new(reg, root), sink))
}

fn body_json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[test]
fn status_probe() -> Result<()> {
    let (ctx, _) = context("status")?;
    let r = route(&ctx, &HttpRequest::new("GET", "/status"));
    assert_eq!(r.status, 200);
    assert_eq!(r.body, b"active\n");

    let r = route(&ctx, &HttpRequest::new("DELETE", "/status"));
    assert_eq!(r.status, 405);
    assert_eq!(r.header("allow"), Some("GET"));
    // no side effects
    assert!(ctx.registry.list().is_empty());
    Ok(())
}

#[test]
fn credential_submission_starts_one_loop_per_session() -> Result<()> {
    let (ctx, sink) = context("submit")?;

    let req = HttpRequest::new("POST", "/ui/info")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("email=someone%40example.org&password=pw");
    let r = route(&ctx, &req);
    assert_eq!(r.status, 202);
    let v = body_json(&r.body);
    let id = v["id"].as_u64().unwrap();
    assert_eq!(v["session"], "so***@example.org");

    // Same session through the query string: conflict.
    let r = route(&ctx, &HttpRequest::new("GET", "/ui/info?email=SOMEONE%40example.org&pw=x"));
    assert_eq!(r.status, 409);
    assert_eq!(body_json(&r.body)["id"].as_u64(), Some(id));

    assert!(wait_until(Duration::from_secs(5), || sink.written_ids().len() == 2));

    let r = route(&ctx, &HttpRequest::new("GET", "/sessions"));
    assert_eq!(r.status, 200);
    let list = body_json(&r.body);
    assert_eq!(list.as_array().map(|a| a.len()), Some(1));
    assert_eq!(list[0]["id"].as_u64(), Some(id));
    assert!(list[0].get("password").is_none());

    let r = route(&ctx, &HttpRequest::new("POST", &format!("/sessions/{}/stop", id)));
    assert_eq!(r.status, 200);
    let r = route(&ctx, &HttpRequest::new("POST", "/sessions/9999/stop"));
    assert_eq!(r.status, 404);
    let r = route(&ctx, &HttpRequest::new("GET", &format!("/sessions/{}/stop", id)));
    assert_eq!(r.status, 405);

    ctx.registry.shutdown();
    Ok(())
}

#[test]
fn missing_email_is_a_bad_request() -> Result<()> {
    let (ctx, _) = context("noemail")?;
    let req = HttpRequest::new("POST", "/ui/info").with_body("password=pw");
    assert_eq!(route(&ctx, &req).status, 400);
    assert_eq!(route(&ctx, &HttpRequest::new("PUT", "/ui/info")).status, 405);
    assert!(ctx.registry.list().is_empty());
    Ok(())
}

#[test]
fn static_ui_and_fallbacks() -> Result<()> {
    let (ctx, _) = context("static")?;

    for path in ["/ui", "/ui/", "/ui/index.html"] {
        let r = route(&ctx, &HttpRequest::new("GET", path));
        assert_eq!(r.status, 200, "{path}");
        assert_eq!(r.body, b"<h1>history</h1>");
        assert_eq!(r.header("content-type"), Some("text/html; charset=utf-8"));
    }
    let r = route(&ctx, &HttpRequest::new("GET", "/ui/css/site.css"));
    assert_eq!((r.status, r.header("content-type")), (200, Some("text/css; charset=utf-8")));

    assert_eq!(route(&ctx, &HttpRequest::new("GET", "/ui/missing.js")).status, 404);
    assert_eq!(route(&ctx, &HttpRequest::new("GET", "/ui/../secret")).status, 403);
    assert_eq!(route(&ctx, &HttpRequest::new("POST", "/ui/index.html")).status, 405);
    assert_eq!(route(&ctx, &HttpRequest::new("GET", "/nope")).status, 404);
    assert_eq!(route(&ctx, &HttpRequest::new("GET", "/uinfo")).status, 404);

    let r = route(&ctx, &HttpRequest::new("GET", "/metrics"));
    assert_eq!(r.status, 200);
    assert!(String::from_utf8_lossy(&r.body).contains("histdriver_http_requests_total"));
    Ok(())
}

fn roundtrip(addr: std::net::SocketAddr, raw: &str) -> Result<String> {
    let mut s = TcpStream::connect(addr)?;
    s.set_read_timeout(Some(Duration::from_secs(5)))?;
    s.write_all(raw.as_bytes())?;
    let mut out = String::new();
    s.read_to_string(&mut out)?;
    Ok(out)
}

#[test]
fn plaintext_server_roundtrip() -> Result<()> {
    let (ctx, _) = context("tcp")?;
    let registry = ctx.registry.clone();
    let server = ControlServer::bind("127.0.0.1:0", ctx, None, Duration::from_secs(5))?;
    let addr = server.local_addr()?;
    thread::spawn(move || {
        let _ = server.serve();
    });

    let out = roundtrip(addr, "GET /status HTTP/1.1\r\nHost: x\r\n\r\n")?;
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
    assert!(out.ends_with("\r\n\r\nactive\n"), "{out}");

    let body = "email=tcp%40example.org&password=pw";
    let out = roundtrip(
        addr,
        &format!(
            "POST /ui/info HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )?;
    assert!(out.starts_with("HTTP/1.1 202 Accepted\r\n"), "{out}");
    assert_eq!(registry.list().len(), 1);

    // HEAD: GET's Content-Length, no body bytes.
    let out = roundtrip(addr, "HEAD /ui/ HTTP/1.1\r\nHost: x\r\n\r\n")?;
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "{out}");
    assert!(out.contains("Content-Length: 16\r\n"), "{out}");
    assert!(out.ends_with("\r\n\r\n"), "{out}");

    let out = roundtrip(addr, "BROKEN\r\n\r\n")?;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{out}");

    registry.shutdown();
    Ok(())
}
