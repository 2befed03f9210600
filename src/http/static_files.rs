//! Static files under `/ui`.

use std::path::{Component, Path, PathBuf};

use super::wire::HttpResponse;

/// Map a request path below the `/ui` prefix to a file under `root`.
///
/// Returns None for anything that would escape `root` (`..`, absolute or
/// drive components, percent-encoded separators). Empty or trailing-slash
/// paths resolve to `index.html`.
pub fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    if rel.contains('\0') || rel.contains('\\') || rel.to_ascii_lowercase().contains("%2e") {
        return None;
    }
    let rel = rel.trim_start_matches('/');
    let mut out = root.to_path_buf();
    for c in Path::new(rel).components() {
        match c {
            Component::Normal(seg) => out.push(seg),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if rel.is_empty() || rel.ends_with('/') || out.is_dir() {
        out.push("index.html");
    }
    Some(out)
}

pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Serve `rel` from `root`: 200 with the file, 403 on traversal, 404 otherwise.
pub fn serve(root: &Path, rel: &str) -> HttpResponse {
    let Some(path) = resolve(root, rel) else {
        return HttpResponse::text(403, "forbidden\n");
    };
    match std::fs::read(&path) {
        Ok(body) => HttpResponse::new(200, content_type(&path), body),
        Err(_) => HttpResponse::not_found(),
    }
}
