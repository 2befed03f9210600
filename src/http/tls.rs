//! TLS server configuration.
//!
//! Key exchange is restricted to P-256 (secp256r1) and the server's cipher
//! suite order wins over the client's. Certificate and key may live in the
//! same PEM file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::crypto::ring::{default_provider, kx_group};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};

fn open(path: &Path, what: &str) -> Result<BufReader<File>> {
    let f = File::open(path).with_context(|| format!("open {} {}", what, path.display()))?;
    Ok(BufReader::new(f))
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let raw = certs(&mut open(path, "cert")?).map_err(|e| anyhow!("read certs: {}", e))?;
    let certs: Vec<CertificateDer<'static>> = raw.into_iter().map(CertificateDer::from).collect();
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", path.display()));
    }
    Ok(certs)
}

/// PKCS#8 first, then PKCS#1 (RSA).
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pkcs8 =
        pkcs8_private_keys(&mut open(path, "key")?).map_err(|e| anyhow!("read pkcs8 keys: {}", e))?;
    if let Some(k) = pkcs8.into_iter().next() {
        return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(k)));
    }
    let rsa = rsa_private_keys(&mut open(path, "key")?).map_err(|e| anyhow!("read rsa keys: {}", e))?;
    let k = rsa
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no private keys found in {}", path.display()))?;
    Ok(PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(k)))
}

/// Build the server config from PEM files.
pub fn server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut provider = default_provider();
    provider.kx_groups = vec![kx_group::SECP256R1];

    let mut cfg = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()
        .context("tls protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build tls server config")?;
    cfg.ignore_client_order = true;
    Ok(Arc::new(cfg))
}
