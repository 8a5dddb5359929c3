//! HTTP client construction per §4.4's TLS trust policy: a shared client
//! for the common case, and a transient one-shot client whenever a route
//! opts into a non-default trust mode.

use alertbridge_core::rules::Target;
use std::time::Duration;

const USER_AGENT: &str = concat!("alertbridge/", env!("CARGO_PKG_VERSION"));

/// Which trust mode a route resolved to. `Default` always reuses the
/// shared client; the other two are always built fresh and dropped after
/// a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustMode {
    Default,
    Insecure,
    CustomCa(String),
}

pub fn resolve_trust_mode(target: &Target) -> TrustMode {
    if !target.verify_tls {
        return TrustMode::Insecure;
    }
    if let Some(path) = target.resolve_ca_cert() {
        return TrustMode::CustomCa(path);
    }
    TrustMode::Default
}

pub fn build_shared_client(connect_timeout: Duration, read_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .build()
        .expect("default TLS client config is always valid")
}

/// Build a transient client for a non-default trust mode. Only called for
/// `Insecure`/`CustomCa`; callers drop the client after one send.
pub fn build_transient_client(
    mode: &TrustMode,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<reqwest::Client, anyhow::Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect_timeout)
        .timeout(read_timeout);

    match mode {
        TrustMode::Default => {}
        TrustMode::Insecure => {
            builder = builder.danger_accept_invalid_certs(true);
        }
        TrustMode::CustomCa(path) => {
            let pem = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("failed to read ca-cert {path:?}: {e}"))?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
    }

    Ok(builder.build()?)
}
