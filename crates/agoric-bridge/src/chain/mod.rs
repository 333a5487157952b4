//! Concrete collaborators talking to an Agoric chain: a software keyring standing in for the
//! browser extension, vstorage polling, `agd` broadcasting, and REST transaction search.

pub mod agd;
pub mod keyring;
pub mod tx_search;
pub mod vstorage;

use eyre::Context as _;
use reqwest::Client;
use std::time::Duration;

pub use agd::AgdOfferBackend;
pub use keyring::LocalKeyring;
pub use tx_search::RestTxSearch;
pub use vstorage::VstorageClient;

fn is_loopback_http(url: &str) -> bool {
    fn host_is(s: &str, prefix: &str) -> bool {
        s.strip_prefix(prefix)
            .is_some_and(|rest| matches!(rest.as_bytes().first(), None | Some(b':' | b'/')))
    }
    let u = url.trim();
    host_is(u, "http://127.0.0.1") || host_is(u, "http://localhost") || host_is(u, "http://[::1]")
}

/// Chain endpoints must be https, except loopback nodes for local chains.
pub fn ensure_https_or_loopback(url: &str, what: &str) -> eyre::Result<()> {
    let u = url.trim();
    if u.starts_with("https://") || is_loopback_http(u) {
        return Ok(());
    }
    eyre::bail!("{what} must use https (or http://localhost for a local chain): {u}");
}

pub fn http_client(timeout: Duration) -> eyre::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("build http client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_http_is_allowed_but_remote_http_is_not() {
        assert!(ensure_https_or_loopback("https://main.api.agoric.net", "rest").is_ok());
        assert!(ensure_https_or_loopback("http://localhost:1317", "rest").is_ok());
        assert!(ensure_https_or_loopback("http://127.0.0.1", "rest").is_ok());
        assert!(ensure_https_or_loopback("http://localhost.evil.com", "rest").is_err());
        assert!(ensure_https_or_loopback("http://main.api.agoric.net", "rest").is_err());
    }
}
