use crate::{
    chain::{ensure_https_or_loopback, http_client},
    fallback::{TxRecord, TxSearch},
    network::NetworkProfile,
};
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Cosmos SDK transaction search over REST.
#[derive(Debug, Clone)]
pub struct RestTxSearch {
    http: Client,
}

impl RestTxSearch {
    pub fn new() -> eyre::Result<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(10))?,
        })
    }
}

pub fn search_query(address: &str) -> [(&'static str, String); 4] {
    [
        ("query", format!("message.sender='{address}'")),
        ("order_by", "ORDER_BY_DESC".to_owned()),
        ("limit", "1".to_owned()),
        ("pagination.limit", "1".to_owned()),
    ]
}

pub fn parse_search(resp: &Value) -> Option<TxRecord> {
    let hash = resp
        .get("tx_responses")?
        .as_array()?
        .first()?
        .get("txhash")?
        .as_str()?;
    Some(TxRecord {
        tx_hash: hash.to_owned(),
    })
}

#[async_trait]
impl TxSearch for RestTxSearch {
    async fn last_transaction(
        &self,
        profile: &'static NetworkProfile,
        address: &str,
    ) -> eyre::Result<Option<TxRecord>> {
        ensure_https_or_loopback(profile.rest, "rest endpoint")?;
        let url = format!("{}/cosmos/tx/v1beta1/txs", profile.rest.trim_end_matches('/'));
        let resp = self
            .http
            .get(url)
            .query(&search_query(address))
            .send()
            .await
            .context("tx search request")?;
        if !resp.status().is_success() {
            eyre::bail!("tx search http {}", resp.status());
        }
        let v: Value = resp.json().await.context("tx search json")?;
        Ok(parse_search(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_the_first_response() {
        let resp = json!({
            "txs": [],
            "tx_responses": [{"txhash": "9F3A", "height": "100"}, {"txhash": "0000"}],
            "pagination": null,
        });
        assert_eq!(
            parse_search(&resp),
            Some(TxRecord {
                tx_hash: "9F3A".into()
            })
        );
        assert_eq!(parse_search(&json!({"tx_responses": []})), None);
        assert_eq!(parse_search(&json!({"code": 3})), None);
    }

    #[test]
    fn query_filters_by_sender_newest_first() {
        let q = search_query("agoric1abc");
        assert!(q.contains(&("query", "message.sender='agoric1abc'".to_owned())));
        assert!(q.contains(&("order_by", "ORDER_BY_DESC".to_owned())));
    }
}
