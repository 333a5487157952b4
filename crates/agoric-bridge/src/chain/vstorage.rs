use crate::{
    chain::http_client,
    marshal,
    network::NetworkProfile,
    watcher::ChainStorage,
};
use eyre::Context as _;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Follows vstorage paths by polling the chain's REST endpoint.
#[derive(Debug, Clone)]
pub struct VstorageClient {
    http: Client,
    poll_interval: Duration,
}

/// The newest entry of a vstorage node, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCell {
    pub block_height: Option<String>,
    pub values: Vec<Value>,
}

pub fn data_url(rest: &str, path: &str) -> String {
    format!("{}/agoric/vstorage/data/{path}", rest.trim_end_matches('/'))
}

/// Parse a `/agoric/vstorage/data` response. Stream nodes hold
/// `{blockHeight, values: [capdata, ...]}`; plain nodes hold a single capdata string.
pub fn parse_data_response(resp: &Value) -> eyre::Result<Option<StreamCell>> {
    let raw = resp.get("value").and_then(Value::as_str).unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    let node: Value = serde_json::from_str(raw).context("vstorage value is not json")?;
    let Some(values) = node.get("values").and_then(Value::as_array) else {
        return Ok(Some(StreamCell {
            block_height: None,
            values: vec![marshal::decode_str(raw)?],
        }));
    };
    let values = values
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| eyre::eyre!("stream cell value is not a string"))
                .and_then(marshal::decode_str)
        })
        .collect::<eyre::Result<Vec<_>>>()?;
    let block_height = node
        .get("blockHeight")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Ok(Some(StreamCell {
        block_height,
        values,
    }))
}

/// The values of `cell` not yet delivered after `last`. A cell that grew within the same block
/// yields only its appended values; any other change yields all of them.
pub fn fresh_values<'a>(last: Option<&StreamCell>, cell: &'a StreamCell) -> &'a [Value] {
    let Some(prev) = last else {
        return &cell.values;
    };
    if prev == cell {
        return &[];
    }
    let grew_in_place = prev.block_height.is_some()
        && prev.block_height == cell.block_height
        && cell.values.starts_with(&prev.values);
    if grew_in_place {
        return cell.values.get(prev.values.len()..).unwrap_or_default();
    }
    &cell.values
}

async fn fetch_cell(http: &Client, url: &str) -> eyre::Result<Option<StreamCell>> {
    let resp = http.get(url).send().await.context("vstorage request")?;
    if !resp.status().is_success() {
        eyre::bail!("vstorage http {}", resp.status());
    }
    let v: Value = resp.json().await.context("vstorage json")?;
    parse_data_response(&v)
}

impl VstorageClient {
    pub fn new(poll_interval: Duration) -> eyre::Result<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(10))?,
            poll_interval,
        })
    }
}

impl ChainStorage for VstorageClient {
    fn follow(&self, profile: &'static NetworkProfile, path: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(16);
        let http = self.http.clone();
        let url = data_url(profile.rest, path);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::spawn(async move {
            let mut last: Option<StreamCell> = None;
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    _ = ticker.tick() => {}
                }
                let cell = match fetch_cell(&http, &url).await {
                    Ok(Some(cell)) => cell,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!(url, error = %format!("{e:#}"), "vstorage poll failed");
                        continue;
                    }
                };
                for v in fresh_values(last.as_ref(), &cell) {
                    if tx.send(v.clone()).await.is_err() {
                        return;
                    }
                }
                last = Some(cell);
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capdata(body: &str, slots: &[&str]) -> String {
        json!({ "body": body, "slots": slots }).to_string()
    }

    #[test]
    fn builds_data_urls() {
        assert_eq!(
            data_url("https://main.api.agoric.net/", "published.agoricNames.brand"),
            "https://main.api.agoric.net/agoric/vstorage/data/published.agoricNames.brand"
        );
    }

    #[test]
    fn decodes_stream_cells() -> eyre::Result<()> {
        let node = json!({
            "blockHeight": "1234",
            "values": [
                capdata(r##"#[["BLD","$0.Alleged: BLD brand"]]"##, &["board0566"]),
                capdata(r##"#[["IST","$0.Alleged: IST brand"]]"##, &["board0257"]),
            ],
        });
        let resp = json!({ "value": node.to_string() });
        let cell = parse_data_response(&resp)?.ok_or_else(|| eyre::eyre!("no cell"))?;
        assert_eq!(cell.block_height.as_deref(), Some("1234"));
        assert_eq!(cell.values.len(), 2);
        assert_eq!(
            cell.values.last(),
            Some(&json!([["IST", {"boardId": "board0257", "iface": "Alleged: IST brand"}]]))
        );
        Ok(())
    }

    #[test]
    fn plain_nodes_and_empty_values() -> eyre::Result<()> {
        let resp = json!({ "value": capdata("#\"hello\"", &[]) });
        let cell = parse_data_response(&resp)?.ok_or_else(|| eyre::eyre!("no cell"))?;
        assert_eq!(cell.values, vec![json!("hello")]);

        assert_eq!(parse_data_response(&json!({ "value": "" }))?, None);
        assert!(parse_data_response(&json!({ "value": "not json" })).is_err());
        Ok(())
    }

    #[test]
    fn only_new_values_are_forwarded() {
        let cell = |height: &str, values: &[&str]| StreamCell {
            block_height: Some(height.to_owned()),
            values: values.iter().map(|v| json!(v)).collect(),
        };
        let first = cell("10", &["a"]);
        let grown = cell("10", &["a", "b"]);
        let next_block = cell("11", &["c"]);

        assert_eq!(fresh_values(None, &first), [json!("a")]);
        assert!(fresh_values(Some(&first), &first).is_empty());
        assert_eq!(fresh_values(Some(&first), &grown), [json!("b")]);
        assert_eq!(fresh_values(Some(&grown), &next_block), [json!("c")]);

        let plain = |v: &str| StreamCell {
            block_height: None,
            values: vec![json!(v)],
        };
        assert_eq!(fresh_values(Some(&plain("x")), &plain("y")), [json!("y")]);
    }
}
