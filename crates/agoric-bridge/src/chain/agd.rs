use crate::{
    config::AgdConfig,
    marshal::{self, Passable},
    network::NetworkProfile,
    offers::{OfferBackend, OfferSpec, OfferStatus, OfferUpdate},
    watcher::{wallet_updates_path, ChainStorage},
};
use async_trait::async_trait;
use eyre::Context as _;
use serde_json::{json, Value};
use std::{process::Stdio, sync::Arc};
use tokio::{process::Command, sync::mpsc};
use tracing::{debug, info};

/// Broadcasts offers as smart-wallet spend actions through the `agd` CLI and follows the
/// wallet's update stream for their status.
pub struct AgdOfferBackend {
    cfg: AgdConfig,
    storage: Arc<dyn ChainStorage>,
}

impl std::fmt::Debug for AgdOfferBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgdOfferBackend")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

/// The spend action for `offer`, as the capdata JSON string `agd` expects.
pub fn spend_action(offer: &OfferSpec) -> eyre::Result<String> {
    let action = Passable::record([
        ("method", Passable::str("executeOffer")),
        ("offer", offer.to_passable()),
    ]);
    serde_json::to_string(&marshal::encode(&action)).context("encode spend action")
}

pub fn wallet_action_args(
    cfg: &AgdConfig,
    profile: &NetworkProfile,
    from: &str,
    action: &str,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "tx",
        "swingset",
        "wallet-action",
        "--allow-spend",
        action,
        "--from",
        from,
        "--keyring-backend",
        cfg.keyring_backend.as_str(),
        "--chain-id",
        profile.chain_id,
        "--node",
        profile.rpc,
        "--gas",
        "auto",
        "--gas-adjustment",
        cfg.gas_adjustment.as_str(),
        "--yes",
        "-o",
        "json",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    if let Some(home) = &cfg.home {
        args.push("--home".to_owned());
        args.push(home.clone());
    }
    args
}

/// `(txhash, height)` of an accepted broadcast; a non-zero `code` is a rejection.
pub fn parse_broadcast(resp: &Value) -> eyre::Result<(String, Value)> {
    let code = resp.get("code").and_then(Value::as_u64).unwrap_or(0);
    if code != 0 {
        let log = resp
            .get("raw_log")
            .and_then(Value::as_str)
            .unwrap_or_default();
        eyre::bail!("broadcast rejected with code {code}: {log}");
    }
    let hash = resp
        .get("txhash")
        .and_then(Value::as_str)
        .ok_or_else(|| eyre::eyre!("broadcast result has no txhash"))?;
    let height = resp.get("height").cloned().unwrap_or(Value::Null);
    Ok((hash.to_owned(), height))
}

fn status_id(status: &Value) -> Option<String> {
    match status.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Map a wallet update to a status report for `offer_id`, if it is about that offer.
pub fn status_update(update: &Value, offer_id: &str) -> Option<OfferUpdate> {
    if update.get("updated").and_then(Value::as_str) != Some("offerStatus") {
        return None;
    }
    let status = update.get("status")?;
    if status_id(status).as_deref() != Some(offer_id) {
        return None;
    }
    if let Some(err) = status.get("error").filter(|e| !e.is_null()) {
        return Some(OfferUpdate::new(OfferStatus::Error, err.clone()));
    }
    let wants = status
        .get("numWantsSatisfied")
        .filter(|n| !n.is_null())
        .map(|n| n.as_u64().unwrap_or(1));
    let kind = match wants {
        Some(0) => OfferStatus::Refunded,
        Some(_) => OfferStatus::Accepted,
        None => OfferStatus::Other("pending".to_owned()),
    };
    Some(OfferUpdate::new(kind, status.clone()))
}

async fn track_offer(
    mut wallet_updates: mpsc::Receiver<Value>,
    offer_id: String,
    updates: mpsc::UnboundedSender<OfferUpdate>,
) {
    loop {
        let next = tokio::select! {
            () = updates.closed() => return,
            v = wallet_updates.recv() => v,
        };
        let Some(v) = next else {
            debug!(%offer_id, "wallet update stream ended");
            return;
        };
        let Some(update) = status_update(&v, &offer_id) else {
            continue;
        };
        let terminal = update.status.is_terminal();
        if updates.send(update).is_err() || terminal {
            return;
        }
    }
}

impl AgdOfferBackend {
    pub fn new(cfg: AgdConfig, storage: Arc<dyn ChainStorage>) -> Self {
        Self { cfg, storage }
    }

    async fn broadcast(
        &self,
        profile: &NetworkProfile,
        from: &str,
        action: &str,
    ) -> eyre::Result<Value> {
        let out = Command::new(&self.cfg.binary)
            .args(wallet_action_args(&self.cfg, profile, from, action))
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("run {}", self.cfg.binary))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            eyre::bail!("{} exited with {}: {}", self.cfg.binary, out.status, stderr.trim());
        }
        serde_json::from_slice(&out.stdout).context("decode agd output")
    }
}

#[async_trait]
impl OfferBackend for AgdOfferBackend {
    async fn make_offer(
        &self,
        profile: &'static NetworkProfile,
        from: &str,
        offer: OfferSpec,
        updates: mpsc::UnboundedSender<OfferUpdate>,
    ) -> eyre::Result<()> {
        let action = spend_action(&offer)?;
        // Subscribe before broadcasting so a fast status update is not missed.
        let wallet_updates = self.storage.follow(profile, &wallet_updates_path(from));
        let resp = self.broadcast(profile, from, &action).await?;
        let (hash, height) = parse_broadcast(&resp)?;
        info!(offer_id = %offer.id, txhash = %hash, "spend action broadcast");

        updates.send(OfferUpdate::new(
            OfferStatus::Seated,
            json!({
                "offerId": offer.id,
                "txn": { "transactionHash": hash, "height": height },
            }),
        ))?;
        tokio::spawn(track_offer(wallet_updates, offer.id, updates));
        Ok(())
    }
}
