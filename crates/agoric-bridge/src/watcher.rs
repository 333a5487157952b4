use crate::{
    invitation::WalletRecord,
    marshal::BoardRef,
    network::NetworkProfile,
    session::{Bridge, SessionState},
};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

pub const INSTANCE_PATH: &str = "published.agoricNames.instance";
pub const BRAND_PATH: &str = "published.agoricNames.brand";

pub fn wallet_current_path(address: &str) -> String {
    format!("published.wallet.{address}.current")
}

pub fn wallet_updates_path(address: &str) -> String {
    format!("published.wallet.{address}")
}

/// Continuous subscriptions to chain-published data.
pub trait ChainStorage: Send + Sync {
    /// Deliver every new value published at `path`. Dropping the receiver ends the subscription.
    fn follow(&self, profile: &'static NetworkProfile, path: &str) -> mpsc::Receiver<Value>;
}

/// The subscriptions for one network. Stopped on [`WatcherHandle::stop`] or drop.
#[derive(Debug)]
pub struct WatcherHandle {
    network: &'static str,
    tasks: Vec<JoinHandle<()>>,
    wallet: Option<(String, JoinHandle<()>)>,
}

fn spawn_apply<F>(
    mut rx: mpsc::Receiver<Value>,
    state: Arc<Mutex<SessionState>>,
    apply: F,
) -> JoinHandle<()>
where
    F: Fn(&mut SessionState, Value) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(v) = rx.recv().await {
            let mut guard = state.lock().await;
            apply(&mut guard, v);
        }
    })
}

/// `[[name, ref], ...]` entries as published under `agoricNames`.
fn name_entries(v: &Value) -> Vec<(String, BoardRef)> {
    v.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let name = e.get(0)?.as_str()?;
                    let r = BoardRef::from_value(e.get(1)?)?;
                    Some((name.to_owned(), r))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn apply_instances(st: &mut SessionState, v: &Value, instance_name: &str) {
    st.instance = name_entries(v)
        .into_iter()
        .find(|(name, _)| name == instance_name)
        .map(|(_, r)| r);
    debug!(found = st.instance.is_some(), instance_name, "instance update");
}

pub fn apply_brands(st: &mut SessionState, v: &Value) {
    st.brands = name_entries(v).into_iter().collect::<BTreeMap<_, _>>();
    debug!(count = st.brands.len(), "brand registry update");
}

impl WatcherHandle {
    pub fn start(bridge: &Bridge, profile: &'static NetworkProfile) -> Self {
        let instance_name = bridge.cfg.contract.instance_name.clone();
        let instances = spawn_apply(
            bridge.storage.follow(profile, INSTANCE_PATH),
            Arc::clone(&bridge.state),
            move |st, v| apply_instances(st, &v, &instance_name),
        );
        let brands = spawn_apply(
            bridge.storage.follow(profile, BRAND_PATH),
            Arc::clone(&bridge.state),
            |st, v| apply_brands(st, &v),
        );
        info!(network = profile.name, "chain watcher started");
        Self {
            network: profile.name,
            tasks: vec![instances, brands],
            wallet: None,
        }
    }

    pub const fn network(&self) -> &'static str {
        self.network
    }

    pub fn watching_wallet(&self) -> Option<&str> {
        self.wallet.as_ref().map(|(a, _)| a.as_str())
    }

    /// Follow the wallet record for `address`, replacing any previous wallet subscription.
    pub fn watch_wallet(
        &mut self,
        storage: &Arc<dyn ChainStorage>,
        state: &Arc<Mutex<SessionState>>,
        profile: &'static NetworkProfile,
        address: &str,
    ) {
        if self.watching_wallet() == Some(address) {
            return;
        }
        if let Some((_, old)) = self.wallet.take() {
            old.abort();
        }
        let task = spawn_apply(
            storage.follow(profile, &wallet_current_path(address)),
            Arc::clone(state),
            |st, v| st.wallet_record = Some(WalletRecord::new(v)),
        );
        info!(network = profile.name, address, "watching wallet record");
        self.wallet = Some((address.to_owned(), task));
    }

    pub fn stop(&mut self) {
        for t in self.tasks.drain(..) {
            t.abort();
        }
        if let Some((_, t)) = self.wallet.take() {
            t.abort();
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the watcher for `profile` unless it is already running, then wait the settle delay.
/// A network switch replaces (and so stops) the previous watcher; the wallet-record
/// subscription has to be re-established by the caller.
pub async fn ensure_started(bridge: &Bridge, profile: &'static NetworkProfile) {
    {
        let mut st = bridge.state.lock().await;
        if st
            .watcher
            .as_ref()
            .is_some_and(|w| w.network() == profile.name)
        {
            return;
        }
        if st.profile.name != profile.name {
            st.forget_chain_data();
        }
        st.profile = profile;
        st.watcher = Some(WatcherHandle::start(bridge, profile));
    }
    bridge.settle().await;
}

/// Register the wallet-record subscription if a wallet and watcher exist; otherwise a no-op.
pub fn watch_connected_wallet(bridge: &Bridge, st: &mut SessionState) {
    let profile = st.profile;
    let (Some(wallet), Some(watcher)) = (st.wallet.as_ref(), st.watcher.as_mut()) else {
        debug!("wallet record watch skipped: no wallet or watcher yet");
        return;
    };
    watcher.watch_wallet(&bridge.storage, &bridge.state, profile, &wallet.address);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{network, testutil};
    use serde_json::json;

    fn entries() -> Value {
        json!([
            ["VaultFactory", {"boardId": "board00", "iface": "Alleged: InstanceHandle"}],
            ["surveyAccounts", {"boardId": "board42", "iface": "Alleged: InstanceHandle"}],
            ["broken"],
        ])
    }

    #[test]
    fn instance_is_matched_by_name() {
        let mut st = SessionState::new(&network::DEVNET);
        apply_instances(&mut st, &entries(), "surveyAccounts");
        assert_eq!(st.instance.as_ref().map(|r| r.board_id.as_str()), Some("board42"));

        apply_instances(&mut st, &entries(), "missing");
        assert!(st.instance.is_none());
    }

    #[test]
    fn brands_replace_the_registry() {
        let mut st = SessionState::new(&network::DEVNET);
        apply_brands(
            &mut st,
            &json!([["BLD", {"boardId": "board0566"}], ["IST", {"boardId": "board0257"}]]),
        );
        assert_eq!(st.brands.keys().collect::<Vec<_>>(), vec!["BLD", "IST"]);
        apply_brands(&mut st, &json!([["IST", {"boardId": "board0257"}]]));
        assert_eq!(st.brands.len(), 1);
    }

    #[tokio::test]
    async fn published_values_flow_into_session_state() -> eyre::Result<()> {
        let storage = testutil::ScriptedStorage::default();
        storage.publish(
            BRAND_PATH,
            json!([["BLD", {"boardId": "board0566", "iface": "Alleged: BLD brand"}]]),
        );
        let bridge = testutil::bridge_with(testutil::Fakes {
            storage: Some(storage),
            ..Default::default()
        });

        ensure_started(&bridge, &network::DEVNET).await;
        for _ in 0_u32..50 {
            if !bridge.state.lock().await.brands.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let st = bridge.state.lock().await;
        assert!(st.brands.contains_key("BLD"));
        assert_eq!(st.watcher.as_ref().map(WatcherHandle::network), Some("devnet"));
        Ok(())
    }

    #[tokio::test]
    async fn wallet_watch_without_wallet_is_a_noop() {
        let bridge = testutil::bridge_with(testutil::Fakes::default());
        ensure_started(&bridge, &network::DEVNET).await;
        let mut st = bridge.state.lock().await;
        watch_connected_wallet(&bridge, &mut st);
        assert_eq!(
            st.watcher.as_ref().and_then(WatcherHandle::watching_wallet),
            None
        );
    }

    #[tokio::test]
    async fn switching_networks_replaces_the_watcher_and_drops_chain_data() {
        let bridge = testutil::bridge_with(testutil::Fakes::default());
        ensure_started(&bridge, &network::DEVNET).await;
        bridge.state.lock().await.brands.insert(
            "BLD".into(),
            BoardRef {
                board_id: "board0566".into(),
                iface: None,
            },
        );
        ensure_started(&bridge, &network::EMERYNET).await;
        let st = bridge.state.lock().await;
        assert_eq!(st.profile.name, "emerynet");
        assert_eq!(st.watcher.as_ref().map(WatcherHandle::network), Some("emerynet"));
        assert!(st.brands.is_empty());
    }
}
