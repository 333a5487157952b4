//! Scripted collaborators for unit tests.

use crate::{
    config::BridgeConfig,
    fallback::{TxRecord, TxSearch},
    invitation::WalletRecord,
    marshal::BoardRef,
    network::NetworkProfile,
    offers::{OfferBackend, OfferSpec, OfferStatus, OfferUpdate},
    session::{Bridge, SessionState},
    wallet::{
        AccountKey, AminoSignResponse, ConnectedWallet, PubKey, StdSignDoc, StdSignature,
        WalletExtension,
    },
    watcher::ChainStorage,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::mpsc;

pub const ADDRESS: &str = "agoric1testaddr0000000000000000000000000000";
pub const FAKE_SIGNATURE: &str = "c2lnbmF0dXJl";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Chain storage that only delivers what the test publishes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStorage {
    inner: Arc<Mutex<StorageInner>>,
}

#[derive(Debug, Default)]
struct StorageInner {
    values: HashMap<String, Value>,
    followers: Vec<(String, mpsc::Sender<Value>)>,
}

impl ScriptedStorage {
    pub fn publish(&self, path: &str, value: Value) {
        let mut inner = lock(&self.inner);
        inner
            .followers
            .retain(|(p, tx)| p != path || tx.try_send(value.clone()).is_ok());
        inner.values.insert(path.to_owned(), value);
    }
}

impl ChainStorage for ScriptedStorage {
    fn follow(&self, _profile: &'static NetworkProfile, path: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(16);
        let mut inner = lock(&self.inner);
        if let Some(v) = inner.values.get(path) {
            let _ = tx.try_send(v.clone());
        }
        inner.followers.push((path.to_owned(), tx));
        rx
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeExtension {
    enable_error: Option<String>,
}

impl FakeExtension {
    pub fn failing_enable(msg: &str) -> Self {
        Self {
            enable_error: Some(msg.to_owned()),
        }
    }
}

#[async_trait]
impl WalletExtension for FakeExtension {
    async fn suggest_chain(&self, _profile: &'static NetworkProfile) -> eyre::Result<()> {
        Ok(())
    }

    async fn enable(&self, _chain_id: &str) -> eyre::Result<()> {
        match &self.enable_error {
            Some(msg) => Err(eyre::eyre!("{msg}")),
            None => Ok(()),
        }
    }

    async fn key(&self, _chain_id: &str) -> eyre::Result<AccountKey> {
        Ok(AccountKey {
            address: ADDRESS.to_owned(),
            pub_key: vec![2; 33],
        })
    }

    async fn sign_amino(
        &self,
        _chain_id: &str,
        _signer: &str,
        doc: &StdSignDoc,
    ) -> eyre::Result<AminoSignResponse> {
        Ok(AminoSignResponse {
            signed: doc.clone(),
            signature: StdSignature {
                pub_key: PubKey {
                    kind: "tendermint/PubKeySecp256k1".into(),
                    value: "AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgIC".into(),
                },
                signature: FAKE_SIGNATURE.to_owned(),
            },
        })
    }
}

/// Offer backend that replays a fixed status script for every submission.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOffers {
    inner: Arc<OffersInner>,
}

#[derive(Debug, Default)]
struct OffersInner {
    script: Vec<OfferUpdate>,
    submitted: Mutex<Vec<OfferSpec>>,
    record_on_submit: Mutex<Option<(Arc<tokio::sync::Mutex<SessionState>>, WalletRecord)>>,
}

impl ScriptedOffers {
    pub fn new(script: Vec<OfferUpdate>) -> Self {
        Self {
            inner: Arc::new(OffersInner {
                script,
                ..Default::default()
            }),
        }
    }

    pub fn accepting(data: Value) -> Self {
        Self::new(vec![OfferUpdate::new(OfferStatus::Accepted, data)])
    }

    /// Install `record` as the session's wallet record when an offer is submitted.
    pub fn on_submit_set_record(&self, bridge: &Bridge, record: WalletRecord) {
        *lock(&self.inner.record_on_submit) = Some((Arc::clone(&bridge.state), record));
    }

    pub fn submitted(&self) -> Vec<OfferSpec> {
        lock(&self.inner.submitted).clone()
    }
}

#[async_trait]
impl OfferBackend for ScriptedOffers {
    async fn make_offer(
        &self,
        _profile: &'static NetworkProfile,
        _from: &str,
        offer: OfferSpec,
        updates: mpsc::UnboundedSender<OfferUpdate>,
    ) -> eyre::Result<()> {
        lock(&self.inner.submitted).push(offer);
        let pending = lock(&self.inner.record_on_submit).take();
        if let Some((state, record)) = pending {
            state.lock().await.wallet_record = Some(record);
        }
        for u in &self.inner.script {
            updates.send(u.clone())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedTxSearch {
    tx_hash: Option<String>,
    fail: bool,
}

impl FixedTxSearch {
    pub fn found(hash: &str) -> Self {
        Self {
            tx_hash: Some(hash.to_owned()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            tx_hash: None,
            fail: true,
        }
    }
}

#[async_trait]
impl TxSearch for FixedTxSearch {
    async fn last_transaction(
        &self,
        _profile: &'static NetworkProfile,
        _address: &str,
    ) -> eyre::Result<Option<TxRecord>> {
        if self.fail {
            eyre::bail!("connection refused");
        }
        Ok(self.tx_hash.clone().map(|tx_hash| TxRecord { tx_hash }))
    }
}

#[derive(Debug, Default)]
pub struct Fakes {
    pub storage: Option<ScriptedStorage>,
    pub extension: Option<FakeExtension>,
    pub no_extension: bool,
    pub offers: Option<ScriptedOffers>,
    pub tx_search: Option<FixedTxSearch>,
    pub settle_delay_ms: u64,
}

pub fn bridge_with(fakes: Fakes) -> Bridge {
    let cfg = BridgeConfig {
        settle_delay_ms: fakes.settle_delay_ms,
        ..BridgeConfig::default()
    };
    let extension: Option<Arc<dyn WalletExtension>> = if fakes.no_extension {
        None
    } else {
        Some(Arc::new(fakes.extension.unwrap_or_default()))
    };
    Bridge::new(
        cfg,
        extension,
        Arc::new(fakes.storage.unwrap_or_default()),
        Arc::new(fakes.offers.unwrap_or_default()),
        Arc::new(fakes.tx_search.unwrap_or_default()),
    )
}

pub fn connected_wallet() -> ConnectedWallet {
    ConnectedWallet {
        address: ADDRESS.to_owned(),
    }
}

/// A connected wallet, the contract instance and a single `BLD` brand, without a watcher.
pub async fn connect_with_chain_data(bridge: &Bridge, bld: BoardRef, instance: BoardRef) {
    let mut st = bridge.state.lock().await;
    st.wallet = Some(connected_wallet());
    st.instance = Some(instance);
    st.brands.insert("BLD".to_owned(), bld);
}

/// A wallet record whose used invitations include the account-creating one under `offer_id`.
pub fn wallet_record_with_account(offer_id: &str) -> Value {
    json!({
        "offerToUsedInvitation": [[offer_id, {
            "brand": { "boardId": "board0074", "iface": "Alleged: Zoe Invitation brand" },
            "value": [{ "description": "makeAccountAndSendTransactions" }],
        }]],
        "liveOffers": [],
        "purses": [],
    })
}
