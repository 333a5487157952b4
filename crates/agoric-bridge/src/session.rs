use crate::{
    config::BridgeConfig,
    fallback::TxSearch,
    invitation::{AccountInvitation, WalletRecord},
    marshal::BoardRef,
    network::{self, NetworkProfile},
    offers::OfferBackend,
    wallet::{ConnectedWallet, WalletExtension},
    watcher::{ChainStorage, WatcherHandle},
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

/// Everything the bridge knows for the lifetime of the process. Never persisted.
///
/// Concurrent requests share this without coordination: the lock is only held while reading or
/// writing fields, never across a wallet, offer or network wait, so overlapping requests see
/// each other's writes (last write wins).
#[derive(Debug)]
pub struct SessionState {
    pub profile: &'static NetworkProfile,
    pub watcher: Option<WatcherHandle>,
    pub wallet: Option<ConnectedWallet>,
    pub wallet_record: Option<WalletRecord>,
    pub brands: BTreeMap<String, BoardRef>,
    pub instance: Option<BoardRef>,
    pub account_invitation: Option<AccountInvitation>,
    pub initialized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub initialized: bool,
    pub connected: bool,
    pub address: Option<String>,
    pub has_brands: bool,
    pub has_instance: bool,
    pub has_account: bool,
    pub account_invitation_id: Option<String>,
    pub brands_available: Vec<String>,
    pub network: &'static str,
}

impl SessionState {
    pub const fn new(profile: &'static NetworkProfile) -> Self {
        Self {
            profile,
            watcher: None,
            wallet: None,
            wallet_record: None,
            brands: BTreeMap::new(),
            instance: None,
            account_invitation: None,
            initialized: false,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            initialized: self.initialized,
            connected: self.wallet.is_some(),
            address: self.wallet.as_ref().map(|w| w.address.clone()),
            has_brands: !self.brands.is_empty(),
            has_instance: self.instance.is_some(),
            has_account: self.account_invitation.is_some(),
            account_invitation_id: self
                .account_invitation
                .as_ref()
                .map(|a| a.offer_id.clone()),
            brands_available: self.brands.keys().cloned().collect(),
            network: self.profile.name,
        }
    }

    /// Chain-derived data belongs to one network; drop it when switching.
    pub fn forget_chain_data(&mut self) {
        self.wallet_record = None;
        self.brands.clear();
        self.instance = None;
        self.account_invitation = None;
    }
}

/// The bridge context: configuration, session state, and the external collaborators.
pub struct Bridge {
    pub cfg: BridgeConfig,
    pub state: Arc<Mutex<SessionState>>,
    pub extension: Option<Arc<dyn WalletExtension>>,
    pub storage: Arc<dyn ChainStorage>,
    pub offers: Arc<dyn OfferBackend>,
    pub tx_search: Arc<dyn TxSearch>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("cfg", &self.cfg)
            .field("extension", &self.extension.is_some())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn new(
        cfg: BridgeConfig,
        extension: Option<Arc<dyn WalletExtension>>,
        storage: Arc<dyn ChainStorage>,
        offers: Arc<dyn OfferBackend>,
        tx_search: Arc<dyn TxSearch>,
    ) -> Self {
        let profile = network::resolve(Some(cfg.default_network.as_str()));
        Self {
            cfg,
            state: Arc::new(Mutex::new(SessionState::new(profile))),
            extension,
            storage,
            offers,
            tx_search,
        }
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.state.lock().await.status()
    }

    /// Wait for chain data to propagate to the local subscriptions. Best-effort only.
    pub async fn settle(&self) {
        let d = self.cfg.settle_delay();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}
