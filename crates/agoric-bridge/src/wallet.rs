use crate::{
    errors::BridgeError,
    invitation,
    network::{self, NetworkProfile},
    session::Bridge,
    watcher,
};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// The browser wallet extension's capabilities, as used by the bridge.
#[async_trait]
pub trait WalletExtension: Send + Sync {
    /// Register the chain described by `profile` with the extension.
    async fn suggest_chain(&self, profile: &'static NetworkProfile) -> eyre::Result<()>;
    async fn enable(&self, chain_id: &str) -> eyre::Result<()>;
    async fn key(&self, chain_id: &str) -> eyre::Result<AccountKey>;
    async fn sign_amino(
        &self,
        chain_id: &str,
        signer: &str,
        doc: &StdSignDoc,
    ) -> eyre::Result<AminoSignResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub address: String,
    /// Compressed secp256k1 public key.
    pub pub_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedWallet {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
    pub amount: Vec<Coin>,
    pub gas: String,
}

/// Amino JSON sign document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignDoc {
    pub chain_id: String,
    pub account_number: String,
    pub sequence: String,
    pub fee: StdFee,
    pub msgs: Vec<Value>,
    pub memo: String,
}

impl StdSignDoc {
    /// Off-chain arbitrary-data document (ADR-036): no chain id, zero fee and gas, empty memo,
    /// sequence and account number 0.
    pub fn arbitrary(signer: &str, data: &[u8]) -> Self {
        let data_b64 = base64::engine::general_purpose::STANDARD.encode(data);
        Self {
            chain_id: String::new(),
            account_number: "0".into(),
            sequence: "0".into(),
            fee: StdFee {
                amount: vec![],
                gas: "0".into(),
            },
            msgs: vec![json!({
                "type": "sign/MsgSignData",
                "value": { "signer": signer, "data": data_b64 },
            })],
            memo: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: PubKey,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AminoSignResponse {
    pub signed: StdSignDoc,
    pub signature: StdSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectReply {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignReply {
    pub signed_data: StdSignDoc,
    pub signature: StdSignature,
}

async fn negotiate(
    ext: &dyn WalletExtension,
    profile: &'static NetworkProfile,
) -> eyre::Result<AccountKey> {
    ext.suggest_chain(profile).await?;
    ext.enable(profile.chain_id).await?;
    ext.key(profile.chain_id).await
}

/// Connect the wallet extension on `network` (or the session's current network when absent).
pub async fn connect(bridge: &Bridge, network: Option<&str>) -> Result<ConnectReply, BridgeError> {
    let profile = match network {
        Some(name) => network::resolve(Some(name)),
        None => bridge.state.lock().await.profile,
    };
    watcher::ensure_started(bridge, profile).await;

    let ext = bridge
        .extension
        .as_ref()
        .ok_or(BridgeError::ExtensionMissing)?;
    let key = negotiate(ext.as_ref(), profile)
        .await
        .map_err(|e| BridgeError::ConnectionFailed(format!("{e:#}")))?;
    info!(
        address = %key.address,
        pub_key = %hex::encode(&key.pub_key),
        network = profile.name,
        "wallet connected"
    );

    {
        let mut st = bridge.state.lock().await;
        st.wallet = Some(ConnectedWallet {
            address: key.address.clone(),
        });
        watcher::watch_connected_wallet(bridge, &mut st);
    }
    bridge.settle().await;

    match invitation::resolve(bridge).await {
        Some(inv) => {
            info!(offer_id = %inv.offer_id, "existing account found");
            bridge.state.lock().await.account_invitation = Some(inv);
        }
        None => info!("no account yet; the first transaction will create one"),
    }

    Ok(ConnectReply {
        address: key.address,
    })
}

/// Guard for operations that need a wallet: connect on the current network unless connected.
pub async fn ensure_connected(bridge: &Bridge) -> Result<String, BridgeError> {
    if let Some(w) = bridge.state.lock().await.wallet.as_ref() {
        return Ok(w.address.clone());
    }
    connect(bridge, None).await.map(|c| c.address)
}

async fn sign_with_wallet(bridge: &Bridge, payload: &str) -> eyre::Result<SignReply> {
    let address = ensure_connected(bridge).await?;
    let ext = bridge
        .extension
        .as_ref()
        .ok_or(BridgeError::ExtensionMissing)?;
    let chain_id = bridge.state.lock().await.profile.chain_id;
    let doc = StdSignDoc::arbitrary(&address, payload.as_bytes());
    let resp = ext.sign_amino(chain_id, &address, &doc).await?;
    Ok(SignReply {
        signed_data: resp.signed,
        signature: resp.signature,
    })
}

/// Sign arbitrary data with the connected account.
pub async fn sign(bridge: &Bridge, payload: &str) -> Result<SignReply, BridgeError> {
    sign_with_wallet(bridge, payload)
        .await
        .map_err(|e| BridgeError::SigningFailed(format!("{e:#}")))
}
