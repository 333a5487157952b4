use crate::{
    amount::{brand_key_for_denom, parse_base_amount, BaseAmount},
    config::ContractConfig,
    errors::BridgeError,
    fallback,
    invitation,
    marshal::{BoardRef, Passable},
    network::NetworkProfile,
    session::Bridge,
    wallet,
};
use async_trait::async_trait;
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferStatus {
    Seated,
    Accepted,
    Error,
    Refunded,
    /// Progress the orchestrator logs and otherwise ignores.
    Other(String),
}

impl OfferStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Error | Self::Refunded)
    }
}

/// One status report from the offer backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferUpdate {
    pub status: OfferStatus,
    pub data: Value,
}

impl OfferUpdate {
    pub const fn new(status: OfferStatus, data: Value) -> Self {
        Self { status, data }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvitationSpec {
    /// A fresh invitation from the contract's public facet.
    Contract {
        instance: BoardRef,
        public_invitation_maker: String,
    },
    /// An invitation made by the account kit a previous offer created.
    Continuing {
        previous_offer: String,
        invitation_maker_name: String,
        invitation_args: Value,
    },
}

impl InvitationSpec {
    pub fn to_passable(&self) -> Passable {
        match self {
            Self::Contract {
                instance,
                public_invitation_maker,
            } => Passable::record([
                ("source", Passable::str("contract")),
                ("instance", Passable::Remotable(instance.clone())),
                (
                    "publicInvitationMaker",
                    Passable::str(public_invitation_maker.as_str()),
                ),
            ]),
            Self::Continuing {
                previous_offer,
                invitation_maker_name,
                invitation_args,
            } => Passable::record([
                ("source", Passable::str("continuing")),
                ("previousOffer", Passable::str(previous_offer.as_str())),
                (
                    "invitationMakerName",
                    Passable::str(invitation_maker_name.as_str()),
                ),
                ("invitationArgs", Passable::from_json(invitation_args)),
            ]),
        }
    }
}

/// Give `value` of `brand` under `keyword`; want nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub keyword: String,
    pub brand: BoardRef,
    pub value: BaseAmount,
}

impl Proposal {
    pub fn to_passable(&self) -> Passable {
        let amount = Passable::record([
            ("brand", Passable::Remotable(self.brand.clone())),
            ("value", Passable::BigInt(self.value.clone())),
        ]);
        Passable::Record(
            [
                (
                    "give".to_owned(),
                    Passable::Record([(self.keyword.clone(), amount)].into_iter().collect()),
                ),
                ("want".to_owned(), Passable::record([])),
            ]
            .into_iter()
            .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfferSpec {
    pub id: String,
    pub invitation_spec: InvitationSpec,
    pub proposal: Proposal,
    pub offer_args: Value,
}

impl OfferSpec {
    pub fn to_passable(&self) -> Passable {
        Passable::record([
            ("id", Passable::str(self.id.as_str())),
            ("invitationSpec", self.invitation_spec.to_passable()),
            ("proposal", self.proposal.to_passable()),
            ("offerArgs", Passable::from_json(&self.offer_args)),
        ])
    }
}

/// Submits offers from a wallet and reports their lifecycle.
#[async_trait]
pub trait OfferBackend: Send + Sync {
    /// Submit `offer` on behalf of `from`. Status updates are sent on `updates` until a terminal
    /// status or until the receiver is dropped.
    async fn make_offer(
        &self,
        profile: &'static NetworkProfile,
        from: &str,
        offer: OfferSpec,
        updates: mpsc::UnboundedSender<OfferUpdate>,
    ) -> eyre::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Create,
    Continue { previous_offer: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfferIntent {
    pub messages: Value,
    pub total_amount: String,
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accepted {
    pub status: &'static str,
    pub data: Value,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OfferError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("contract instance {0:?} not found")]
    InstanceMissing(String),

    #[error("brands not loaded")]
    BrandsMissing,

    #[error("brand {key} not found; available: {}", available.join(", "))]
    UnknownBrand { key: String, available: Vec<String> },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("offer submission failed: {0}")]
    Submission(String),

    #[error("{0}")]
    Rejected(String),

    #[error("offer refunded: wants not satisfied")]
    Refunded,

    #[error("offer status stream closed before a terminal status")]
    StreamClosed,
}

pub fn build_offer(
    contract: &ContractConfig,
    id: String,
    route: &Route,
    instance: BoardRef,
    brand: BoardRef,
    value: BaseAmount,
    messages: Value,
) -> OfferSpec {
    let (invitation_spec, offer_args) = match route {
        Route::Continue { previous_offer } => (
            InvitationSpec::Continuing {
                previous_offer: previous_offer.clone(),
                invitation_maker_name: contract.invitation_maker_name.clone(),
                invitation_args: json!(["sendTransactions", [{ "messages": messages }]]),
            },
            json!({}),
        ),
        Route::Create => (
            InvitationSpec::Contract {
                instance,
                public_invitation_maker: contract.public_invitation_maker.clone(),
            },
            json!({ "messages": messages }),
        ),
    };
    OfferSpec {
        id,
        invitation_spec,
        proposal: Proposal {
            keyword: contract.give_keyword.clone(),
            brand,
            value,
        },
        offer_args,
    }
}

fn has_txn(v: &Value) -> bool {
    v.get("txn").is_some_and(|t| !t.is_null())
}

/// Error payloads are strings or error-like objects; never render an object as `{}`.
fn error_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".to_owned(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| other.to_string(), str::to_owned),
    }
}

fn new_offer_id() -> String {
    format!("bridge-{}", chrono::Utc::now().timestamp_millis())
}

/// Check preconditions, pick the route, submit the offer and wait for a terminal status.
pub async fn submit(bridge: &Bridge, intent: OfferIntent) -> Result<Accepted, OfferError> {
    let (profile, from, instance, brand) = {
        let st = bridge.state.lock().await;
        let from = st
            .wallet
            .as_ref()
            .ok_or(OfferError::NotConnected)?
            .address
            .clone();
        let instance = st.instance.clone().ok_or_else(|| {
            OfferError::InstanceMissing(bridge.cfg.contract.instance_name.clone())
        })?;
        if st.brands.is_empty() {
            return Err(OfferError::BrandsMissing);
        }
        let key = brand_key_for_denom(&intent.denom);
        let brand = st
            .brands
            .get(&key)
            .cloned()
            .ok_or_else(|| OfferError::UnknownBrand {
                key,
                available: st.brands.keys().cloned().collect(),
            })?;
        (st.profile, from, instance, brand)
    };
    let value = parse_base_amount(&intent.total_amount)
        .map_err(|e| OfferError::InvalidAmount(format!("{e:#}")))?;

    let route = match invitation::resolve(bridge).await {
        Some(inv) => Route::Continue {
            previous_offer: inv.offer_id,
        },
        None => Route::Create,
    };
    let offer = build_offer(
        &bridge.cfg.contract,
        new_offer_id(),
        &route,
        instance,
        brand,
        value,
        intent.messages,
    );
    info!(offer_id = %offer.id, ?route, "submitting offer");

    let (tx, mut rx) = mpsc::unbounded_channel();
    bridge
        .offers
        .make_offer(profile, &from, offer, tx)
        .await
        .map_err(|e| OfferError::Submission(format!("{e:#}")))?;

    let mut seated: Option<Value> = None;
    while let Some(update) = rx.recv().await {
        match update.status {
            OfferStatus::Seated => {
                debug!("offer seated");
                // A seated payload carrying the transaction is never replaced.
                if !seated.as_ref().is_some_and(has_txn) {
                    seated = Some(update.data);
                }
            }
            OfferStatus::Accepted => {
                info!("offer accepted");
                if route == Route::Create {
                    bridge.settle().await;
                    if let Some(inv) = invitation::resolve(bridge).await {
                        info!(offer_id = %inv.offer_id, "account created");
                        bridge.state.lock().await.account_invitation = Some(inv);
                    }
                }
                let data = accepted_data(bridge, update.data, seated).await;
                return Ok(Accepted {
                    status: "accepted",
                    data,
                });
            }
            OfferStatus::Error => {
                let msg = error_text(&update.data);
                warn!(error = %msg, "offer failed");
                return Err(OfferError::Rejected(msg));
            }
            OfferStatus::Refunded => {
                warn!("offer refunded");
                return Err(OfferError::Refunded);
            }
            OfferStatus::Other(status) => debug!(%status, "ignoring offer status"),
        }
    }
    Err(OfferError::StreamClosed)
}

async fn accepted_data(bridge: &Bridge, accepted: Value, seated: Option<Value>) -> Value {
    if has_txn(&accepted) {
        return accepted;
    }
    if let Some(s) = seated {
        return s;
    }
    if let Some(fb) = fallback::last_transaction(bridge).await {
        return fb;
    }
    warn!("accepted offer carries no transaction data");
    accepted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Fund,
    Claim,
}

impl TxKind {
    const fn status_text(self) -> &'static str {
        match self {
            Self::Fund => "Funding survey...",
            Self::Claim => "Claiming rewards...",
        }
    }

    fn failure(self, message: String) -> BridgeError {
        match self {
            Self::Fund => BridgeError::TransactionFailed(message),
            Self::Claim => BridgeError::ClaimFailed(message),
        }
    }
}

/// `totalAmount` arrives as a decimal string or a JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Integer(u64),
}

impl AmountInput {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Integer(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyTxRequest {
    #[serde(default)]
    pub survey_id: Value,
    #[serde(default)]
    pub messages: Value,
    pub denom: String,
    pub total_amount: AmountInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyTxReply {
    pub success: bool,
    pub offer_id: Value,
    pub tx_hash: Value,
    /// Always 0: block heights are not tracked.
    pub height: u64,
}

impl SurveyTxReply {
    fn from_data(data: &Value) -> Self {
        let offer_id = data
            .get("offerId")
            .or_else(|| data.get("id"))
            .cloned()
            .unwrap_or(Value::Null);
        let tx_hash = data
            .get("txn")
            .and_then(|t| t.get("transactionHash"))
            .cloned()
            .unwrap_or(Value::Null);
        Self {
            success: true,
            offer_id,
            tx_hash,
            height: 0,
        }
    }
}

async fn survey_tx(bridge: &Bridge, kind: TxKind, data: Value) -> eyre::Result<SurveyTxReply> {
    let req: SurveyTxRequest = serde_json::from_value(data).context("decode request")?;
    info!(survey_id = %req.survey_id, "{}", kind.status_text());
    wallet::ensure_connected(bridge).await?;
    let accepted = submit(
        bridge,
        OfferIntent {
            messages: req.messages,
            total_amount: req.total_amount.into_string(),
            denom: req.denom,
        },
    )
    .await?;
    Ok(SurveyTxReply::from_data(&accepted.data))
}

pub async fn fund(bridge: &Bridge, data: Value) -> Result<SurveyTxReply, BridgeError> {
    survey_tx(bridge, TxKind::Fund, data)
        .await
        .map_err(|e| TxKind::Fund.failure(format!("{e:#}")))
}

pub async fn claim(bridge: &Bridge, data: Value) -> Result<SurveyTxReply, BridgeError> {
    survey_tx(bridge, TxKind::Claim, data)
        .await
        .map_err(|e| TxKind::Claim.failure(format!("{e:#}")))
}
