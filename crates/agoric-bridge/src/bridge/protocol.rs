use crate::errors::ReplyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Tag on every reply sent to the embedding application.
pub const RESPONSE_TAG: &str = "AGORIC_RESPONSE";
/// Tag of the one-shot readiness announcement.
pub const READY_TAG: &str = "AGORIC_READY";

pub const MAX_LINE_BYTES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ConnectWallet,
    SignData,
    FundSurvey,
    ClaimRewards,
    GetStatus,
}

impl Operation {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "CONNECT_WALLET" => Some(Self::ConnectWallet),
            "SIGN_DATA" => Some(Self::SignData),
            "FUND_SURVEY" => Some(Self::FundSurvey),
            "CLAIM_REWARDS" => Some(Self::ClaimRewards),
            "GET_STATUS" => Some(Self::GetStatus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub data: Value,
}

/// Decode one inbound line into a request the router handles. Malformed lines, our own
/// outbound tags and unknown types yield `None` and get no reply.
pub fn parse_line(line: &str) -> Option<(Operation, InboundMessage)> {
    let v: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "invalid json on input");
            return None;
        }
    };
    let msg: InboundMessage = match serde_json::from_value(v) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "message without a string type");
            return None;
        }
    };
    if msg.kind == RESPONSE_TAG || msg.kind == READY_TAG {
        return None;
    }
    let Some(op) = Operation::parse(&msg.kind) else {
        debug!(kind = %msg.kind, "ignoring unknown message type");
        return None;
    };
    Some((op, msg))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    #[serde(rename = "type")]
    kind: &'static str,
    pub id: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl Reply {
    pub const fn ok(id: Value, data: Value) -> Self {
        Self {
            kind: RESPONSE_TAG,
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub const fn err(id: Value, error: ReplyError) -> Self {
        Self {
            kind: RESPONSE_TAG,
            id,
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Reply(Reply),
    Ready {
        #[serde(rename = "type")]
        kind: &'static str,
    },
}

impl Outbound {
    pub const fn ready() -> Self {
        Self::Ready { kind: READY_TAG }
    }
}
