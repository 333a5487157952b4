use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KEPLR_NOT_INSTALLED: &str = "KEPLR_NOT_INSTALLED";
pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
pub const SIGNING_FAILED: &str = "SIGNING_FAILED";
pub const TRANSACTION_FAILED: &str = "TRANSACTION_FAILED";
pub const CLAIM_FAILED: &str = "CLAIM_FAILED";
pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";

/// A structured error suitable for returning to the embedding application in a failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub code: String,
    pub message: String,
}

impl ReplyError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
        }
    }

    /// Keep the code of a [`BridgeError`] anywhere in the report chain; everything else is
    /// reported as `UNKNOWN_ERROR` with the full alternate rendering as message.
    pub fn from_report(e: &eyre::Report) -> Self {
        if let Some(be) = e.downcast_ref::<BridgeError>() {
            return Self::from(be.clone());
        }
        let message = format!("{e:#}");
        if message.trim().is_empty() {
            return Self::new(UNKNOWN_ERROR, "unknown error");
        }
        Self::new(UNKNOWN_ERROR, message)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Keplr wallet extension is not installed")]
    ExtensionMissing,

    #[error("{0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    SigningFailed(String),

    #[error("{0}")]
    TransactionFailed(String),

    #[error("{0}")]
    ClaimFailed(String),
}

impl BridgeError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ExtensionMissing => KEPLR_NOT_INSTALLED,
            Self::ConnectionFailed(_) => CONNECTION_FAILED,
            Self::SigningFailed(_) => SIGNING_FAILED,
            Self::TransactionFailed(_) => TRANSACTION_FAILED,
            Self::ClaimFailed(_) => CLAIM_FAILED,
        }
    }
}

impl From<BridgeError> for ReplyError {
    fn from(e: BridgeError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr as _;

    #[test]
    fn bridge_error_code_survives_wrapping() -> eyre::Result<()> {
        let report = Err::<(), _>(BridgeError::ClaimFailed("no brand".into()))
            .wrap_err("claim rewards")
            .err()
            .ok_or_else(|| eyre::eyre!("expected an error"))?;
        let re = ReplyError::from_report(&report);
        assert_eq!(re.code, CLAIM_FAILED);
        assert_eq!(re.message, "no brand");
        Ok(())
    }

    #[test]
    fn foreign_errors_become_unknown() {
        let report = eyre::eyre!("socket closed").wrap_err("fetch");
        let re = ReplyError::from_report(&report);
        assert_eq!(re.code, UNKNOWN_ERROR);
        assert_eq!(re.message, "fetch: socket closed");
    }

    #[test]
    fn extension_missing_has_fixed_message() {
        let re = ReplyError::from(BridgeError::ExtensionMissing);
        assert_eq!(re.code, KEPLR_NOT_INSTALLED);
        assert!(re.message.contains("not installed"), "message: {}", re.message);
    }
}
