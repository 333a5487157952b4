use crate::{network::NetworkProfile, session::Bridge};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// The newest transaction sent by an address, as far as a transaction index knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub tx_hash: String,
}

#[async_trait]
pub trait TxSearch: Send + Sync {
    async fn last_transaction(
        &self,
        profile: &'static NetworkProfile,
        address: &str,
    ) -> eyre::Result<Option<TxRecord>>;
}

/// Transaction data for an accepted offer that reported none.
///
/// `offerId` is the current time in milliseconds: the real offer id cannot be recovered from a
/// transaction lookup, so it is not a correlation key. All failures are swallowed.
pub async fn last_transaction(bridge: &Bridge) -> Option<Value> {
    let (profile, address) = {
        let st = bridge.state.lock().await;
        (st.profile, st.wallet.as_ref()?.address.clone())
    };
    match bridge.tx_search.last_transaction(profile, &address).await {
        Ok(Some(tx)) => Some(json!({
            "offerId": chrono::Utc::now().timestamp_millis(),
            "txn": { "transactionHash": tx.tx_hash },
        })),
        Ok(None) => {
            debug!(address, "no transactions found for fallback");
            None
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "fallback transaction lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testutil, wallet::ConnectedWallet};

    async fn connected(fakes: testutil::Fakes) -> Bridge {
        let bridge = testutil::bridge_with(fakes);
        bridge.state.lock().await.wallet = Some(ConnectedWallet {
            address: testutil::ADDRESS.into(),
        });
        bridge
    }

    #[tokio::test]
    async fn builds_a_record_with_a_synthetic_offer_id() -> eyre::Result<()> {
        let bridge = connected(testutil::Fakes {
            tx_search: Some(testutil::FixedTxSearch::found("ABC123")),
            ..Default::default()
        })
        .await;
        let v = last_transaction(&bridge)
            .await
            .ok_or_else(|| eyre::eyre!("expected a fallback record"))?;
        assert_eq!(v["txn"]["transactionHash"], json!("ABC123"));
        assert!(v["offerId"].is_i64());
        Ok(())
    }

    #[tokio::test]
    async fn failures_and_empty_results_are_none() {
        let failing = connected(testutil::Fakes {
            tx_search: Some(testutil::FixedTxSearch::failing()),
            ..Default::default()
        })
        .await;
        assert_eq!(last_transaction(&failing).await, None);

        let empty = connected(testutil::Fakes::default()).await;
        assert_eq!(last_transaction(&empty).await, None);
    }

    #[tokio::test]
    async fn requires_a_connected_wallet() {
        let bridge = testutil::bridge_with(testutil::Fakes {
            tx_search: Some(testutil::FixedTxSearch::found("ABC123")),
            ..Default::default()
        });
        assert_eq!(last_transaction(&bridge).await, None);
    }
}
