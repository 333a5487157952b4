use crate::{session::Bridge, watcher};
use serde_json::Value;
use tracing::debug;

/// The connected account's smart-wallet record (`published.wallet.<address>.current`).
#[derive(Debug, Clone, PartialEq)]
pub struct WalletRecord {
    raw: Value,
}

/// A previously accepted offer whose invitation created the contract-side account kit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInvitation {
    pub offer_id: String,
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

impl WalletRecord {
    pub const fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// `(offer id, used invitation amount)` pairs from `offerToUsedInvitation`.
    pub fn used_invitations(&self) -> Vec<(String, &Value)> {
        let Some(entries) = self
            .raw
            .get("offerToUsedInvitation")
            .and_then(Value::as_array)
        else {
            return vec![];
        };
        entries
            .iter()
            .filter_map(|e| Some((id_string(e.get(0)?)?, e.get(1)?)))
            .collect()
    }
}

fn first_description(amount: &Value) -> Option<&str> {
    amount
        .get("value")
        .and_then(|v| v.get(0))
        .and_then(|d| d.get("description"))
        .and_then(Value::as_str)
}

/// Among used invitations whose first detail carries `description`, pick the greatest offer id
/// by plain string comparison. Ids are compared as strings, so `"b"` beats `"a"` and `"9"` beats
/// `"10"`; the ordering is not guaranteed to be chronological.
pub fn find_account_invitation(
    record: &WalletRecord,
    description: &str,
) -> Option<AccountInvitation> {
    let mut matches: Vec<String> = record
        .used_invitations()
        .into_iter()
        .filter(|(_, amount)| first_description(amount) == Some(description))
        .map(|(id, _)| id)
        .collect();
    matches.sort_unstable_by(|a, b| b.cmp(a));
    matches
        .into_iter()
        .next()
        .map(|offer_id| AccountInvitation { offer_id })
}

/// Look for the account invitation in the current wallet record snapshot.
///
/// Without a record yet, this registers the wallet-record watch (when a wallet is connected)
/// and returns `None`; callers re-invoke once the record has arrived.
pub async fn resolve(bridge: &Bridge) -> Option<AccountInvitation> {
    let mut st = bridge.state.lock().await;
    let Some(record) = st.wallet_record.as_ref() else {
        debug!("no wallet record yet; registering watch");
        watcher::watch_connected_wallet(bridge, &mut st);
        return None;
    };
    find_account_invitation(record, &bridge.cfg.contract.account_invitation_description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DESC: &str = "makeAccountAndSendTransactions";

    fn used(id: Value, description: &str) -> Value {
        json!([id, {
            "brand": {"boardId": "board0074", "iface": "Alleged: Zoe Invitation brand"},
            "value": [{"description": description, "handle": {"boardId": null}}],
        }])
    }

    fn record(entries: Vec<Value>) -> WalletRecord {
        WalletRecord::new(json!({ "offerToUsedInvitation": entries, "liveOffers": [] }))
    }

    #[test]
    fn picks_the_lexicographically_greatest_id() {
        let r = record(vec![used(json!("a"), DESC), used(json!("b"), DESC)]);
        assert_eq!(
            find_account_invitation(&r, DESC),
            Some(AccountInvitation {
                offer_id: "b".into()
            })
        );
    }

    #[test]
    fn string_ordering_is_not_numeric() {
        let r = record(vec![used(json!("10"), DESC), used(json!("9"), DESC)]);
        assert_eq!(
            find_account_invitation(&r, DESC).map(|a| a.offer_id),
            Some("9".to_owned())
        );
    }

    #[test]
    fn ignores_other_descriptions_and_malformed_entries() {
        let r = record(vec![
            used(json!("z"), "somethingElse"),
            json!(["y"]),
            used(json!(1_700_000_000_000_u64), DESC),
        ]);
        assert_eq!(
            find_account_invitation(&r, DESC).map(|a| a.offer_id),
            Some("1700000000000".to_owned())
        );
    }

    #[test]
    fn no_match_is_none() {
        assert_eq!(find_account_invitation(&record(vec![]), DESC), None);
        assert_eq!(
            find_account_invitation(&WalletRecord::new(json!({})), DESC),
            None
        );
    }
}
