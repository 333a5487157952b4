use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Name of the contract instance in `published.agoricNames.instance`.
    pub instance_name: String,
    /// Public invitation maker that creates the account kit and runs the first action.
    pub public_invitation_maker: String,
    /// Invitation maker on the account kit used by continuing offers.
    pub invitation_maker_name: String,
    /// Description of the invitation that created the account kit. Used to find it again in the
    /// wallet record's used invitations.
    pub account_invitation_description: String,
    /// Proposal keyword the funds are given under.
    pub give_keyword: String,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            instance_name: "surveyAccounts".into(),
            public_invitation_maker: "makeAccountAndSendTransactionsInvitation".into(),
            invitation_maker_name: "SendTransactions".into(),
            account_invitation_description: "makeAccountAndSendTransactions".into(),
            give_keyword: "Deposit".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// BIP-32 path of the signing key (coin type 564 is Agoric).
    pub hd_path: String,
    pub bech32_prefix: String,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            hd_path: "m/44'/564'/0'/0/0".into(),
            bech32_prefix: "agoric".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgdConfig {
    /// `agd` executable used to broadcast wallet spend actions.
    pub binary: String,
    /// Keyring backend holding the key for the connected address.
    pub keyring_backend: String,
    /// Optional `--home` for the agd keyring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    pub gas_adjustment: String,
}

impl Default for AgdConfig {
    fn default() -> Self {
        Self {
            binary: "agd".into(),
            keyring_backend: "test".into(),
            home: None,
            gas_adjustment: "1.4".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Network used at startup and for reconnects that do not name one.
    pub default_network: String,
    /// Fixed wait after starting a watcher or connecting, to let chain data arrive.
    ///
    /// This is a best-effort heuristic: nothing signals that the subscriptions have synced.
    pub settle_delay_ms: u64,
    /// Chain-storage polling period.
    pub poll_interval_ms: u64,
    pub contract: ContractConfig,
    pub keyring: KeyringConfig,
    pub agd: AgdConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_network: crate::network::DEVNET.name.into(),
            settle_delay_ms: 2_000,
            poll_interval_ms: 2_000,
            contract: ContractConfig::default(),
            keyring: KeyringConfig::default(),
            agd: AgdConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // Never hammer the REST endpoint, even if misconfigured.
        Duration::from_millis(self.poll_interval_ms.max(250))
    }
}
