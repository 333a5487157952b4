use serde::Serialize;

/// Connection parameters for one Agoric network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub name: &'static str,
    pub chain_id: &'static str,
    pub rpc: &'static str,
    pub rest: &'static str,
    /// Network-config discovery document used for chain suggestion.
    pub config_url: &'static str,
}

pub const MAINNET: NetworkProfile = NetworkProfile {
    name: "mainnet",
    chain_id: "agoric-3",
    rpc: "https://main.rpc.agoric.net:443",
    rest: "https://main.api.agoric.net",
    config_url: "https://main.agoric.net/network-config",
};

pub const DEVNET: NetworkProfile = NetworkProfile {
    name: "devnet",
    chain_id: "agoricdev-25",
    rpc: "https://devnet.rpc.agoric.net:443",
    rest: "https://devnet.api.agoric.net",
    config_url: "https://devnet.agoric.net/network-config",
};

pub const EMERYNET: NetworkProfile = NetworkProfile {
    name: "emerynet",
    chain_id: "agoric-emerynet-9",
    rpc: "https://emerynet.rpc.agoric.net:443",
    rest: "https://emerynet.api.agoric.net",
    config_url: "https://emerynet.agoric.net/network-config",
};

pub const LOCAL: NetworkProfile = NetworkProfile {
    name: "local",
    chain_id: "agoriclocal",
    rpc: "http://localhost:26657",
    rest: "http://localhost:1317",
    config_url: "https://local.agoric.net/network-config",
};

pub static PROFILES: &[NetworkProfile] = &[MAINNET, DEVNET, EMERYNET, LOCAL];

/// Look up a profile by exact name. Anything unknown (including absent, empty, or differently
/// cased names) resolves to devnet; this lookup cannot fail.
pub fn resolve(name: Option<&str>) -> &'static NetworkProfile {
    let Some(name) = name else {
        return &DEVNET;
    };
    PROFILES
        .iter()
        .find(|p| p.name == name)
        .unwrap_or(&DEVNET)
}
