use crate::{
    chain::{ensure_https_or_loopback, http_client},
    config::KeyringConfig,
    network::NetworkProfile,
    wallet::{AccountKey, AminoSignResponse, PubKey, StdSignDoc, StdSignature, WalletExtension},
};
use async_trait::async_trait;
use base64::Engine as _;
use bitcoin::{
    bech32::{self, Bech32, Hrp},
    bip32::{DerivationPath, Xpriv},
    hashes::{hash160, Hash as _},
    secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey},
};
use eyre::Context as _;
use reqwest::Client;
use secrecy::{ExposeSecret as _, SecretString};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};
use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tracing::info;

const PUBKEY_TYPE: &str = "tendermint/PubKeySecp256k1";

/// Software signer with the capabilities of the browser wallet extension.
pub struct LocalKeyring {
    secp: Secp256k1<All>,
    secret: SecretKey,
    pub_key: PublicKey,
    address: String,
    http: Client,
    suggested: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for LocalKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyring")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// bech32 address of a compressed secp256k1 key: `prefix` + hash160(pubkey).
pub fn address_for_pubkey(prefix: &str, pub_key: &[u8]) -> eyre::Result<String> {
    let hrp = Hrp::parse(prefix).with_context(|| format!("bech32 prefix {prefix:?}"))?;
    let h = hash160::Hash::hash(pub_key);
    bech32::encode::<Bech32>(hrp, h.as_byte_array()).context("bech32 encode address")
}

fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(m) => {
            let mut keys: Vec<&String> = m.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                if let Some(val) = m.get(k) {
                    out.insert(k.clone(), sorted(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar @ (Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)) => {
            scalar.clone()
        }
    }
}

/// Amino sign bytes: sorted-key compact JSON with `&`, `<` and `>` escaped.
pub fn sign_bytes(doc: &StdSignDoc) -> eyre::Result<Vec<u8>> {
    let v = serde_json::to_value(doc).context("encode sign doc")?;
    let s = serde_json::to_string(&sorted(&v)).context("encode sign doc")?;
    Ok(s.replace('&', "\\u0026")
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .into_bytes())
}

impl LocalKeyring {
    pub fn from_mnemonic(phrase: &SecretString, cfg: &KeyringConfig) -> eyre::Result<Self> {
        let mnemonic =
            bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase.expose_secret())
                .context("parse mnemonic")?;
        let seed = zeroize::Zeroizing::new(mnemonic.to_seed_normalized(""));
        let secp = Secp256k1::new();
        let master =
            Xpriv::new_master(bitcoin::Network::Bitcoin, seed.as_slice()).context("master key")?;
        let path: DerivationPath = cfg
            .hd_path
            .parse()
            .with_context(|| format!("parse hd path {:?}", cfg.hd_path))?;
        let child = master.derive_priv(&secp, &path).context("derive key")?;
        let secret = child.private_key;
        let pub_key = secret.public_key(&secp);
        let address = address_for_pubkey(&cfg.bech32_prefix, &pub_key.serialize())?;
        Ok(Self {
            secp,
            secret,
            pub_key,
            address,
            http: http_client(Duration::from_secs(10))?,
            suggested: Mutex::new(HashSet::new()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn is_suggested(&self, chain_id: &str) -> bool {
        self.suggested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(chain_id)
    }

    fn ensure_enabled(&self, chain_id: &str) -> eyre::Result<()> {
        if self.is_suggested(chain_id) {
            return Ok(());
        }
        eyre::bail!("There is no chain info for {chain_id}");
    }

    pub fn sign_doc(&self, doc: &StdSignDoc) -> eyre::Result<StdSignature> {
        let digest: [u8; 32] = Sha256::digest(sign_bytes(doc)?).into();
        let sig = self
            .secp
            .sign_ecdsa(&Message::from_digest(digest), &self.secret);
        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(StdSignature {
            pub_key: PubKey {
                kind: PUBKEY_TYPE.to_owned(),
                value: b64.encode(self.pub_key.serialize()),
            },
            signature: b64.encode(sig.serialize_compact()),
        })
    }
}

#[async_trait]
impl WalletExtension for LocalKeyring {
    async fn suggest_chain(&self, profile: &'static NetworkProfile) -> eyre::Result<()> {
        ensure_https_or_loopback(profile.config_url, "network config url")?;
        let resp = self
            .http
            .get(profile.config_url)
            .send()
            .await
            .with_context(|| format!("fetch network config for {}", profile.name))?;
        if !resp.status().is_success() {
            eyre::bail!("network config http {}", resp.status());
        }
        let cfg: Value = resp.json().await.context("network config json")?;
        if let Some(chain_name) = cfg.get("chainName").and_then(Value::as_str) {
            if chain_name != profile.chain_id {
                eyre::bail!(
                    "network config for {} names chain {chain_name}, expected {}",
                    profile.name,
                    profile.chain_id
                );
            }
        }
        self.suggested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.chain_id.to_owned());
        info!(chain_id = profile.chain_id, "chain suggested");
        Ok(())
    }

    async fn enable(&self, chain_id: &str) -> eyre::Result<()> {
        self.ensure_enabled(chain_id)
    }

    async fn key(&self, chain_id: &str) -> eyre::Result<AccountKey> {
        self.ensure_enabled(chain_id)?;
        Ok(AccountKey {
            address: self.address.clone(),
            pub_key: self.pub_key.serialize().to_vec(),
        })
    }

    async fn sign_amino(
        &self,
        chain_id: &str,
        signer: &str,
        doc: &StdSignDoc,
    ) -> eyre::Result<AminoSignResponse> {
        self.ensure_enabled(chain_id)?;
        if signer != self.address {
            eyre::bail!("signer {signer} does not match keyring address {}", self.address);
        }
        Ok(AminoSignResponse {
            signed: doc.clone(),
            signature: self.sign_doc(doc)?,
        })
    }
}
