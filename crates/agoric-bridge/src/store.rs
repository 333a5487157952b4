use crate::{config::BridgeConfig, paths::BridgePaths};
use eyre::Context as _;
use rand::Rng as _;
use secrecy::SecretString;
use std::{
    fs::{self, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

const MODE_DIR_PRIVATE: u32 = 0o700;
const MODE_FILE_PRIVATE: u32 = 0o600;

pub const MNEMONIC_ENV: &str = "AGORIC_BRIDGE_MNEMONIC";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Apply environment variable overrides on top of the file config.
fn apply_env_overrides(cfg: &mut BridgeConfig) {
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    apply_env("AGORIC_BRIDGE_NETWORK", |v| {
        v.clone_into(&mut cfg.default_network);
    });
    apply_env("AGORIC_BRIDGE_AGD_BINARY", |v| {
        v.clone_into(&mut cfg.agd.binary);
    });
    apply_env("AGORIC_BRIDGE_SETTLE_DELAY_MS", |v| {
        if let Ok(n) = v.parse::<u64>() {
            cfg.settle_delay_ms = n;
        }
    });
}

fn is_symlink(p: &Path) -> eyre::Result<bool> {
    let md = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    Ok(md.file_type().is_symlink())
}

fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        if is_symlink(dir)? {
            eyre::bail!("refusing to use symlinked directory: {}", dir.display());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }

    #[cfg(unix)]
    {
        let md = fs::metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if (md.permissions().mode() & 0o077) != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("chmod {}", dir.display()))?;
        }
    }
    Ok(())
}

/// Write via a fresh temp file in the same directory, then rename over the destination.
fn write_private_atomic(path: &Path, contents: &str) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    ensure_private_dir(parent)?;
    if path.exists() && is_symlink(path)? {
        eyre::bail!("refusing to write to symlink: {}", path.display());
    }

    let mut suffix = [0_u8; 8];
    rand::rng().fill_bytes(&mut suffix);
    let tmp = parent.join(format!(".config.toml.tmp.{}", hex::encode(suffix)));

    let mut oo = OpenOptions::new();
    oo.create_new(true).write(true);
    #[cfg(unix)]
    {
        oo.mode(MODE_FILE_PRIVATE);
    }
    let mut f = oo
        .open(&tmp)
        .with_context(|| format!("open temp {}", tmp.display()))?;
    f.write_all(contents.as_bytes())
        .with_context(|| format!("write {}", tmp.display()))?;
    f.sync_all()
        .with_context(|| format!("fsync {}", tmp.display()))?;
    drop(f);

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

impl ConfigStore {
    pub fn new(paths: &BridgePaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<BridgeConfig> {
        if !self.path.exists() {
            let cfg = BridgeConfig::default();
            self.save(&cfg)?;
            let mut effective = cfg;
            apply_env_overrides(&mut effective);
            return Ok(effective);
        }

        let s = fs::read_to_string(&self.path).context("read config.toml")?;
        let mut cfg: BridgeConfig = toml::from_str(&s).context("parse config.toml")?;
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &BridgeConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        write_private_atomic(&self.path, &s).context("write config.toml")
    }
}

/// The keyring phrase, from the environment first, then the config directory. `None` means no
/// signer is available, which the session reports as a missing wallet extension.
pub fn load_mnemonic(paths: &BridgePaths) -> eyre::Result<Option<SecretString>> {
    if let Ok(v) = std::env::var(MNEMONIC_ENV) {
        let t = v.trim();
        if !t.is_empty() {
            return Ok(Some(SecretString::from(t.to_owned())));
        }
    }

    let p = paths.mnemonic_file();
    if !p.exists() {
        return Ok(None);
    }
    if is_symlink(&p)? {
        eyre::bail!("refusing to read symlink: {}", p.display());
    }
    let raw = zeroize::Zeroizing::new(
        fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?,
    );
    let phrase = raw.trim().to_owned();
    if phrase.is_empty() {
        return Ok(None);
    }
    Ok(Some(SecretString::from(phrase)))
}
