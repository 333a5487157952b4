use directories::ProjectDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BridgePaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl BridgePaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("AGORIC_BRIDGE_DATA_DIR"),
            std::env::var("AGORIC_BRIDGE_CONFIG_DIR"),
        ) {
            return Ok(Self::rooted(PathBuf::from(config_dir), PathBuf::from(data_dir)));
        }

        // macOS: ~/Library/Application Support/agoric-bridge
        // Linux: ~/.config/agoric-bridge
        // Windows: %APPDATA%\\agoric-bridge
        let proj = ProjectDirs::from("", "", "agoric-bridge")
            .context("failed to resolve project dirs")?;
        Ok(Self::rooted(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join("agoric-bridge.log.jsonl");
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Optional BIP-39 phrase backing the local keyring.
    pub fn mnemonic_file(&self) -> PathBuf {
        self.config_dir.join("mnemonic.txt")
    }
}
