use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KdfParams {
    pub algo: String, // "argon2id"
    pub memory_mib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt: String, // base64
}

/// Deployment settings read once per migration run. A missing config file
/// means encryption-at-rest is disabled.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub version: u32,
    pub use_encryption: bool,
    pub kdf: Option<KdfParams>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }

    /// Config for an encrypted deployment with a freshly generated salt.
    pub fn with_encryption() -> Self {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);

        Config {
            version: 1,
            use_encryption: true,
            kdf: Some(KdfParams {
                algo: "argon2id".to_string(),
                memory_mib: 32,
                iterations: 3,
                parallelism: 1,
                salt: general_purpose::STANDARD.encode(salt_bytes),
            }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: 1,
            use_encryption: false,
            kdf: None,
        }
    }
}
