use anyhow::{anyhow, Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

pub const ACS_CONNECTION_STRING: &str = "ACS_CONNECTION_STRING";
pub const ACS_SENDER_ADDRESS: &str = "ACS_SENDER_ADDRESS";
pub const AZURE_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const AZURE_DEPLOYMENT_NAME: &str = "AZURE_DEPLOYMENT_NAME";
pub const AZURE_OPENAI_SYSTEM_PROMPT: &str = "AZURE_OPENAI_SYSTEM_PROMPT";
pub const BANTAI_ALLOWED_ORIGIN: &str = "BANTAI_ALLOWED_ORIGIN";

pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct EnvStore;

impl SecretStore for EnvStore {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// A dotenv-format file store.
///
/// Intended default path for system installs: `/etc/bantai/secrets.env`.
pub struct EnvFileStore {
    map: HashMap<String, String>,
}

impl EnvFileStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_secure_dotenv(&path)?;

        let iter = dotenvy::from_path_iter(&path)
            .with_context(|| format!("failed reading dotenv file: {}", path.display()))?;

        let mut map = HashMap::new();
        for item in iter {
            let (k, v) =
                item.with_context(|| format!("failed parsing dotenv file: {}", path.display()))?;
            if !v.is_empty() {
                map.insert(k, v);
            }
        }

        Ok(Self { map })
    }
}

impl SecretStore for EnvFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned().filter(|v| !v.is_empty())
    }
}

pub struct CompositeStore {
    stores: Vec<Box<dyn SecretStore>>,
}

impl CompositeStore {
    pub fn new(stores: Vec<Box<dyn SecretStore>>) -> Self {
        Self { stores }
    }
}

impl SecretStore for CompositeStore {
    fn get(&self, key: &str) -> Option<String> {
        self.stores.iter().find_map(|s| s.get(key))
    }
}

/// Enforce that the dotenv file and its parent directory are private.
///
/// Policy:
/// - file must not be readable/writable/executable by group/others (mode & 0o077 == 0)
/// - parent directory must not be accessible by group/others (mode & 0o077 == 0)
/// - file and parent directory must share an owner
pub fn ensure_secure_dotenv(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("dotenv file not found: {}", path.display()));
    }

    #[cfg(unix)]
    {
        let meta = fs::metadata(path)?;
        let mode = meta.mode() & 0o777;
        if (mode & 0o077) != 0 {
            return Err(anyhow!(
                "dotenv file permissions too open (need 600-ish): {} has mode {:o}",
                path.display(),
                mode
            ));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let pmeta = fs::metadata(parent)?;
            let pmode = pmeta.mode() & 0o777;
            if (pmode & 0o077) != 0 {
                return Err(anyhow!(
                    "dotenv parent dir permissions too open (need 700-ish): {} has mode {:o}",
                    parent.display(),
                    pmode
                ));
            }

            if meta.uid() != pmeta.uid() {
                return Err(anyhow!(
                    "dotenv ownership mismatch: file uid {} vs parent uid {}",
                    meta.uid(),
                    pmeta.uid()
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct MapStore(HashMap<String, String>);

    impl SecretStore for MapStore {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }

    fn map_store(pairs: &[(&str, &str)]) -> Box<dyn SecretStore> {
        Box::new(MapStore(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn composite_prefers_earlier_stores() {
        let store = CompositeStore::new(vec![
            map_store(&[("A", "file")]),
            map_store(&[("A", "env"), ("B", "env")]),
        ]);
        assert_eq!(store.get("A").as_deref(), Some("file"));
        assert_eq!(store.get("B").as_deref(), Some("env"));
        assert_eq!(store.get("C"), None);
    }

    #[test]
    #[serial]
    fn env_store_ignores_empty_values() {
        std::env::set_var("BANTAI_TEST_EMPTY_SECRET", "");
        std::env::set_var("BANTAI_TEST_SECRET", "value");
        assert_eq!(EnvStore.get("BANTAI_TEST_EMPTY_SECRET"), None);
        assert_eq!(EnvStore.get("BANTAI_TEST_SECRET").as_deref(), Some("value"));
        std::env::remove_var("BANTAI_TEST_EMPTY_SECRET");
        std::env::remove_var("BANTAI_TEST_SECRET");
    }

    #[cfg(unix)]
    #[test]
    fn loads_private_dotenv_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
        let path = dir.path().join("secrets.env");
        fs::write(
            &path,
            "# relay secrets\nAZURE_OPENAI_API_KEY=abc123\nAZURE_OPENAI_SYSTEM_PROMPT=\"You are a classifier.\"\nEMPTY=\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let store = EnvFileStore::load(&path).expect("load");
        assert_eq!(store.get(AZURE_OPENAI_API_KEY).as_deref(), Some("abc123"));
        assert_eq!(
            store.get(AZURE_OPENAI_SYSTEM_PROMPT).as_deref(),
            Some("You are a classifier.")
        );
        assert_eq!(store.get("EMPTY"), None);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_world_readable_dotenv_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
        let path = dir.path().join("secrets.env");
        fs::write(&path, "AZURE_OPENAI_API_KEY=abc123\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(EnvFileStore::load(&path).is_err());
    }

    #[test]
    fn missing_dotenv_file_is_an_error() {
        assert!(EnvFileStore::load("/nonexistent/secrets.env").is_err());
    }
}
