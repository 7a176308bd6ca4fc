use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::types::*;

const CREDENTIALS_FILE: &str = "credentials.json";

/// Durable owner of the multi-platform credential file. Every operation
/// is a fresh read-modify-write of the whole file; nothing is cached
/// across invocations. Concurrent CLI processes are last-writer-wins.
pub struct CredentialStore {
    credentials_path: PathBuf,
}

impl CredentialStore {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("quant");

        Ok(Self {
            credentials_path: config_dir.join(CREDENTIALS_FILE),
        })
    }

    /// Store backed by an explicit file path.
    pub fn with_file(credentials_path: PathBuf) -> Self {
        Self { credentials_path }
    }

    pub fn path(&self) -> &Path {
        &self.credentials_path
    }

    // -- Load / save ----------------------------------------------------------

    /// Read the store. Never fails: a missing file is an empty store, and
    /// an unreadable one degrades to empty with a stderr warning.
    pub fn load(&self) -> MultiPlatformConfig {
        let (config, degraded) = self.load_checked();
        if degraded {
            eprintln!(
                "warning: credential file at {} is unreadable; treating as empty",
                self.credentials_path.display()
            );
        }
        config
    }

    /// Like `load`, but reports whether the read degraded to an empty
    /// store because the file existed and could not be understood.
    pub fn load_checked(&self) -> (MultiPlatformConfig, bool) {
        let contents = match fs::read_to_string(&self.credentials_path) {
            Ok(c) => c,
            Err(_) => return (MultiPlatformConfig::default(), false),
        };

        let value: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(_) => return (MultiPlatformConfig::default(), true),
        };

        if value.get("platforms").is_some() {
            return match serde_json::from_value(value) {
                Ok(config) => (config, false),
                Err(_) => (MultiPlatformConfig::default(), true),
            };
        }

        // No `platforms` key: a file written before multi-platform support
        // held a single bare session record.
        match serde_json::from_value::<AuthConfig>(value) {
            Ok(legacy) if !legacy.host.is_empty() => {
                let migrated = migrate_legacy(legacy);
                // Upgrade the on-disk shape; this invocation proceeds with
                // the migrated config even if the write fails.
                if let Err(e) = self.save(&migrated) {
                    eprintln!("warning: could not persist migrated credential file: {}", e);
                }
                (migrated, false)
            }
            Ok(_) => (MultiPlatformConfig::default(), false),
            Err(_) => (MultiPlatformConfig::default(), true),
        }
    }

    /// Serialize and overwrite the whole file. Write errors propagate;
    /// losing an explicit mutation must not be silent.
    pub fn save(&self, config: &MultiPlatformConfig) -> Result<()> {
        if let Some(parent) = self.credentials_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(config)?;
        fs::write(&self.credentials_path, &contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.credentials_path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    // -- Platform operations --------------------------------------------------

    /// Session record of the active platform, if one is set and resolves.
    pub fn get_active_platform_config(&self) -> Option<AuthConfig> {
        let config = self.load();
        let active = config.active_platform?;
        config.platforms.get(&active).map(|entry| entry.auth.clone())
    }

    /// Upsert one platform entry. The only path by which a brand-new
    /// platform becomes active automatically: first entry in the store,
    /// or no active platform was set.
    pub fn save_platform_config(
        &self,
        platform_id: &str,
        auth: AuthConfig,
        platform_info: PlatformInfo,
    ) -> Result<()> {
        let mut config = self.load();
        let was_empty = config.platforms.is_empty();

        config.platforms.insert(
            platform_id.to_string(),
            PlatformEntry {
                auth,
                platform_info,
            },
        );

        if was_empty || config.active_platform.is_none() {
            config.active_platform = Some(platform_id.to_string());
        }

        self.save(&config)
    }

    /// Returns false (no mutation) when the id does not exist.
    pub fn switch_platform(&self, platform_id: &str) -> Result<bool> {
        let mut config = self.load();
        if !config.platforms.contains_key(platform_id) {
            return Ok(false);
        }

        config.active_platform = Some(platform_id.to_string());
        self.save(&config)?;
        Ok(true)
    }

    pub fn list_platforms(&self) -> Vec<PlatformListing> {
        let config = self.load();
        let active = config.active_platform.as_deref();

        let mut listings: Vec<PlatformListing> = config
            .platforms
            .iter()
            .map(|(id, entry)| PlatformListing {
                id: id.clone(),
                info: entry.platform_info.clone(),
                is_active: active == Some(id.as_str()),
            })
            .collect();
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        listings
    }

    /// Delete one entry. Removing the active platform reassigns the
    /// active pointer to an arbitrary remaining entry, or clears it when
    /// none remain. Returns false (no mutation) for an unknown id.
    pub fn remove_platform(&self, platform_id: &str) -> Result<bool> {
        let mut config = self.load();
        if config.platforms.remove(platform_id).is_none() {
            return Ok(false);
        }

        if config.active_platform.as_deref() == Some(platform_id) {
            config.active_platform = config.platforms.keys().next().cloned();
        }

        self.save(&config)?;
        Ok(true)
    }

    /// Shallow-merge a partial update onto the active platform's session
    /// record. Fails when no platform is active.
    pub fn save_active_platform_config(&self, update: AuthUpdate) -> Result<()> {
        let mut config = self.load();
        let active = config
            .active_platform
            .clone()
            .context("No active platform. Run `quant login` or `quant platform switch <id>`.")?;

        let entry = config
            .platforms
            .get_mut(&active)
            .context("No active platform. Run `quant login` or `quant platform switch <id>`.")?;

        update.apply(&mut entry.auth);
        self.save(&config)
    }
}

fn migrate_legacy(legacy: AuthConfig) -> MultiPlatformConfig {
    let platform_info = PlatformInfo::for_host(&legacy.host);
    let platform_id = platform_info.id.clone();

    let mut config = MultiPlatformConfig {
        active_platform: Some(platform_id.clone()),
        ..Default::default()
    };
    config.platforms.insert(
        platform_id,
        PlatformEntry {
            auth: legacy,
            platform_info,
        },
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CredentialStore {
        CredentialStore::with_file(dir.path().join("credentials.json"))
    }

    fn auth(token: &str, host: &str) -> AuthConfig {
        AuthConfig {
            token: Some(token.to_string()),
            host: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_is_a_clean_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let (config, degraded) = store.load_checked();
        assert!(!degraded);
        assert!(config.platforms.is_empty());
        assert_eq!(config.active_platform, None);
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{not json").unwrap();

        let (config, degraded) = store.load_checked();
        assert!(degraded);
        assert!(config.platforms.is_empty());
    }

    #[test]
    fn legacy_single_platform_file_is_migrated_in_place() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{
                "token": "t-legacy",
                "host": "https://dashboard.quantcdn.io",
                "email": "dev@example.com",
                "activeOrganization": "acme"
            }"#,
        )
        .unwrap();

        let (config, degraded) = store.load_checked();
        assert!(!degraded);
        assert_eq!(config.active_platform.as_deref(), Some("quantcdn"));
        assert_eq!(config.platforms.len(), 1);

        let entry = &config.platforms["quantcdn"];
        assert_eq!(entry.auth.token.as_deref(), Some("t-legacy"));
        assert_eq!(entry.auth.host, "https://dashboard.quantcdn.io");
        assert_eq!(entry.auth.email.as_deref(), Some("dev@example.com"));
        assert_eq!(entry.auth.active_organization.as_deref(), Some("acme"));
        assert_eq!(entry.platform_info.name, "QuantCDN");

        // The upgraded shape was written back.
        let on_disk = fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.contains("\"platforms\""));
        assert!(on_disk.contains("\"activePlatform\""));
    }

    #[test]
    fn legacy_custom_host_gets_slugified_identity() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"token": "t", "host": "https://edge.example.net"}"#,
        )
        .unwrap();

        let config = store.load();
        assert_eq!(config.active_platform.as_deref(), Some("edge-example-net"));
        let entry = &config.platforms["edge-example-net"];
        assert_eq!(entry.platform_info.name, "Custom Endpoint");
    }

    #[test]
    fn first_saved_platform_becomes_active() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let info = PlatformInfo::for_host("https://a.quantcdn.io");

        store
            .save_platform_config("quantcdn", auth("t1", "https://a"), info.clone())
            .unwrap();

        let config = store.load();
        assert_eq!(config.active_platform.as_deref(), Some("quantcdn"));
        let entry = &config.platforms["quantcdn"];
        assert_eq!(entry.auth.token.as_deref(), Some("t1"));
        assert_eq!(entry.auth.host, "https://a");
        assert_eq!(entry.platform_info, info);
    }

    #[test]
    fn later_platforms_do_not_steal_the_active_pointer() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();
        store
            .save_platform_config(
                "quantgov",
                auth("t2", "https://b"),
                PlatformInfo::for_host("https://b.quantgov.cloud"),
            )
            .unwrap();

        assert_eq!(store.load().active_platform.as_deref(), Some("quantcdn"));
    }

    #[test]
    fn switch_platform_only_mutates_known_ids() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();
        store
            .save_platform_config(
                "quantgov",
                auth("t2", "https://b"),
                PlatformInfo::for_host("https://b.quantgov.cloud"),
            )
            .unwrap();

        assert!(store.switch_platform("quantgov").unwrap());
        assert_eq!(store.load().active_platform.as_deref(), Some("quantgov"));

        assert!(!store.switch_platform("nope").unwrap());
        assert_eq!(store.load().active_platform.as_deref(), Some("quantgov"));
    }

    #[test]
    fn removing_active_platform_reassigns_to_remaining() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();
        store
            .save_platform_config(
                "quantgov",
                auth("t2", "https://b"),
                PlatformInfo::for_host("https://b.quantgov.cloud"),
            )
            .unwrap();

        assert!(store.remove_platform("quantcdn").unwrap());
        let config = store.load();
        assert_eq!(config.active_platform.as_deref(), Some("quantgov"));
        assert_eq!(config.platforms.len(), 1);
    }

    #[test]
    fn removing_the_only_platform_clears_the_active_pointer() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();

        assert!(store.remove_platform("quantcdn").unwrap());
        let config = store.load();
        assert_eq!(config.active_platform, None);
        assert!(config.platforms.is_empty());
    }

    #[test]
    fn removing_an_unknown_id_leaves_the_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();

        let before = fs::read(store.path()).unwrap();
        assert!(!store.remove_platform("quantgov").unwrap());
        let after = fs::read(store.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn active_platform_config_strips_platform_info() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.get_active_platform_config().is_none());

        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();

        let active = store.get_active_platform_config().unwrap();
        assert_eq!(active.token.as_deref(), Some("t1"));
        assert_eq!(active.host, "https://a");
    }

    #[test]
    fn partial_update_preserves_platform_info_and_other_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let info = PlatformInfo::for_host("https://a.quantcdn.io");
        let mut session = auth("t1", "https://a");
        session.email = Some("dev@example.com".to_string());
        store
            .save_platform_config("quantcdn", session, info.clone())
            .unwrap();

        store
            .save_active_platform_config(AuthUpdate {
                active_organization: Some(Some("acme".to_string())),
                ..Default::default()
            })
            .unwrap();

        let config = store.load();
        let entry = &config.platforms["quantcdn"];
        assert_eq!(entry.auth.active_organization.as_deref(), Some("acme"));
        assert_eq!(entry.auth.token.as_deref(), Some("t1"));
        assert_eq!(entry.auth.email.as_deref(), Some("dev@example.com"));
        assert_eq!(entry.platform_info, info);
    }

    #[test]
    fn partial_update_without_active_platform_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store
            .save_active_platform_config(AuthUpdate::default())
            .unwrap_err();
        assert!(err.to_string().contains("No active platform"));
    }

    #[test]
    fn listings_flag_the_active_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.list_platforms().is_empty());

        store
            .save_platform_config(
                "quantcdn",
                auth("t1", "https://a"),
                PlatformInfo::for_host("https://a.quantcdn.io"),
            )
            .unwrap();
        store
            .save_platform_config(
                "quantgov",
                auth("t2", "https://b"),
                PlatformInfo::for_host("https://b.quantgov.cloud"),
            )
            .unwrap();

        let listings = store.list_platforms();
        assert_eq!(listings.len(), 2);
        assert!(listings.iter().find(|l| l.id == "quantcdn").unwrap().is_active);
        assert!(!listings.iter().find(|l| l.id == "quantgov").unwrap().is_active);
    }

    #[test]
    fn saved_store_round_trips_through_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let info = PlatformInfo::for_host("https://a.quantcdn.io");

        store
            .save_platform_config("quantcdn", auth("t1", "https://a"), info)
            .unwrap();

        let config = store.load();
        assert_eq!(config.active_platform.as_deref(), Some("quantcdn"));
        let entry = &config.platforms["quantcdn"];
        assert_eq!(entry.auth.token.as_deref(), Some("t1"));
        assert_eq!(entry.auth.host, "https://a");
        assert_eq!(entry.platform_info.id, "quantcdn");
    }
}
