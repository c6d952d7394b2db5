//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from OPENED_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the client secret
pub const CLIENT_SECRET_ENV: &str = "OPENED_CLIENT_SECRET";

/// Config file used when neither --config nor CONFIG_PATH is given
pub const DEFAULT_CONFIG_FILE: &str = "opened-signing-server.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub opened: OpenEdConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Time allowed for in-flight requests after a shutdown signal
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

/// Credentials shared with OpenEd
#[derive(Debug, Deserialize)]
pub struct OpenEdConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to OPENED_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_drain_timeout() -> u64 {
    5
}

impl ServerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then resolve the client secret.
    ///
    /// Secret resolution order:
    /// 1. OPENED_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    ///
    /// A config without a secret is rejected; the server cannot sign anything.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.opened.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.server.drain_timeout_secs == 0 {
            return Err(common::Error::Config(
                "drain_timeout_secs must be greater than 0".into(),
            ));
        }

        // Env var takes precedence over file
        match std::env::var(CLIENT_SECRET_ENV) {
            Ok(secret) if !secret.trim().is_empty() => {
                config.opened.client_secret = Some(Secret::new(secret.trim().to_owned()));
            }
            _ => {
                if let Some(ref secret_file) = config.opened.client_secret_file {
                    config.opened.client_secret = Secret::from_file(secret_file)?;
                }
            }
        }

        if config.opened.client_secret.is_none() {
            return Err(common::Error::Config(format!(
                "client secret missing: set {CLIENT_SECRET_ENV} or client_secret_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    const VALID_TOML: &str = r#"
[server]
listen_addr = "127.0.0.1:1337"

[opened]
client_id = "d5469f8af59cb6f8"
"#;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_valid_config_with_env_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, VALID_TOML);

        unsafe { set_env(CLIENT_SECRET_ENV, "env-secret") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        assert_eq!(config.server.listen_addr.port(), 1337);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.drain_timeout(), Duration::from_secs(5));
        assert_eq!(config.opened.client_id, "d5469f8af59cb6f8");
        assert_eq!(
            config.opened.client_secret.as_ref().unwrap().expose(),
            "env-secret"
        );
    }

    #[test]
    fn secret_from_file_is_trimmed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "file-secret\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "{VALID_TOML}client_secret_file = \"{}\"\n",
                secret_path.display()
            ),
        );

        unsafe { remove_env(CLIENT_SECRET_ENV) };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.opened.client_secret.as_ref().unwrap().expose(),
            "file-secret"
        );
    }

    #[test]
    fn env_secret_wins_over_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "file-secret").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "{VALID_TOML}client_secret_file = \"{}\"\n",
                secret_path.display()
            ),
        );

        unsafe { set_env(CLIENT_SECRET_ENV, "env-secret") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env(CLIENT_SECRET_ENV) };

        assert_eq!(
            config.opened.client_secret.as_ref().unwrap().expose(),
            "env-secret"
        );
    }

    #[test]
    fn missing_secret_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("secret");
        std::fs::write(&secret_path, "   \n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                "{VALID_TOML}client_secret_file = \"{}\"\n",
                secret_path.display()
            ),
        );

        unsafe { remove_env(CLIENT_SECRET_ENV) };
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains(CLIENT_SECRET_ENV), "got: {err}");
    }

    #[test]
    fn unreadable_secret_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!("{VALID_TOML}client_secret_file = \"/nonexistent/secret\"\n"),
        );

        unsafe { remove_env(CLIENT_SECRET_ENV) };
        assert!(matches!(
            Config::load(&path),
            Err(common::Error::SecretFile { .. })
        ));
    }

    #[test]
    fn rejects_zero_limits_and_blank_client_id() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        unsafe { set_env(CLIENT_SECRET_ENV, "s") };

        for bad in [
            VALID_TOML.replace("listen_addr = \"127.0.0.1:1337\"", "listen_addr = \"127.0.0.1:1337\"\nmax_connections = 0"),
            VALID_TOML.replace("listen_addr = \"127.0.0.1:1337\"", "listen_addr = \"127.0.0.1:1337\"\ndrain_timeout_secs = 0"),
            VALID_TOML.replace("d5469f8af59cb6f8", "  "),
        ] {
            let path = write_config(&dir, &bad);
            assert!(
                matches!(Config::load(&path), Err(common::Error::Config(_))),
                "should reject:\n{bad}"
            );
        }

        unsafe { remove_env(CLIENT_SECRET_ENV) };
    }

    #[test]
    fn missing_file_and_invalid_toml_fail() {
        assert!(Config::load(Path::new("/nonexistent/path/config.toml")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();

        unsafe { set_env("CONFIG_PATH", "/etc/from-env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/cli.toml")),
            PathBuf::from("/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/from-env.toml")
        );

        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from(DEFAULT_CONFIG_FILE)
        );
    }
}
