use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::Timeouts;
use crate::retry::RetryPolicy;

/// Reconnect policy for interrupted downloads (optional `[retry]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first reopen attempt.
    pub retry_limit: u32,
    pub initial_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            initial_wait_ms: 500,
            max_wait_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_limit: self.retry_limit,
            initial_wait: Duration::from_millis(self.initial_wait_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

/// Optional `[timeouts]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    /// Abort when the transfer stays under 1 byte/s this long.
    pub low_speed_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            low_speed_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_secs),
            low_speed: Duration::from_secs(self.low_speed_secs),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pattern() -> String {
    ".*".to_string()
}

/// Input configuration, usually `~/.config/ftpin/config.toml`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpInputConfig {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub passive_mode: bool,
    #[serde(default)]
    pub ascii_mode: bool,
    #[serde(default)]
    pub ssl: bool,
    /// `AUTH TLS` on a plain connection; false means implicit TLS.
    #[serde(default = "default_true")]
    pub ssl_explicit: bool,
    /// `None` verifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_verify: Option<bool>,
    #[serde(default = "default_true")]
    pub ssl_verify_hostname: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_trusted_ca_cert_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_trusted_ca_cert_data: Option<String>,
    pub path_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_path: Option<String>,
    #[serde(default = "default_pattern")]
    pub path_match_pattern: String,
    #[serde(default = "default_true")]
    pub incremental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutConfig>,
}

impl FtpInputConfig {
    pub fn new(host: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            password: None,
            passive_mode: true,
            ascii_mode: false,
            ssl: false,
            ssl_explicit: true,
            ssl_verify: None,
            ssl_verify_hostname: true,
            ssl_trusted_ca_cert_file: None,
            ssl_trusted_ca_cert_data: None,
            path_prefix: path_prefix.into(),
            last_path: None,
            path_match_pattern: default_pattern(),
            incremental: true,
            retry: None,
            timeouts: None,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().policy()
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts.clone().unwrap_or_default().timeouts()
    }
}

impl std::fmt::Debug for FtpInputConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpInputConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("passive_mode", &self.passive_mode)
            .field("ascii_mode", &self.ascii_mode)
            .field("ssl", &self.ssl)
            .field("ssl_explicit", &self.ssl_explicit)
            .field("ssl_verify", &self.ssl_verify)
            .field("ssl_verify_hostname", &self.ssl_verify_hostname)
            .field("ssl_trusted_ca_cert_file", &self.ssl_trusted_ca_cert_file)
            .field(
                "ssl_trusted_ca_cert_data",
                &self.ssl_trusted_ca_cert_data.as_ref().map(|_| "<pem>"),
            )
            .field("path_prefix", &self.path_prefix)
            .field("last_path", &self.last_path)
            .field("path_match_pattern", &self.path_match_pattern)
            .field("incremental", &self.incremental)
            .field("retry", &self.retry)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ftpin")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

pub fn load_from_path(path: &Path) -> Result<FtpInputConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: FtpInputConfig =
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

/// Load `~/.config/ftpin/config.toml`.
pub fn load() -> Result<FtpInputConfig> {
    let path = config_path()?;
    load_from_path(&path)
}

/// Write `last_path` back into the config file at `path`, keeping every
/// other key as it was.
pub fn store_last_path(path: &Path, last_path: Option<&str>) -> Result<()> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut doc: toml::Table =
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    match last_path {
        Some(p) => {
            doc.insert("last_path".to_string(), toml::Value::String(p.to_string()));
        }
        None => {
            doc.remove("last_path");
        }
    }
    let out = toml::to_string_pretty(&doc)?;
    fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(last_path = ?last_path, "updated {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_gets_defaults() {
        let toml = r#"
            host = "ftp.example.com"
            path_prefix = "/data/sample_"
        "#;
        let cfg: FtpInputConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg, FtpInputConfig::new("ftp.example.com", "/data/sample_"));
        assert!(cfg.passive_mode);
        assert!(!cfg.ascii_mode);
        assert!(cfg.ssl_explicit);
        assert!(cfg.ssl_verify.is_none());
        assert!(cfg.ssl_verify_hostname);
        assert_eq!(cfg.path_match_pattern, ".*");
        assert!(cfg.incremental);
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.timeouts(), Timeouts::default());
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let err = toml::from_str::<FtpInputConfig>("host = \"h\"").unwrap_err();
        assert!(err.to_string().contains("path_prefix"));
    }

    #[test]
    fn full_config() {
        let toml = r#"
            host = "ftp.example.com"
            port = 2121
            user = "scott"
            password = "tiger"
            passive_mode = false
            ascii_mode = true
            ssl = true
            ssl_explicit = false
            ssl_verify = false
            path_prefix = "/data/"
            last_path = "/data/a.csv"
            path_match_pattern = "\\.csv$"
            incremental = false

            [retry]
            retry_limit = 5
            initial_wait_ms = 100

            [timeouts]
            connect_secs = 5
        "#;
        let cfg: FtpInputConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.port, Some(2121));
        assert_eq!(cfg.user.as_deref(), Some("scott"));
        assert!(!cfg.passive_mode);
        assert!(cfg.ascii_mode);
        assert_eq!(cfg.ssl_verify, Some(false));
        assert_eq!(cfg.last_path.as_deref(), Some("/data/a.csv"));
        assert!(!cfg.incremental);
        let policy = cfg.retry_policy();
        assert_eq!(policy.retry_limit, 5);
        assert_eq!(policy.initial_wait, Duration::from_millis(100));
        assert_eq!(policy.max_wait, Duration::from_secs(30));
        assert_eq!(cfg.timeouts().connect, Duration::from_secs(5));
        assert_eq!(cfg.timeouts().low_speed, Duration::from_secs(60));
    }

    #[test]
    fn debug_hides_password() {
        let mut cfg = FtpInputConfig::new("h", "/");
        cfg.password = Some("tiger".to_string());
        let s = format!("{:?}", cfg);
        assert!(!s.contains("tiger"));
    }

    #[test]
    fn toml_roundtrip() {
        let mut cfg = FtpInputConfig::new("h", "/data/");
        cfg.retry = Some(RetryConfig::default());
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FtpInputConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn store_last_path_keeps_other_keys() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"host = \"h\"\npath_prefix = \"/data/\"\n").unwrap();
        f.flush().unwrap();

        store_last_path(f.path(), Some("/data/b.csv")).unwrap();
        let cfg = load_from_path(f.path()).unwrap();
        assert_eq!(cfg.host, "h");
        assert_eq!(cfg.last_path.as_deref(), Some("/data/b.csv"));

        store_last_path(f.path(), None).unwrap();
        assert!(load_from_path(f.path()).unwrap().last_path.is_none());
    }
}
