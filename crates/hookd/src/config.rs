//! Daemon configuration.
//!
//! Settings come from `hookd serve` flags (each with an environment
//! fallback) layered over an optional TOML file:
//!
//! ```toml
//! port = 8085
//!
//! [platform]
//! url = "http://cattle:8080/v2-beta"
//! access_key = "..."
//! secret_key = "..."
//!
//! [keys]
//! signing_key_file = "/etc/hookgrid/signing.pem"
//! verifying_key_file = "/etc/hookgrid/verifying.pem"
//!
//! [upgrade]
//! poll_interval_secs = 5
//! max_polls = 36
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use hookgrid_drivers::UpgradePolicy;
use hookgrid_platform::Credentials;
use hookgrid_token::KeySource;
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 8085;

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Port to listen on [default: 8085].
    #[arg(long, env = "HOOKD_PORT")]
    pub port: Option<u16>,

    /// TOML configuration file.
    #[arg(long, env = "HOOKD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the platform API.
    #[arg(long, env = "CATTLE_URL")]
    pub platform_url: Option<String>,

    #[arg(long, env = "CATTLE_ACCESS_KEY")]
    pub platform_access_key: Option<String>,

    #[arg(long, env = "CATTLE_SECRET_KEY", hide_env_values = true)]
    pub platform_secret_key: Option<String>,

    /// PKCS#8 PEM file holding the token signing key.
    #[arg(long)]
    pub signing_key_file: Option<PathBuf>,

    #[arg(long, env = "SIGNING_KEY_CONTENTS", hide_env_values = true)]
    pub signing_key_contents: Option<String>,

    /// SPKI PEM file holding the token verifying key.
    #[arg(long)]
    pub verifying_key_file: Option<PathBuf>,

    #[arg(long, env = "VERIFYING_KEY_CONTENTS")]
    pub verifying_key_contents: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

// ── File layer ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    #[serde(default)]
    pub platform: PlatformSection,
    #[serde(default)]
    pub keys: KeysSection,
    #[serde(default)]
    pub upgrade: UpgradeSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformSection {
    pub url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeysSection {
    pub signing_key_file: Option<PathBuf>,
    pub signing_key_contents: Option<String>,
    pub verifying_key_file: Option<PathBuf>,
    pub verifying_key_contents: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeSection {
    pub poll_interval_secs: Option<u64>,
    pub max_polls: Option<u32>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }
}

// ── Resolved settings ──────────────────────────────────────────

/// Everything `hookd serve` needs to start.
#[derive(Debug)]
pub struct Settings {
    pub port: u16,
    pub platform_url: String,
    pub credentials: Credentials,
    pub signing_key: KeySource,
    pub verifying_key: KeySource,
    pub upgrade: UpgradePolicy,
}

impl Settings {
    /// Load the file named by `--config`, if any, and resolve against it.
    pub fn load(args: ServeArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Flag and environment values win over file values.
    pub fn resolve(args: ServeArgs, file: FileConfig) -> anyhow::Result<Self> {
        let platform_url = args
            .platform_url
            .or(file.platform.url)
            .context("platform url not configured (--platform-url or CATTLE_URL)")?;
        let credentials = Credentials {
            access_key: args
                .platform_access_key
                .or(file.platform.access_key)
                .unwrap_or_default(),
            secret_key: args
                .platform_secret_key
                .or(file.platform.secret_key)
                .unwrap_or_default(),
        };

        let signing_key = key_source(
            (args.signing_key_file, args.signing_key_contents),
            (file.keys.signing_key_file, file.keys.signing_key_contents),
            "signing-key",
        )?;
        let verifying_key = key_source(
            (args.verifying_key_file, args.verifying_key_contents),
            (file.keys.verifying_key_file, file.keys.verifying_key_contents),
            "verifying-key",
        )?;

        let defaults = UpgradePolicy::default();
        let upgrade = UpgradePolicy {
            poll_interval: file
                .upgrade
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_polls: file.upgrade.max_polls.unwrap_or(defaults.max_polls),
        };
        if upgrade.max_polls == 0 {
            bail!("upgrade.max_polls must be at least 1");
        }
        if upgrade.poll_interval.is_zero() {
            bail!("upgrade.poll_interval_secs must be at least 1");
        }

        Ok(Self {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            platform_url,
            credentials,
            signing_key,
            verifying_key,
            upgrade,
        })
    }
}

type KeyOptions = (Option<PathBuf>, Option<String>);

/// A key given on the command line replaces the file's entry for that key
/// as a whole, so a CLI path never clashes with file contents.
fn key_source(cli: KeyOptions, file: KeyOptions, what: &str) -> anyhow::Result<KeySource> {
    let (path, contents) = if cli.0.is_some() || cli.1.is_some() {
        cli
    } else {
        file
    };
    Ok(KeySource::from_options(path, contents, what)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_keys() -> ServeArgs {
        ServeArgs {
            platform_url: Some("http://cattle:8080/v2-beta".into()),
            signing_key_file: Some("/keys/signing.pem".into()),
            verifying_key_contents: Some("PEM".into()),
            ..ServeArgs::default()
        }
    }

    #[test]
    fn defaults_apply_without_file() {
        let settings = Settings::resolve(args_with_keys(), FileConfig::default()).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.upgrade, UpgradePolicy::default());
        assert_eq!(
            settings.signing_key,
            KeySource::File("/keys/signing.pem".into())
        );
        assert_eq!(settings.verifying_key, KeySource::Contents("PEM".into()));
    }

    #[test]
    fn file_values_fill_gaps_and_flags_override() {
        let file: FileConfig = toml::from_str(
            r#"
port = 9000

[platform]
url = "http://file:8080"
access_key = "ak"

[keys]
signing_key_contents = "FILE-PEM"
verifying_key_file = "/file/verifying.pem"

[upgrade]
poll_interval_secs = 2
max_polls = 10
"#,
        )
        .unwrap();

        let args = ServeArgs {
            port: Some(8100),
            ..args_with_keys()
        };
        let settings = Settings::resolve(args, file.clone()).unwrap();
        assert_eq!(settings.port, 8100);
        assert_eq!(settings.platform_url, "http://cattle:8080/v2-beta");
        assert_eq!(settings.credentials.access_key, "ak");
        // CLI signing key wins over the file's contents.
        assert_eq!(
            settings.signing_key,
            KeySource::File("/keys/signing.pem".into())
        );
        assert_eq!(settings.upgrade.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.upgrade.max_polls, 10);

        let settings = Settings::resolve(ServeArgs::default(), file).unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.platform_url, "http://file:8080");
        assert_eq!(
            settings.verifying_key,
            KeySource::File("/file/verifying.pem".into())
        );
    }

    #[test]
    fn key_options_are_exclusive_and_required() {
        let both = ServeArgs {
            signing_key_contents: Some("PEM".into()),
            ..args_with_keys()
        };
        let err = Settings::resolve(both, FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("both"));

        let missing = ServeArgs {
            verifying_key_contents: None,
            ..args_with_keys()
        };
        let err = Settings::resolve(missing, FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("must be provided"));
    }

    #[test]
    fn zero_upgrade_polling_is_rejected() {
        for section in ["max_polls = 0", "poll_interval_secs = 0"] {
            let file: FileConfig = toml::from_str(&format!("[upgrade]\n{section}")).unwrap();
            let err = Settings::resolve(args_with_keys(), file).unwrap_err();
            assert!(err.to_string().contains("at least 1"), "{section}: {err}");
        }
    }

    #[test]
    fn missing_platform_url_is_fatal() {
        let args = ServeArgs {
            platform_url: None,
            ..args_with_keys()
        };
        assert!(Settings::resolve(args, FileConfig::default()).is_err());
    }

    #[test]
    fn from_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upgrade]\nmax_poll = 3").unwrap();
        assert!(FileConfig::from_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upgrade]\nmax_polls = 3").unwrap();
        let config = FileConfig::from_file(file.path()).unwrap();
        assert_eq!(config.upgrade.max_polls, Some(3));
    }
}
