//! Configuration for the evidence store.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (AGS_HOME, AGS_API_ENDPOINT, AGS_API_KEY)
//! 2. Config file (.ags/config.yaml)
//! 3. Defaults (~/.ags)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ags/config.yaml
//! - `paths.home` is relative to the .ags/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::collector::RetryPolicy;
use crate::core::PaginationSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".ags";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Store state directory (relative to .ags/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: Option<usize>,
    pub max_page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectorConfig {
    /// Evidence API base URL; collectors submit locally when unset
    pub api_endpoint: Option<String>,
    pub provider_id: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// Collector settings after overrides
#[derive(Debug, Clone, Default)]
pub struct CollectorSettings {
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub provider_id: Option<String>,
    pub retry: RetryPolicy,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory holding the local registry, ledger and content store
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub pagination: PaginationSettings,
    pub collector: CollectorSettings,
}

impl ResolvedConfig {
    /// SQLite provider and schema registry
    pub fn registry_path(&self) -> PathBuf {
        self.home.join("registry.db")
    }

    /// Ledger journal
    pub fn ledger_path(&self) -> PathBuf {
        self.home.join("ledger.jsonl")
    }

    /// Blob store root
    pub fn content_dir(&self) -> PathBuf {
        self.home.join("content")
    }
}

/// Values taken from the environment
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    home: Option<String>,
    api_endpoint: Option<String>,
    api_key: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            home: var("AGS_HOME"),
            api_endpoint: var("AGS_API_ENDPOINT"),
            api_key: var("AGS_API_KEY"),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file, environment and defaults
fn resolve(
    config_path: Option<&Path>,
    file: ConfigFile,
    env: EnvOverrides,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let home = if let Some(env_home) = env.home {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(config_path)) = (&file.paths.home, config_path) {
        let ags_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(ags_dir, home_path)
    } else {
        default_home
    };

    let defaults = PaginationSettings::default();
    let pagination = match file.pagination {
        Some(p) => PaginationSettings {
            default_page_size: p.default_page_size.unwrap_or(defaults.default_page_size),
            max_page_size: p.max_page_size.unwrap_or(defaults.max_page_size),
        },
        None => defaults,
    };
    if pagination.max_page_size == 0 || pagination.default_page_size == 0 {
        anyhow::bail!("pagination page sizes must be at least 1");
    }

    let collector_file = file.collector.unwrap_or_default();
    let collector = CollectorSettings {
        api_endpoint: env.api_endpoint.or(collector_file.api_endpoint),
        api_key: env.api_key,
        provider_id: collector_file.provider_id,
        retry: collector_file.retry.unwrap_or_default(),
    };

    Ok(ResolvedConfig {
        home,
        config_file: config_path.map(Path::to_path_buf),
        pagination,
        collector,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let config_path = find_config_file();
    let file = match config_path {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(
        config_path.as_deref(),
        file,
        EnvOverrides::from_env(),
        default_home,
    )
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, yaml: &str) -> PathBuf {
        let ags_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&ags_dir).unwrap();
        let config_path = ags_dir.join(CONFIG_FILE);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        config_path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(
            None,
            ConfigFile::default(),
            EnvOverrides::default(),
            PathBuf::from("/home/user/.ags"),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/home/user/.ags"));
        assert_eq!(config.pagination, PaginationSettings::default());
        assert_eq!(config.collector.retry, RetryPolicy::default());
        assert!(config.collector.api_endpoint.is_none());
        assert_eq!(config.registry_path(), PathBuf::from("/home/user/.ags/registry.db"));
        assert_eq!(config.ledger_path(), PathBuf::from("/home/user/.ags/ledger.jsonl"));
        assert_eq!(config.content_dir(), PathBuf::from("/home/user/.ags/content"));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1.0"
paths:
  home: ./state
pagination:
  default_page_size: 10
  max_page_size: 50
collector:
  api_endpoint: https://evidence.example.com/prod
  provider_id: scanner
  retry:
    max_attempts: 5
"#,
        );

        let file = load_config_file(&config_path).unwrap();
        assert_eq!(file.version.as_deref(), Some("1.0"));
        assert_eq!(file.paths.home.as_deref(), Some("./state"));

        let config = resolve(
            Some(&config_path),
            file,
            EnvOverrides::default(),
            PathBuf::from("/unused"),
        )
        .unwrap();

        assert_eq!(config.home, temp.path().join(CONFIG_DIR).join("./state"));
        assert_eq!(config.pagination.default_page_size, 10);
        assert_eq!(config.pagination.max_page_size, 50);
        assert_eq!(config.collector.provider_id.as_deref(), Some("scanner"));
        assert_eq!(config.collector.retry.max_attempts, 5);
        // Unset retry fields keep their defaults
        assert_eq!(config.collector.retry.initial_delay_ms, 200);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            paths: PathsConfig {
                home: Some("/from/file".to_string()),
            },
            collector: Some(CollectorConfig {
                api_endpoint: Some("https://file.example.com".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env = EnvOverrides {
            home: Some("/from/env".to_string()),
            api_endpoint: Some("https://env.example.com".to_string()),
            api_key: Some("secret".to_string()),
        };

        let config = resolve(
            Some(Path::new("/project/.ags/config.yaml")),
            file,
            env,
            PathBuf::from("/unused"),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/from/env"));
        assert_eq!(
            config.collector.api_endpoint.as_deref(),
            Some("https://env.example.com")
        );
        assert_eq!(config.collector.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let file = ConfigFile {
            pagination: Some(PaginationConfig {
                default_page_size: Some(0),
                max_page_size: None,
            }),
            ..Default::default()
        };

        assert!(resolve(None, file, EnvOverrides::default(), PathBuf::from("/x")).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
