use crate::errors::BimockError;
use crate::logging::{JsonlLogger, DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::types::Mode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MIN_EVENT_PAYLOAD_BYTES: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub resource_dir: Option<PathBuf>,
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BimockConfig {
    pub storage: StorageConfig,
    pub mode: ModeConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub resource_dir: PathBuf,
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeConfig {
    pub default: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventsConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for BimockConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                resource_dir: PathBuf::from("tests/bimock"),
                extension: "jsonl".to_string(),
            },
            mode: ModeConfig {
                default: Mode::Replay,
            },
            events: EventsConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

impl BimockConfig {
    /// Log file for the resource called `name`.
    pub fn resource_path(&self, name: &str) -> PathBuf {
        self.storage
            .resource_dir
            .join(format!("{name}.{}", self.storage.extension))
    }

    pub fn event_logger(&self) -> Option<JsonlLogger> {
        self.events.path.as_ref().map(|path| {
            let mut logger = JsonlLogger::new(path);
            logger.max_payload_bytes = self.events.max_payload_bytes;
            logger.budget_bytes = self.events.budget_bytes;
            logger
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialBimockConfig {
    storage: Option<PartialStorageConfig>,
    mode: Option<PartialModeConfig>,
    events: Option<PartialEventsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStorageConfig {
    resource_dir: Option<PathBuf>,
    extension: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialModeConfig {
    default: Option<Mode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialEventsConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<BimockConfig, BimockError> {
    let mut cfg = BimockConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialBimockConfig = toml::from_str(&file_contents)
            .map_err(|e| BimockError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);

    cfg.storage.resource_dir = absolutize_path(process_cwd, &cfg.storage.resource_dir);
    cfg.events.path = cfg
        .events
        .path
        .as_deref()
        .map(|path| absolutize_path(process_cwd, path));

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut BimockConfig, partial: PartialBimockConfig) {
    if let Some(storage) = partial.storage {
        if let Some(resource_dir) = storage.resource_dir {
            cfg.storage.resource_dir = resource_dir;
        }
        if let Some(extension) = storage.extension {
            cfg.storage.extension = extension;
        }
    }

    if let Some(mode) = partial.mode {
        if let Some(default) = mode.default {
            cfg.mode.default = default;
        }
    }

    if let Some(events) = partial.events {
        if let Some(path) = events.path {
            cfg.events.path = Some(path);
        }
        if let Some(value) = events.max_payload_bytes {
            cfg.events.max_payload_bytes = value;
        }
        if let Some(value) = events.budget_bytes {
            cfg.events.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut BimockConfig, overrides: &CliOverrides) {
    if let Some(resource_dir) = &overrides.resource_dir {
        cfg.storage.resource_dir = resource_dir.clone();
    }
    if let Some(mode) = overrides.mode {
        cfg.mode.default = mode;
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &BimockConfig) -> Result<(), BimockError> {
    let extension = cfg.storage.extension.trim();
    if extension.is_empty() || extension.starts_with('.') {
        return Err(BimockError::InvalidConfig(
            "storage.extension must be a non-empty extension without a leading dot".to_string(),
        ));
    }

    if cfg.events.max_payload_bytes < MIN_EVENT_PAYLOAD_BYTES {
        return Err(BimockError::InvalidConfig(format!(
            "events.max_payload_bytes must be at least {MIN_EVENT_PAYLOAD_BYTES}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;

    #[test]
    fn defaults_resolve_against_process_cwd() {
        let fs = FakeFileSystem::default();
        let cfg = load_config(&CliOverrides::default(), Path::new("/work"), &fs).expect("load");
        assert_eq!(cfg.storage.resource_dir, PathBuf::from("/work/tests/bimock"));
        assert_eq!(cfg.mode.default, Mode::Replay);
        assert!(cfg.event_logger().is_none());
        assert_eq!(
            cfg.resource_path("calculator"),
            PathBuf::from("/work/tests/bimock/calculator.jsonl")
        );
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let fs = FakeFileSystem::with_file(
            "/bimock.toml",
            r#"
            [mode]
            default = "record"

            [events]
            path = ".bimock/events.jsonl"
            max_payload_bytes = 512
            "#,
        );
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/bimock.toml")),
            ..CliOverrides::default()
        };
        let cfg = load_config(&overrides, Path::new("/work"), &fs).expect("load");
        assert_eq!(cfg.mode.default, Mode::Record);
        assert_eq!(cfg.storage.extension, "jsonl");
        let logger = cfg.event_logger().expect("events configured");
        assert_eq!(logger.path, PathBuf::from("/work/.bimock/events.jsonl"));
        assert_eq!(logger.max_payload_bytes, 512);
        assert_eq!(logger.budget_bytes, DEFAULT_DISK_BUDGET_BYTES);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let fs = FakeFileSystem::with_file(
            "/bimock.toml",
            "[storage]\nresource_dir = \"fixtures\"\n[mode]\ndefault = \"record\"\n",
        );
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/bimock.toml")),
            resource_dir: Some(PathBuf::from("/abs/logs")),
            mode: Some(Mode::Replay),
        };
        let cfg = load_config(&overrides, Path::new("/work"), &fs).expect("load");
        assert_eq!(cfg.storage.resource_dir, PathBuf::from("/abs/logs"));
        assert_eq!(cfg.mode.default, Mode::Replay);
    }

    #[test]
    fn rejects_invalid_values() {
        let fs = FakeFileSystem::with_file("/bad.toml", "[storage]\nextension = \".json\"\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/bad.toml")),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/"), &fs).expect_err("leading dot");
        assert!(matches!(err, BimockError::InvalidConfig(_)));

        let fs = FakeFileSystem::with_file("/bad.toml", "[events]\nmax_payload_bytes = 4\n");
        let err = load_config(&overrides, Path::new("/"), &fs).expect_err("tiny payload");
        assert!(err.to_string().contains("max_payload_bytes"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/bad.toml", "[mode\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/bad.toml")),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/"), &fs).expect_err("parse");
        assert!(matches!(err, BimockError::ConfigParse(_)));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/bad.toml", "[mode]\ndefault = \"spy\"\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/bad.toml")),
            ..CliOverrides::default()
        };
        assert!(matches!(
            load_config(&overrides, Path::new("/"), &fs),
            Err(BimockError::ConfigParse(_))
        ));
    }
}
