//! Configuration loading with multi-layer merge

use super::{HistorySettings, PublishSettings, ServiceConfig, TemplateConfig, TrackerSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level postflow configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostflowConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub tracker: TrackerSettings,

    #[serde(default)]
    pub publish: PublishSettings,

    #[serde(default)]
    pub history: HistorySettings,

    /// Template definitions
    #[serde(default)]
    pub templates: HashMap<String, TemplateConfig>,
}

/// One config file as written: a key is `Some` exactly when the file sets it
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    service: ServiceLayer,

    #[serde(default)]
    tracker: TrackerLayer,

    #[serde(default)]
    publish: PublishLayer,

    #[serde(default)]
    history: HistoryLayer,

    #[serde(default)]
    templates: HashMap<String, TemplateConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceLayer {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackerLayer {
    poll_interval: Option<u64>,
    failure_threshold: Option<u32>,
    request_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PublishLayer {
    min_interval: Option<u64>,
    timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HistoryLayer {
    path: Option<String>,
}

impl ConfigLayer {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl PostflowConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/postflow/config.toml
    /// 3. .postflow/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                config.merge(ConfigLayer::load(&user_config_path)?);
            }
        }

        let project_config_path = Self::project_config_path(project_dir);
        if project_config_path.exists() {
            config.merge(ConfigLayer::load(&project_config_path)?);
        }

        Ok(config)
    }

    /// Load a single file over the built-in defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigLayer::load(path)?);
        Ok(config)
    }

    /// Get the user config path (~/.config/postflow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("postflow/config.toml"))
    }

    pub fn project_config_path(project_dir: Option<&Path>) -> PathBuf {
        project_dir
            .map(|p| p.join(".postflow/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".postflow/config.toml"))
    }

    /// Apply a layer on top of this config; every key the layer sets wins
    pub fn merge(&mut self, layer: ConfigLayer) {
        set(&mut self.service.base_url, layer.service.base_url);
        if layer.service.api_key.is_some() {
            self.service.api_key = layer.service.api_key;
        }
        set(&mut self.service.timeout, layer.service.timeout);

        set(&mut self.tracker.poll_interval, layer.tracker.poll_interval);
        set(&mut self.tracker.failure_threshold, layer.tracker.failure_threshold);
        set(&mut self.tracker.request_timeout, layer.tracker.request_timeout);

        set(&mut self.publish.min_interval, layer.publish.min_interval);
        set(&mut self.publish.timeout, layer.publish.timeout);

        if layer.history.path.is_some() {
            self.history.path = layer.history.path;
        }

        // Templates (later layer wins for same id)
        self.templates.extend(layer.templates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PostflowConfig::default();
        assert!(config.service.base_url.is_empty());
        assert_eq!(config.service.timeout, 30);
        assert_eq!(config.tracker.poll_interval, 5);
        assert_eq!(config.tracker.failure_threshold, 5);
        assert_eq!(config.publish.min_interval, 60);
        assert!(config.history.path.is_none());
        assert!(config.templates.is_empty());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [service]
            base_url = "https://content.example.com/api"
            api_key = "sk-test"

            [tracker]
            poll_interval = 10

            [history]
            path = "~/.local/share/postflow/history.db"

            [templates.full]
            name = "Full content run"
            steps = ["affirmations", "captions", "images"]

            [templates.full.default_options]
            count = 5
        "#
        )
        .unwrap();

        let config = PostflowConfig::load_file(&config_path).unwrap();
        assert_eq!(config.service.base_url, "https://content.example.com/api");
        assert_eq!(config.service.api_key, Some("sk-test".into()));
        assert_eq!(config.tracker.poll_interval, 10);
        assert_eq!(config.tracker.request_timeout, 30);
        assert_eq!(config.templates["full"].steps.len(), 3);
        assert_eq!(config.templates["full"].default_options["count"], 5);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[tracker]\npoll_every = 3\n").unwrap();

        assert!(PostflowConfig::load_file(&config_path).is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = PostflowConfig::default();
        base.merge(
            ConfigLayer::parse(
                r#"
            [service]
            base_url = "https://user.example.com"
            api_key = "user-key"

            [publish]
            min_interval = 120

            [templates.full]
            name = "User full"
        "#,
            )
            .unwrap(),
        );

        let project = ConfigLayer::parse(
            r#"
            [service]
            base_url = "https://project.example.com"

            [templates.full]
            name = "Project full"

            [templates.quick]
            name = "Quick"
        "#,
        )
        .unwrap();

        base.merge(project);

        // Project wins for keys it sets
        assert_eq!(base.service.base_url, "https://project.example.com");
        assert_eq!(base.templates["full"].name, "Project full");

        // User values survive where the project is silent
        assert_eq!(base.service.api_key, Some("user-key".into()));
        assert_eq!(base.publish.min_interval, 120);

        assert!(base.templates.contains_key("quick"));
    }

    #[test]
    fn test_project_can_restore_default_value() {
        let mut config = PostflowConfig::default();
        config.merge(
            ConfigLayer::parse("[tracker]\npoll_interval = 30\n\n[publish]\nmin_interval = 300\n").unwrap(),
        );
        config.merge(
            ConfigLayer::parse("[tracker]\npoll_interval = 5\n\n[publish]\nmin_interval = 60\n").unwrap(),
        );

        assert_eq!(config.tracker.poll_interval, 5);
        assert_eq!(config.publish.min_interval, 60);
    }

    #[test]
    fn test_empty_layer_changes_nothing() {
        let mut config = PostflowConfig::default();
        config.merge(ConfigLayer::parse("[tracker]\nfailure_threshold = 2\n").unwrap());
        config.merge(ConfigLayer::parse("").unwrap());

        assert_eq!(config.tracker.failure_threshold, 2);
        assert_eq!(config.tracker.poll_interval, 5);
    }

    #[test]
    fn test_load_reads_project_layer() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".postflow")).unwrap();
        std::fs::write(
            dir.path().join(".postflow/config.toml"),
            "[tracker]\nfailure_threshold = 2\n",
        )
        .unwrap();

        let config = PostflowConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.tracker.failure_threshold, 2);
    }
}
