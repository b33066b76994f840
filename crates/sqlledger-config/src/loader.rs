use std::path::{Path, PathBuf};

use sqlledger_common::{Error, Result};

use crate::model::AppConfig;

const CONFIG_FILE_NAMES: [&str; 3] = ["sqlledger.yml", "sqlledger.yaml", "sqlledger.toml"];
const ENV_PREFIX: &str = "SQLLEDGER_";

/// Builds an [`AppConfig`] from an optional file plus `SQLLEDGER_*`
/// environment variables. Environment wins over the file.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// The config file `load` reads: the explicit path, or the first of
    /// `sqlledger.yml`, `sqlledger.yaml` or `sqlledger.toml` in the working
    /// directory.
    pub fn source(&self) -> Option<PathBuf> {
        self.source_in(Path::new("."))
    }

    fn source_in(&self, dir: &Path) -> Option<PathBuf> {
        match &self.path {
            Some(path) => Some(path.clone()),
            None => discover(dir),
        }
    }

    /// Load `.env`, then the config file, then environment overrides.
    ///
    /// Without a config file the defaults apply. Runs before the tracing
    /// subscriber is installed, so it does not log.
    pub fn load(&self) -> Result<AppConfig> {
        dotenvy::dotenv().ok();

        let config = match self.source() {
            Some(path) => read_config(&path)?,
            None => AppConfig::default(),
        };

        apply_env_overrides(config, |key| std::env::var(key).ok())
    }
}

/// First known config file name present in `dir`.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

pub fn read_config(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

/// Apply `SQLLEDGER_*` overrides looked up through `var`.
pub fn apply_env_overrides<F>(mut config: AppConfig, var: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| var(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

    if let Some(dir) = get("MIGRATIONS_DIR") {
        config.migrations_dir = PathBuf::from(dir);
    }
    if let Some(path) = get("DATABASE") {
        config.database.path = PathBuf::from(path);
    }
    if let Some(schema) = get("SCHEMA") {
        config.database.schema = Some(schema);
    }
    if let Some(value) = get("DOWN_MODE") {
        config.down_mode = parse_bool("DOWN_MODE", &value)?;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(value) = get("LOG_JSON") {
        config.log.json = parse_bool("LOG_JSON", &value)?;
    }

    Ok(config)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{ENV_PREFIX}{name} must be a boolean, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlledger.yml");
        std::fs::write(
            &path,
            "migrations_dir: db/migrations\ndatabase:\n  path: app.db\n  schema: main\ndown_mode: true\n",
        )
        .unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.database.path, PathBuf::from("app.db"));
        assert_eq!(config.database.schema.as_deref(), Some("main"));
        assert!(config.down_mode);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn reads_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlledger.toml");
        std::fs::write(&path, "[log]\nlevel = \"debug\"\njson = true\n").unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.log.level, "debug");
        assert!(config.log.json);
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert!(!config.down_mode);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlledger.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(read_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn discovers_first_known_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover(dir.path()), None);

        std::fs::write(dir.path().join("sqlledger.toml"), "").unwrap();
        std::fs::write(dir.path().join("sqlledger.yaml"), "{}").unwrap();
        assert_eq!(
            discover(dir.path()),
            Some(dir.path().join("sqlledger.yaml"))
        );
    }

    #[test]
    fn source_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sqlledger.yml"), "{}").unwrap();

        let explicit = ConfigLoader::new(Some(PathBuf::from("custom.toml")));
        assert_eq!(
            explicit.source_in(dir.path()),
            Some(PathBuf::from("custom.toml"))
        );

        let discovered = ConfigLoader::new(None);
        assert_eq!(
            discovered.source_in(dir.path()),
            Some(dir.path().join("sqlledger.yml"))
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let config = apply_env_overrides(
            AppConfig::default(),
            env(&[
                ("SQLLEDGER_MIGRATIONS_DIR", "sql"),
                ("SQLLEDGER_DATABASE", "/tmp/x.db"),
                ("SQLLEDGER_SCHEMA", "ops"),
                ("SQLLEDGER_DOWN_MODE", "yes"),
                ("SQLLEDGER_LOG_JSON", "1"),
                ("SQLLEDGER_LOG_LEVEL", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.migrations_dir, PathBuf::from("sql"));
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.database.schema.as_deref(), Some("ops"));
        assert!(config.down_mode);
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn invalid_boolean_is_a_config_error() {
        let err =
            apply_env_overrides(AppConfig::default(), env(&[("SQLLEDGER_DOWN_MODE", "maybe")]))
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: SQLLEDGER_DOWN_MODE must be a boolean, got \"maybe\""
        );
    }
}
