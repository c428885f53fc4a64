use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    cassette::Cassette,
    error::VcrResult,
    matcher::Matcher,
    record_mode::RecordMode,
    registry::MethodRegistry,
    service::{VcrLayer, VcrService},
};

pub const GRPCVCR_CASSETTE_DIR: &str = "GRPCVCR_CASSETTE_DIR";
pub const GRPCVCR_RECORD_MODE: &str = "GRPCVCR_RECORD_MODE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct VcrConfig {
    #[serde(default = "VcrConfig::default_cassette_dir")]
    pub cassette_dir: PathBuf,
    /// Overrides the record mode of every cassette built from this config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_mode: Option<RecordMode>,
}
impl Default for VcrConfig {
    fn default() -> Self {
        Self { cassette_dir: Self::default_cassette_dir(), record_mode: None }
    }
}
impl VcrConfig {
    fn default_cassette_dir() -> PathBuf {
        PathBuf::from("tests/cassettes")
    }

    pub fn environment(default: Self) -> VcrResult<Self> {
        Self::environment_with(default, |key| std::env::var(key).ok())
    }

    /// Like [`VcrConfig::environment`], reading variables through `var` instead of the process environment.
    pub fn environment_with<F: Fn(&str) -> Option<String>>(default: Self, var: F) -> VcrResult<Self> {
        let cassette_dir = var(GRPCVCR_CASSETTE_DIR).map(PathBuf::from).unwrap_or(default.cassette_dir);
        let record_mode = match var(GRPCVCR_RECORD_MODE).filter(|mode| !mode.trim().is_empty()) {
            Some(mode) => Some(mode.parse()?),
            None => default.record_mode,
        };
        Ok(Self { cassette_dir, record_mode })
    }

    /// `<cassette_dir>/<name>`, with a `.yaml` extension unless `name` already has one.
    pub fn cassette_path(&self, name: &str) -> PathBuf {
        let path = self.cassette_dir.join(name);
        match path.extension() {
            Some(_) => path,
            None => path.with_extension("yaml"),
        }
    }
}

/// Builder assembling a cassette and the services replaying it.
#[derive(Debug, Clone)]
pub struct Vcr {
    path: PathBuf,
    record_mode: RecordMode,
    override_mode: Option<RecordMode>,
    matcher: Matcher,
    registry: MethodRegistry,
}
impl Vcr {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            record_mode: RecordMode::default(),
            override_mode: None,
            matcher: Matcher::default(),
            registry: MethodRegistry::default(),
        }
    }

    pub fn from_config(config: &VcrConfig, name: &str) -> Self {
        Self { override_mode: config.record_mode, ..Self::new(config.cassette_path(name)) }
    }

    pub fn record_mode(mut self, record_mode: RecordMode) -> Self {
        self.record_mode = record_mode;
        self
    }

    pub fn match_on(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mode the cassette will be loaded with.
    pub fn effective_record_mode(&self) -> RecordMode {
        self.override_mode.unwrap_or(self.record_mode)
    }

    pub fn load(&self) -> VcrResult<Arc<Cassette>> {
        let cassette = Cassette::load(&self.path, self.effective_record_mode(), self.matcher.clone())?;
        Ok(Arc::new(cassette))
    }

    pub fn service<S>(&self, inner: S) -> VcrResult<VcrService<S>> {
        Ok(VcrService::new(inner, self.load()?, Arc::new(self.registry.clone())))
    }

    pub fn layer(&self) -> VcrResult<VcrLayer> {
        Ok(VcrLayer::new(self.load()?, Arc::new(self.registry.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::error::VcrError;

    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<_, _> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_environment_defaults() {
        let config = VcrConfig::environment_with(VcrConfig::default(), vars(&[])).unwrap();
        assert_eq!(config, VcrConfig { cassette_dir: PathBuf::from("tests/cassettes"), record_mode: None });
    }

    #[test]
    fn test_environment_overrides() {
        let env = [(GRPCVCR_CASSETTE_DIR, "fixtures/vcr"), (GRPCVCR_RECORD_MODE, "New-Episodes")];
        let config = VcrConfig::environment_with(VcrConfig::default(), vars(&env)).unwrap();
        assert_eq!(config.cassette_dir, PathBuf::from("fixtures/vcr"));
        assert_eq!(config.record_mode, Some(RecordMode::NewEpisodes));

        let env = [(GRPCVCR_RECORD_MODE, "sometimes")];
        let err = VcrConfig::environment_with(VcrConfig::default(), vars(&env)).unwrap_err();
        assert!(matches!(err, VcrError::InvalidRecordMode(_)));
    }

    #[test]
    fn test_cassette_path() {
        let config = VcrConfig { cassette_dir: PathBuf::from("cassettes"), record_mode: None };
        assert_eq!(config.cassette_path("get_user"), PathBuf::from("cassettes/get_user.yaml"));
        assert_eq!(config.cassette_path("get_user.json"), PathBuf::from("cassettes/get_user.json"));
    }

    #[test]
    #[cfg(feature = "yaml")]
    fn test_config_from_yaml() {
        let config: VcrConfig = serde_yaml::from_str("record-mode: none").unwrap();
        assert_eq!(
            config,
            VcrConfig { cassette_dir: PathBuf::from("tests/cassettes"), record_mode: Some(RecordMode::None) }
        );

        assert!(serde_yaml::from_str::<VcrConfig>("mode: none").is_err());
    }

    #[test]
    fn test_override_wins() {
        let config = VcrConfig { cassette_dir: PathBuf::from("cassettes"), record_mode: Some(RecordMode::None) };
        let vcr = Vcr::from_config(&config, "test").record_mode(RecordMode::All);
        assert_eq!(vcr.effective_record_mode(), RecordMode::None);
        assert_eq!(vcr.path(), Path::new("cassettes/test.yaml"));

        let vcr = Vcr::new("cassettes/test.json").record_mode(RecordMode::All);
        assert_eq!(vcr.effective_record_mode(), RecordMode::All);
    }

    #[test]
    fn test_load_missing_cassette() {
        let dir = tempfile::tempdir().unwrap();
        let config = VcrConfig { cassette_dir: dir.path().to_path_buf(), record_mode: None };

        let cassette = Vcr::from_config(&config, "missing").load().unwrap();
        assert!(cassette.is_empty());
        assert_eq!(cassette.record_mode(), RecordMode::NewEpisodes);

        let err = Vcr::from_config(&config, "missing").record_mode(RecordMode::None).load().unwrap_err();
        assert!(matches!(err, VcrError::CassetteNotFound { .. }));
    }
}
