//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a base.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSettings {
    pub dir: String,
    pub prefix: String,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self { dir: "./rag_database".to_string(), prefix: "knowledge".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub dense_fetch: usize,
    pub sparse_fetch: usize,
    pub policy: String,
    pub alpha: f64,
    pub rrf_k: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            dense_fetch: 50,
            sparse_fetch: 200,
            policy: "equal".to_string(),
            alpha: 0.6,
            rrf_k: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub use_fake: bool,
    pub fake_dim: usize,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            use_fake: false,
            fake_dim: 384,
            max_len: 256,
        }
    }
}

/// Typed view over the merged configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bundle: BundleSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

impl Settings {
    /// Bundle directory with `~` and env vars expanded.
    pub fn bundle_dir(&self) -> PathBuf {
        expand_path(&self.bundle.dir)
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        tracing::debug!(env = %env_name, "configuration sources merged");
        Ok(Self { figment })
    }

    /// Wrap an already assembled figment; defaults are merged underneath.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Config(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let settings = Config::from_figment(Figment::new()).settings().expect("settings");
        assert_eq!(settings.retrieval.top_k, 10);
        assert_eq!(settings.retrieval.dense_fetch, 50);
        assert_eq!(settings.retrieval.sparse_fetch, 200);
        assert_eq!(settings.retrieval.policy, "equal");
        assert!((settings.retrieval.alpha - 0.6).abs() < f64::EPSILON);
        assert_eq!(settings.retrieval.rrf_k, 60);
        assert_eq!(settings.bundle.prefix, "knowledge");
    }

    #[test]
    fn toml_overrides_single_keys() {
        let toml = "[retrieval]\npolicy = \"rrf\"\ntop_k = 6\n[bundle]\nprefix = \"faq\"\n";
        let config = Config::from_figment(Figment::from(Toml::string(toml)));
        let settings = config.settings().expect("settings");
        assert_eq!(settings.retrieval.policy, "rrf");
        assert_eq!(settings.retrieval.top_k, 6);
        assert_eq!(settings.retrieval.sparse_fetch, 200, "untouched keys keep defaults");
        assert_eq!(settings.bundle.prefix, "faq");
        let k: u32 = config.get("retrieval.rrf_k").expect("get");
        assert_eq!(k, 60);
    }

    #[test]
    fn missing_key_is_config_error() {
        let config = Config::from_figment(Figment::new());
        let err = config.get::<String>("nope.missing").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/srv/rag");
        assert_eq!(resolve_with_base(base, "/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(resolve_with_base(base, "bundle"), PathBuf::from("/srv/rag/bundle"));
    }
}
