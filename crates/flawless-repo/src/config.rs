use std::fmt;
use std::path::Path;

use flawless_format::FileMapEncoding;
use flawless_types::{Author, CompressType};
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Smallest allowed sweep grace window.
pub const MIN_GRACE_SYNCS: u32 = 2;

/// Repository configuration, stored as `config.toml` in the marker directory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlawlessConfig {
    pub repository: RepositoryConfig,
    pub gc: GcConfig,
    /// Passed through to the service layer; the core never reads it.
    pub auth: Option<AuthConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub compress_type: CompressType,
    pub file_map_encoding: FileMapEncoding,
    pub author: Author,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            compress_type: CompressType::NONE,
            file_map_encoding: FileMapEncoding::Binary,
            author: Author::new("Flawless User", "user@localhost"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Consecutive chart recomputations an object must be absent from before
    /// it is deleted.
    pub grace_syncs: u32,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            grace_syncs: MIN_GRACE_SYNCS,
        }
    }
}

/// Token settings for the service layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl FlawlessConfig {
    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string_pretty(self).map_err(|e| RepoError::Config(e.to_string()))
    }

    /// Load from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> RepoResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> RepoResult<()> {
        flawless_store::write_atomic(path, self.to_toml_string()?.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> RepoResult<()> {
        if self.gc.grace_syncs < MIN_GRACE_SYNCS {
            return Err(RepoError::Config(format!(
                "gc.grace_syncs must be at least {MIN_GRACE_SYNCS}, got {}",
                self.gc.grace_syncs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = FlawlessConfig::default();
        assert_eq!(c.gc.grace_syncs, 2);
        assert_eq!(c.repository.compress_type, CompressType::NONE);
        assert_eq!(c.repository.file_map_encoding, FileMapEncoding::Binary);
        assert!(c.auth.is_none());
        c.validate().unwrap();
    }

    #[test]
    fn parse_partial_toml() {
        let c = FlawlessConfig::from_toml_str(
            r#"
            [repository]
            file_map_encoding = "json"

            [repository.author]
            name = "Ada"
            email = "ada@example.com"

            [gc]
            grace_syncs = 3
            "#,
        )
        .unwrap();
        assert_eq!(c.repository.author.name, "Ada");
        assert_eq!(c.repository.file_map_encoding, FileMapEncoding::Json);
        assert_eq!(c.gc.grace_syncs, 3);
    }

    #[test]
    fn grace_window_minimum() {
        let err = FlawlessConfig::from_toml_str("[gc]\ngrace_syncs = 1\n").unwrap_err();
        assert!(matches!(err, RepoError::Config(_)));
    }

    #[test]
    fn auth_secret_is_redacted() {
        let c = FlawlessConfig::from_toml_str(
            "[auth]\nissuer = \"flawless\"\naudience = \"clients\"\nsecret = \"hunter2\"\n",
        )
        .unwrap();
        let auth = c.auth.as_ref().unwrap();
        assert_eq!(auth.secret, "hunter2");
        let shown = format!("{auth:?}");
        assert!(shown.contains("flawless"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(FlawlessConfig::load(&path).unwrap(), FlawlessConfig::default());

        let mut c = FlawlessConfig::default();
        c.repository.author = Author::new("Grace", "grace@example.com");
        c.save(&path).unwrap();
        assert_eq!(FlawlessConfig::load(&path).unwrap(), c);
    }
}
