//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/library.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:23119"
//! prefix = "/citebridge"
//!
//! [library]
//! user_library_id = 1
//! citation_keys = true
//!
//! [citation]
//! default_style = "chicago-note-bibliography"
//! styles = ["chicago-note-bibliography", "chicago-author-date", "apa"]
//! locales = ["en-US"]
//! ```
//!
//! Only `[db]` is required; every other section falls back to the values above.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub citation: CitationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path prefix every endpoint is mounted under.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            prefix: default_prefix(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:23119".to_string()
}
fn default_prefix() -> String {
    "/citebridge".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    /// Id of the personal library; preferred when a key matches items in several libraries.
    #[serde(default = "default_user_library_id")]
    pub user_library_id: i64,
    /// Whether the citation-key field (`citekey` lookups and format) is available.
    #[serde(default = "default_citation_keys")]
    pub citation_keys: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            user_library_id: default_user_library_id(),
            citation_keys: default_citation_keys(),
        }
    }
}

fn default_user_library_id() -> i64 {
    1
}
fn default_citation_keys() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CitationConfig {
    #[serde(default = "default_style")]
    pub default_style: String,
    /// Installed styles, as short names or full style URLs.
    #[serde(default = "default_styles")]
    pub styles: Vec<String>,
    #[serde(default = "default_locales")]
    pub locales: Vec<String>,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            default_style: default_style(),
            styles: default_styles(),
            locales: default_locales(),
        }
    }
}

fn default_style() -> String {
    "chicago-note-bibliography".to_string()
}
fn default_styles() -> Vec<String> {
    vec![
        "chicago-note-bibliography".to_string(),
        "chicago-author-date".to_string(),
        "apa".to_string(),
    ]
}
fn default_locales() -> Vec<String> {
    vec!["en-US".to_string()]
}

impl Config {
    /// A configuration with defaults everywhere and the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            server: ServerConfig::default(),
            library: LibraryConfig::default(),
            citation: CitationConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let prefix = &self.server.prefix;
        if !prefix.starts_with('/') {
            anyhow::bail!("server.prefix must start with '/': '{}'", prefix);
        }
        if prefix.len() > 1 && prefix.ends_with('/') {
            anyhow::bail!("server.prefix must not end with '/': '{}'", prefix);
        }

        if self.library.user_library_id < 1 {
            anyhow::bail!("library.user_library_id must be >= 1");
        }

        if self.citation.styles.is_empty() {
            anyhow::bail!("citation.styles must list at least one style");
        }
        if !self
            .citation
            .styles
            .iter()
            .any(|s| s == &self.citation.default_style)
        {
            anyhow::bail!(
                "citation.default_style '{}' is not listed in citation.styles",
                self.citation.default_style
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"lib.sqlite\"\n").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:23119");
        assert_eq!(config.server.prefix, "/citebridge");
        assert_eq!(config.library.user_library_id, 1);
        assert!(config.library.citation_keys);
        assert_eq!(config.citation.default_style, "chicago-note-bibliography");
    }

    #[test]
    fn test_prefix_validation() {
        let err = parse("[db]\npath = \"x\"\n[server]\nprefix = \"citebridge\"\n").unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
        let err = parse("[db]\npath = \"x\"\n[server]\nprefix = \"/citebridge/\"\n").unwrap_err();
        assert!(err.to_string().contains("must not end with '/'"));
        assert!(parse("[db]\npath = \"x\"\n[server]\nprefix = \"/\"\n").is_ok());
    }

    #[test]
    fn test_default_style_must_be_installed() {
        let err = parse(
            "[db]\npath = \"x\"\n[citation]\ndefault_style = \"mla\"\nstyles = [\"apa\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("mla"));
    }

    #[test]
    fn test_user_library_id_positive() {
        let err = parse("[db]\npath = \"x\"\n[library]\nuser_library_id = 0\n").unwrap_err();
        assert!(err.to_string().contains("user_library_id"));
    }
}
