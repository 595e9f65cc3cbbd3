//! `rpl.toml` configuration.
//!
//! Every key is optional. With no `--config` flag a missing `rpl.toml`
//! means defaults; an explicitly named file must exist.

use std::path::{Path, PathBuf};

use rpl_core::{CompileMode, CompileOptions};
use rpl_engine::EngineOptions;
use serde::Deserialize;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "rpl.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("error reading config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RplConfig {
    pub compile: CompileSection,
    pub engine: EngineOptions,
    pub log: LogSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CompileSection {
    pub mode: CompileMode,
    pub generate_code: bool,
    pub max_errors: usize,
}

impl Default for CompileSection {
    fn default() -> Self {
        let defaults = CompileOptions::default();
        CompileSection {
            mode: defaults.mode,
            generate_code: defaults.generate_code,
            max_errors: defaults.max_errors,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LogSection {
    pub filter: Option<String>,
}

impl RplConfig {
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            mode: self.compile.mode,
            generate_code: self.compile.generate_code,
            max_errors: self.compile.max_errors,
            ..CompileOptions::default()
        }
    }
}

pub(crate) fn load(explicit: Option<&Path>) -> Result<RplConfig, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(RplConfig::default());
            }
            default
        }
    };
    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse(&text).map_err(|source| ConfigError::Parse { path, source })
}

fn parse(text: &str) -> Result<RplConfig, toml::de::Error> {
    toml::from_str(text)
}
