//! Compiler configuration (§1.1): a serde/toml-backed settings struct an
//! embedding host can build programmatically or load from a project file,
//! plus a registry an external codegen backend or FFI set can extend
//! without forking this crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

impl Default for OptLevel {
    fn default() -> Self {
        OptLevel::O1
    }
}

/// What the pipeline should hand back once lowering advice is computed
/// (§6 "CLI surface"): either an injected `CodegenBackend` consumes the
/// annotated AST directly, or (absent one) the pipeline serializes the
/// post-pass AST so a separate process can pick it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmitArtifact {
    /// Serialize the resolved+typed+laid-out+advised AST via `bincode`.
    AnnotatedAstBincode,
    /// Serialize the same tree as JSON, for tooling/debugging.
    AnnotatedAstJson,
}

impl Default for EmitArtifact {
    fn default() -> Self {
        EmitArtifact::AnnotatedAstBincode
    }
}

/// A platform/FFI builtin an external embedder registers: a function name
/// the resolver should treat as already declared (`is_platform = true`)
/// bound to a concrete linked symbol, without that embedder forking
/// `crate::builtins`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalBuiltin {
    pub name: String,
    pub symbol: String,
}

impl ExternalBuiltin {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        ExternalBuiltin { name: name.into(), symbol: symbol.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub opt_level: OptLevel,
    pub target_triple: Option<String>,
    pub emit: EmitArtifactConfig,
    pub external_builtins: Vec<ExternalBuiltin>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmitArtifactConfig(pub EmitArtifact);

impl Default for EmitArtifactConfig {
    fn default() -> Self {
        EmitArtifactConfig(EmitArtifact::default())
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_opt_level(mut self, level: OptLevel) -> Self {
        self.opt_level = level;
        self
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = Some(triple.into());
        self
    }

    pub fn with_emit(mut self, emit: EmitArtifact) -> Self {
        self.emit = EmitArtifactConfig(emit);
        self
    }

    pub fn with_builtin(mut self, builtin: ExternalBuiltin) -> Self {
        self.external_builtins.push(builtin);
        self
    }

    /// Loads a config from a `agc.toml`-style project file, falling back to
    /// defaults for anything unspecified.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })
    }

    pub fn external_builtin_symbols(&self) -> HashMap<&str, &str> {
        self.external_builtins.iter().map(|b| (b.name.as_str(), b.symbol.as_str())).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let config = CompilerConfig::new()
            .with_opt_level(OptLevel::O2)
            .with_target_triple("x86_64-unknown-linux-gnu")
            .with_builtin(ExternalBuiltin::new("journal-append", "host_journal_append"));
        assert_eq!(config.opt_level, OptLevel::O2);
        assert_eq!(config.target_triple.as_deref(), Some("x86_64-unknown-linux-gnu"));
        assert_eq!(config.external_builtin_symbols().get("journal-append"), Some(&"host_journal_append"));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let result = CompilerConfig::load_from_file(Path::new("/nonexistent/agc.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
