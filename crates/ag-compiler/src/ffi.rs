//! Platform-function symbol resolution: maps a `Function` with
//! `is_platform = true` to the linked symbol an external codegen backend
//! must call, merging `crate::builtins::platform_symbol_table` with any
//! `ExternalBuiltin`s an embedding host registered via `CompilerConfig`.
//! Concrete FFI manifest syntax (`include ffi:name` and friends) is part
//! of the out-of-contract concrete grammar (§1 Non-goals), so this module
//! only resolves names the AST already carries — it does not parse
//! anything itself.

use std::collections::HashMap;

use crate::config::CompilerConfig;

#[derive(Debug, Clone, Default)]
pub struct FfiTable {
    symbols: HashMap<String, String>,
}

impl FfiTable {
    pub fn from_config(config: &CompilerConfig) -> Self {
        let mut symbols: HashMap<String, String> =
            crate::builtins::platform_symbol_table().into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        for builtin in &config.external_builtins {
            symbols.insert(builtin.name.clone(), builtin.symbol.clone());
        }
        FfiTable { symbols }
    }

    pub fn resolve(&self, function_name: &str) -> Option<&str> {
        self.symbols.get(function_name).map(|s| s.as_str())
    }
}
