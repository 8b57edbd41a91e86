//! Codegen boundary. Emitting actual machine/IR code is out of contract
//! (§1 Non-goals); this module only defines the trait a backend implements
//! to consume this crate's output — the resolved, type-checked, laid-out,
//! and lowering-advised `Module` — plus a fallback that serializes that
//! same tree when no backend is linked in (§6 "CLI surface").

use std::collections::HashMap;

use crate::ast::{ClassId, Module};
use crate::layout::ClassLayoutPlan;
use crate::lowering::ModuleAdvice;

/// Everything a codegen backend needs: the annotated AST plus the planning
/// artifacts produced along the way, so a backend never has to recompute
/// layout or lowering advice itself.
pub struct CompiledUnit<'a> {
    pub module: &'a Module,
    pub layouts: &'a HashMap<ClassId, ClassLayoutPlan>,
    pub advice: &'a ModuleAdvice,
}

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("codegen backend failed: {0}")]
    Backend(String),
}

pub trait CodegenBackend {
    fn emit(&self, unit: &CompiledUnit<'_>) -> Result<(), CodegenError>;
}

/// Serializes the annotated AST via `bincode` instead of invoking a real
/// backend — the `agc` CLI's default when no `CodegenBackend` is injected
/// (§6: "absent one, serializes the post-pass AST").
pub struct SerializeFallback {
    pub out_path: std::path::PathBuf,
}

impl CodegenBackend for SerializeFallback {
    fn emit(&self, unit: &CompiledUnit<'_>) -> Result<(), CodegenError> {
        let bytes = bincode::serialize(unit.module).map_err(|e| CodegenError::Backend(e.to_string()))?;
        std::fs::write(&self.out_path, bytes).map_err(|e| CodegenError::Backend(e.to_string()))?;
        Ok(())
    }
}
