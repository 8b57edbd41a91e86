//! Compiler middle end (§2 "System Overview"): name resolution, type
//! checking, VMT/interface dispatch layout planning, and retain/release
//! lowering advice for an ownership-model object language. The concrete
//! grammar and any machine-code backend are both out of contract (§1
//! Non-goals) — see `parser::Parser` and `codegen::CodegenBackend` for the
//! pluggable seams an embedding host fills in.
//!
//! # Pipeline
//!
//! ```ignore
//! let module = parser.parse_file(path)?;
//! let (names, resolve_diags) = resolver::resolve_module(&module);
//! let typecheck_diags = typechecker::check_module(&mut module, &names);
//! let (layouts, layout_diags) = layout::plan_module(&module, &names, interface_keys);
//! let advice = lowering::advise_module(&module);
//! backend.emit(&codegen::CompiledUnit { module: &module, layouts: &layouts, advice: &advice })?;
//! ```

pub mod ast;
pub mod builtins;
pub mod call_graph;
pub mod capture_analysis;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod ffi;
pub mod layout;
pub mod lowering;
pub mod parser;
pub mod resolver;
pub mod test_runner;
pub mod typechecker;
pub mod types;

pub use ast::Module;
pub use config::CompilerConfig;
pub use diagnostics::{LayoutError, ResolveError, TypeError};

/// Runs every middle-end pass over `module` in order, short-circuiting
/// after resolution or type checking if either reports an error (§7: later
/// passes assume a clean `ResolvedNames`/typed tree). Returns the full set
/// of diagnostics accumulated so far either way.
pub struct PipelineOutput {
    pub names: resolver::ResolvedNames,
    pub resolve_errors: Vec<ResolveError>,
    pub type_errors: Vec<TypeError>,
    pub layouts: std::collections::HashMap<ast::ClassId, layout::ClassLayoutPlan>,
    pub layout_errors: Vec<LayoutError>,
    pub advice: lowering::ModuleAdvice,
}

pub fn run_pipeline(module: &mut Module, interface_keys: std::collections::HashMap<ast::ClassId, layout::InterfaceKey>) -> PipelineOutput {
    let (names, resolve_diags) = resolver::resolve_module(module);
    let resolve_errors = resolve_diags.into_errors();

    let type_errors = if resolve_errors.is_empty() {
        typechecker::check_module(module, &names).into_errors()
    } else {
        Vec::new()
    };

    let (layouts, layout_errors) = if resolve_errors.is_empty() {
        let (layouts, diags) = layout::plan_module(module, &names, interface_keys);
        (layouts, diags.into_errors())
    } else {
        (std::collections::HashMap::new(), Vec::new())
    };

    let advice = if resolve_errors.is_empty() && type_errors.is_empty() {
        lowering::advise_module(module)
    } else {
        lowering::ModuleAdvice::default()
    };

    PipelineOutput { names, resolve_errors, type_errors, layouts, layout_errors, advice }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_module_runs_the_whole_pipeline_cleanly() {
        let mut module = Module::default();
        let output = run_pipeline(&mut module, std::collections::HashMap::new());
        assert!(output.resolve_errors.is_empty());
        assert!(output.type_errors.is_empty());
        assert!(output.layout_errors.is_empty());
    }
}
