//! Test discovery for the middle end. Running a compiled test to
//! completion needs an actual codegen backend (out of contract, §1
//! Non-goals), so this module stops at what the middle end itself can
//! verify: every function/method named by the `is_test` convention
//! resolves and type-checks cleanly. Follows the familiar discover/run/
//! collect-results/summarize shape, with the "run" step narrowed to
//! "resolve + type-check".

use crate::ast::{FunctionId, Module};
use crate::diagnostics::{ResolveError, TypeError};
use crate::resolver::ResolvedNames;

pub const TEST_FUNCTION_PREFIX: &str = "test_";

#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Passed,
    ResolveFailed(Vec<ResolveError>),
    TypeCheckFailed(Vec<TypeError>),
}

#[derive(Debug, Clone)]
pub struct DiscoveredTest {
    pub name: String,
    pub function: FunctionId,
    pub outcome: TestOutcome,
}

pub fn is_test_name(name: &str) -> bool {
    name.starts_with(TEST_FUNCTION_PREFIX)
}

/// Discovers every top-level function whose name matches the test naming
/// convention and reports whether it resolved and type-checked cleanly.
/// Class methods are intentionally excluded: a test needs no receiver to
/// construct, so only free functions are discoverable this way.
pub fn discover_and_check(module: &mut Module) -> Vec<DiscoveredTest> {
    let (names, resolve_diags): (ResolvedNames, _) = crate::resolver::resolve_module(module);
    let resolve_errors = resolve_diags.into_errors();

    let type_errors = if resolve_errors.is_empty() {
        crate::typechecker::check_module(module, &names).into_errors()
    } else {
        Vec::new()
    };

    module
        .functions
        .iter()
        .filter(|f| is_test_name(&f.name))
        .map(|f| DiscoveredTest {
            name: f.name.clone(),
            function: f.id,
            outcome: if !resolve_errors.is_empty() {
                TestOutcome::ResolveFailed(resolve_errors.clone())
            } else if !type_errors.is_empty() {
                TestOutcome::TypeCheckFailed(type_errors.clone())
            } else {
                TestOutcome::Passed
            },
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
}

impl TestSummary {
    pub fn from_results(results: &[DiscoveredTest]) -> Self {
        TestSummary { total: results.len(), passed: results.iter().filter(|r| r.outcome == TestOutcome::Passed).count() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Function, FunctionId as FId, SourceLocation};

    #[test]
    fn discovers_functions_named_with_the_test_prefix() {
        let module = Module {
            classes: vec![],
            functions: vec![
                Function { id: FId(0), name: "test_addition".into(), params: vec![], result: None, body: Some(Default::default()), is_platform: false, loc: SourceLocation::unknown() },
                Function { id: FId(1), name: "helper".into(), params: vec![], result: None, body: Some(Default::default()), is_platform: false, loc: SourceLocation::unknown() },
            ],
        };
        let mut module = module;
        let results = discover_and_check(&mut module);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "test_addition");
        assert_eq!(results[0].outcome, TestOutcome::Passed);
    }
}
