//! Name resolution (§4.1): binds every class/interface/field/method/
//! function/variable reference in a `Module` to its declaration, seeds the
//! built-in class table (`crate::builtins`), and checks the base-class
//! chain is acyclic before the type checker or layout planner ever runs.

use std::collections::HashMap;

use crate::ast::{Class, ClassId, FieldId, MethodId, Module, Mutability};
use crate::builtins;
use crate::diagnostics::{Diagnostics, ResolveError};
use crate::types::{FunctionType, Type};

/// The resolved name tables every later pass (`typechecker`, `layout`,
/// `lowering`) consults instead of walking the AST's `Vec<Class>` linearly.
#[derive(Debug, Default)]
pub struct ResolvedNames {
    pub class_by_name: HashMap<String, ClassId>,
    pub class_by_id: HashMap<ClassId, ClassInfo>,
    /// Every field's declared type, by id, populated straight off the AST's
    /// own `Field::ty` (§4.2: the checker assigns expression types, but a
    /// field's *declared* type is read off its declaration, not inferred).
    pub field_types: HashMap<FieldId, Type>,
    /// Every method's full signature, by id, so the type checker can look
    /// up mutability/params/result from a bare `MethodId` without re-walking
    /// the owning class (§4.2 "Method dispatch typing").
    pub methods: HashMap<MethodId, MethodSig>,
}

#[derive(Debug, Clone)]
pub struct MethodSig {
    pub declaring_class: ClassId,
    pub mutability: Mutability,
    pub params: Vec<Type>,
    pub result: Type,
    pub is_factory: bool,
}

impl MethodSig {
    pub fn function_type(&self) -> FunctionType {
        FunctionType { params: self.params.clone(), result: Box::new(self.result.clone()) }
    }
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub base: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub fields_by_name: HashMap<String, FieldId>,
    pub methods_by_name: HashMap<String, MethodId>,
    pub is_builtin: bool,
}

impl ResolvedNames {
    /// Every ancestor of `class`, nearest first, not including `class`
    /// itself. Used by the layout planner's "VMT = dispatcher ++
    /// new_methods(C) ++ VMT(base(C))" construction (§4.3).
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut cur = self.class_by_id.get(&class).and_then(|c| c.base);
        while let Some(id) = cur {
            out.push(id);
            cur = self.class_by_id.get(&id).and_then(|c| c.base);
        }
        out
    }

    /// Walks the field declared nearest the root first so field offsets
    /// stay stable when a subclass adds fields (§4.3 "Field layout").
    pub fn field_lookup(&self, class: ClassId, name: &str) -> Option<FieldId> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            if let Some(info) = self.class_by_id.get(&id)
                && let Some(field) = info.fields_by_name.get(name)
            {
                return Some(*field);
            }
            cur = self.class_by_id.get(&id).and_then(|c| c.base);
        }
        None
    }

    pub fn method_lookup(&self, class: ClassId, name: &str) -> Option<MethodId> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            if let Some(info) = self.class_by_id.get(&id)
                && let Some(method) = info.methods_by_name.get(name)
            {
                return Some(*method);
            }
            cur = self.class_by_id.get(&id).and_then(|c| c.base);
        }
        None
    }
}

/// Resolves every declaration in `module`. Always returns a best-effort
/// `ResolvedNames`; callers check `diagnostics.has_errors()` before trusting
/// it for a later pass (§7: "accumulate every diagnostic, don't abort").
pub fn resolve_module(module: &Module) -> (ResolvedNames, Diagnostics<ResolveError>) {
    let mut names = ResolvedNames::default();
    let mut diags = Diagnostics::new();

    for b in builtins::builtin_classes() {
        names.class_by_name.insert(b.name.to_string(), b.id);
        names.class_by_id.insert(
            b.id,
            ClassInfo {
                name: b.name.to_string(),
                base: None,
                interfaces: Vec::new(),
                fields_by_name: HashMap::new(),
                methods_by_name: HashMap::new(),
                is_builtin: true,
            },
        );
    }

    for class in &module.classes {
        if names.class_by_name.contains_key(&class.name) {
            diags.report(ResolveError::DuplicateClass { name: class.name.clone(), loc: class.loc.clone() });
            continue;
        }
        names.class_by_name.insert(class.name.clone(), class.id);
    }

    for class in &module.classes {
        let info = build_class_info(class, &names, &mut diags);
        names.class_by_id.insert(class.id, info);

        for field in &class.fields {
            names.field_types.insert(field.id, field.ty.clone().unwrap_or(Type::Void));
        }
        for method in &class.methods {
            names.methods.insert(
                method.id,
                MethodSig {
                    declaring_class: class.id,
                    mutability: method.mutability,
                    params: method.params.iter().map(|p| p.ty.clone().unwrap_or(Type::Void)).collect(),
                    result: method.result.clone().unwrap_or(Type::Void),
                    is_factory: method.is_factory,
                },
            );
        }
    }

    check_acyclic_inheritance(module, &names, &mut diags);

    (names, diags)
}

fn build_class_info(class: &Class, _names: &ResolvedNames, diags: &mut Diagnostics<ResolveError>) -> ClassInfo {
    // `class.base`/`class.interfaces` are already `ClassId`s: a host building
    // the AST (or `crate::parser`'s stub) resolves textual base-class names
    // against `ResolvedNames::class_by_name` itself before constructing the
    // `Class`, the same way `crate::ast::MethodOrFunctionRef` is id-based
    // rather than name-based.
    let base = class.base;

    let mut fields_by_name = HashMap::new();
    for field in &class.fields {
        if fields_by_name.insert(field.name.clone(), field.id).is_some() {
            diags.report(ResolveError::DuplicateField { name: field.name.clone(), loc: field.loc.clone() });
        }
    }

    let mut methods_by_name = HashMap::new();
    for method in &class.methods {
        if methods_by_name.insert(method.name.clone(), method.id).is_some() {
            diags.report(ResolveError::DuplicateMethod { name: method.name.clone(), loc: method.loc.clone() });
        }
    }

    ClassInfo { name: class.name.clone(), base, interfaces: class.interfaces.clone(), fields_by_name, methods_by_name, is_builtin: false }
}

fn check_acyclic_inheritance(module: &Module, names: &ResolvedNames, diags: &mut Diagnostics<ResolveError>) {
    for class in &module.classes {
        let mut seen = vec![class.id];
        let mut cur = names.class_by_id.get(&class.id).and_then(|c| c.base);
        while let Some(id) = cur {
            if seen.contains(&id) {
                diags.report(ResolveError::CyclicInheritance { name: class.name.clone(), loc: class.loc.clone() });
                break;
            }
            seen.push(id);
            cur = names.class_by_id.get(&id).and_then(|c| c.base);
        }
    }
}

/// Resolves a method reference by name against a class's full inheritance
/// chain, reporting `UnknownMethod` if nothing matches. Used by the type
/// checker's `Call` handling (§4.2 "Method dispatch typing").
pub fn resolve_method(
    names: &ResolvedNames,
    class: ClassId,
    method_name: &str,
    loc: &crate::ast::SourceLocation,
    diags: &mut Diagnostics<ResolveError>,
) -> Option<MethodId> {
    match names.method_lookup(class, method_name) {
        Some(id) => Some(id),
        None => {
            diags.report(ResolveError::UnknownMethod { name: method_name.to_string(), class, loc: loc.clone() });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Field, Method, Mutability, SourceLocation};

    fn simple_class(id: u32, name: &str, base: Option<ClassId>) -> Class {
        Class {
            id: ClassId(id),
            name: name.to_string(),
            base,
            interfaces: vec![],
            fields: vec![Field { id: FieldId(id * 10), name: "x".into(), ty: None, loc: SourceLocation::unknown() }],
            methods: vec![Method {
                id: MethodId(id * 10),
                name: "go".into(),
                mutability: Mutability::Any,
                params: vec![],
                result: None,
                body: None,
                is_factory: false,
                is_interface_method: false,
                is_override: false,
                loc: SourceLocation::unknown(),
            }],
            enum_tags: vec![],
            loc: SourceLocation::unknown(),
        }
    }

    #[test]
    fn resolves_field_through_inheritance_chain() {
        let base = simple_class(builtins::FIRST_USER_CLASS, "Base", None);
        let base_id = base.id;
        let derived = simple_class(builtins::FIRST_USER_CLASS + 1, "Derived", Some(base_id));
        let module = Module { classes: vec![base, derived.clone()], functions: vec![] };
        let (names, diags) = resolve_module(&module);
        assert!(!diags.has_errors());
        assert!(names.field_lookup(derived.id, "x").is_some());
        assert!(names.method_lookup(derived.id, "go").is_some());
    }

    #[test]
    fn detects_cyclic_inheritance() {
        let mut a = simple_class(builtins::FIRST_USER_CLASS, "A", Some(ClassId(builtins::FIRST_USER_CLASS + 1)));
        let b = simple_class(builtins::FIRST_USER_CLASS + 1, "B", Some(a.id));
        a.base = Some(b.id);
        let module = Module { classes: vec![a, b], functions: vec![] };
        let (_, diags) = resolve_module(&module);
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_class_name_is_reported() {
        let a = simple_class(builtins::FIRST_USER_CLASS, "Dup", None);
        let b = simple_class(builtins::FIRST_USER_CLASS + 1, "Dup", None);
        let module = Module { classes: vec![a, b], functions: vec![] };
        let (_, diags) = resolve_module(&module);
        assert_eq!(diags.errors().len(), 1);
    }

    #[test]
    fn duplicate_method_name_on_the_same_class_is_reported() {
        let mut class = simple_class(builtins::FIRST_USER_CLASS, "C", None);
        let second = Method {
            id: MethodId(builtins::FIRST_USER_CLASS * 10 + 1),
            name: "go".into(),
            mutability: Mutability::Any,
            params: vec![],
            result: None,
            body: None,
            is_factory: false,
            is_interface_method: false,
            is_override: false,
            loc: SourceLocation::unknown(),
        };
        class.methods.push(second);
        let module = Module { classes: vec![class], functions: vec![] };
        let (_, diags) = resolve_module(&module);
        assert!(diags.errors().iter().any(|e| matches!(e, ResolveError::DuplicateMethod { name, .. } if name == "go")));
    }
}
