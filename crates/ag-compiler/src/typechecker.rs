//! Type checking (§4.2): assigns a [`crate::types::Type`] to every
//! [`crate::ast::Action`], enforces the ownership coercion rules, resolves
//! cold lambdas, and rewrites `ToStr(stream, value)` into a `stream.put<Tag>`
//! call per the fixed TypeTag mapping.

use std::collections::HashMap;

use crate::ast::{Action, ActionKind, Block, Class, ClassId, Function, Method, Module, VarId};
use crate::builtins::{self, ContainerKind};
use crate::diagnostics::{Diagnostics, TypeError};
use crate::resolver::ResolvedNames;
use crate::types::{FunctionType, PtrKind, Type};

/// A lambda literal whose parameter/result types aren't annotated in
/// source collapses to one `ColdLambdaPlaceholder` id; every call site that
/// invokes it contributes a candidate signature here. §4.2 "cold lambdas":
/// lightweight unification, not full Hindley-Milner — the first consistent
/// candidate wins, and a second, incompatible candidate is an error.
#[derive(Debug, Default)]
struct ColdLambdaStore {
    next_id: u32,
    candidates: HashMap<u32, FunctionType>,
}

impl ColdLambdaStore {
    fn fresh(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn constrain(&mut self, id: u32, ft: FunctionType) -> Result<(), ()> {
        match self.candidates.get(&id) {
            None => {
                self.candidates.insert(id, ft);
                Ok(())
            }
            Some(existing) if *existing == ft => Ok(()),
            Some(_) => Err(()),
        }
    }

    fn resolve(&self, id: u32) -> Option<Type> {
        self.candidates.get(&id).cloned().map(|ft| Type::Lambda(Box::new(ft)))
    }
}

struct Checker<'a> {
    names: &'a ResolvedNames,
    diags: Diagnostics<TypeError>,
    cold: ColdLambdaStore,
    /// Local variable types, populated from parameters and the first `Set`
    /// of a variable not seen before.
    vars: HashMap<VarId, Type>,
    /// Number of enclosing lambdas currently in scope, for `Break` depth
    /// validation (§4.4 "cross-break").
    lambda_depth: u32,
    in_mutating_method: bool,
}

pub fn check_module(module: &mut Module, names: &ResolvedNames) -> Diagnostics<TypeError> {
    let mut checker = Checker {
        names,
        diags: Diagnostics::new(),
        cold: ColdLambdaStore::default(),
        vars: HashMap::new(),
        lambda_depth: 0,
        in_mutating_method: false,
    };

    for class in &mut module.classes {
        checker.check_class(class);
    }
    for function in &mut module.functions {
        checker.check_function(function);
    }

    checker.finish()
}

impl<'a> Checker<'a> {
    fn finish(mut self) -> Diagnostics<TypeError> {
        // Any cold lambda that never collected a candidate signature from a
        // call site is an error: §4.2 requires every cold lambda resolve.
        for id in 0..self.cold.next_id {
            if self.cold.resolve(id).is_none() {
                self.diags.report(TypeError::UnresolvedColdLambda { loc: crate::ast::SourceLocation::unknown() });
            }
        }
        self.diags
    }

    fn check_class(&mut self, class: &mut Class) {
        for method in &mut class.methods {
            self.check_method(method);
        }
    }

    fn check_method(&mut self, method: &mut Method) {
        self.vars.clear();
        for p in &method.params {
            if let Some(ty) = &p.ty {
                self.vars.insert(p.id, ty.clone());
            }
        }
        self.in_mutating_method = method.mutability == crate::ast::Mutability::Mutating;
        self.lambda_depth = 0;
        if let Some(body) = &mut method.body {
            let actual = self.check_block(body);
            self.check_result_matches(&actual, &method.result, &method.loc);
        }
    }

    fn check_function(&mut self, function: &mut Function) {
        self.vars.clear();
        for p in &function.params {
            if let Some(ty) = &p.ty {
                self.vars.insert(p.id, ty.clone());
            }
        }
        self.in_mutating_method = false;
        self.lambda_depth = 0;
        if let Some(body) = &mut function.body {
            let actual = self.check_block(body);
            self.check_result_matches(&actual, &function.result, &function.loc);
        }
    }

    fn check_result_matches(&mut self, actual: &Type, declared: &Option<Type>, loc: &crate::ast::SourceLocation) {
        if let Some(declared) = declared
            && !actual.coerces_to(declared)
        {
            self.diags.report(TypeError::Mismatch {
                expected: declared.to_string(),
                found: actual.to_string(),
                loc: loc.clone(),
            });
        }
    }

    fn check_block(&mut self, block: &mut Block) -> Type {
        let mut last = Type::Void;
        for action in &mut block.actions {
            last = self.check_action(action);
        }
        last
    }

    fn check_action(&mut self, action: &mut Action) -> Type {
        let loc = action.loc.clone();
        let ty = match &mut action.kind {
            ActionKind::ConstInt32(_) => Type::Int32,
            ActionKind::ConstInt64(_) => Type::Int64,
            ActionKind::ConstFloat(_) => Type::Float,
            ActionKind::ConstDouble(_) => Type::Double,
            ActionKind::ConstBool(_) => Type::Int32, // language has no primitive Bool type of its own
            ActionKind::ConstVoid => Type::Void,
            ActionKind::ConstString(_) => Type::Pointer(PtrKind::Own, builtins::STRING_CLASS),
            ActionKind::ConstEnumTag(class, _) => Type::Enum(*class),

            ActionKind::Get(var) => self.vars.get(var).cloned().unwrap_or(Type::Void),
            ActionKind::Set(var, value) => {
                let vty = self.check_action(value);
                self.vars.entry(*var).or_insert_with(|| vty.clone());
                Type::Void
            }

            ActionKind::MkInstance(class, args) => {
                for a in args.iter_mut() {
                    self.check_action(a);
                }
                Type::Pointer(PtrKind::Own, *class)
            }
            ActionKind::GetField(base, field) => {
                let base_ty = self.check_action(base);
                self.field_type(&base_ty, *field, &loc)
            }
            ActionKind::SetField(base, field, value) => {
                let base_ty = self.check_action(base);
                self.check_mutating_receiver(&base_ty, &loc);
                let field_ty = self.field_type(&base_ty, *field, &loc);
                let value_ty = self.check_action(value);
                self.expect_coerces(&value_ty, &field_ty, &loc);
                Type::Void
            }
            ActionKind::SpliceField(base, field, value) => {
                let base_ty = self.check_action(base);
                self.check_mutating_receiver(&base_ty, &loc);
                let field_ty = self.field_type(&base_ty, *field, &loc);
                let value_ty = self.check_action(value);
                self.expect_coerces(&value_ty, &field_ty, &loc);
                Type::Void
            }
            ActionKind::Call(receiver, method_ref, args) => self.check_call(receiver, *method_ref, args, &loc),
            ActionKind::AsyncCall(receiver, method_ref, args) => {
                self.check_call(receiver, *method_ref, args, &loc);
                Type::Void // a post-message always returns immediately
            }
            ActionKind::MakeDelegate(receiver, method) => {
                let recv_ty = self.check_action(receiver);
                let ft = self.method_function_type(&recv_ty, *method);
                Type::Delegate(Box::new(ft))
            }
            ActionKind::ImmediateDelegate(receiver, method, args) => {
                let recv_ty = self.check_action(receiver);
                for a in args.iter_mut() {
                    self.check_action(a);
                }
                let ft = self.method_function_type(&recv_ty, *method);
                (*ft.result).clone()
            }
            ActionKind::MakeFnPtr(_func) => Type::Function(Box::new(FunctionType { params: vec![], result: Box::new(Type::Void) })),
            ActionKind::MkLambda(params, body, _captures) => self.check_lambda(params, body),
            ActionKind::Block(block) => self.check_block(block),
            ActionKind::Break(depth, value) => {
                let available = self.lambda_depth;
                if let Some(d) = depth
                    && *d > available
                {
                    self.diags.report(TypeError::BreakDepthOutOfRange { depth: *d, available, loc: loc.clone() });
                }
                self.check_action(value);
                Type::NoRet
            }

            ActionKind::Add(l, r)
            | ActionKind::Sub(l, r)
            | ActionKind::Mul(l, r)
            | ActionKind::Div(l, r)
            | ActionKind::Mod(l, r)
            | ActionKind::And(l, r)
            | ActionKind::Or(l, r)
            | ActionKind::Xor(l, r)
            | ActionKind::Shl(l, r)
            | ActionKind::Shr(l, r) => {
                let lt = self.check_action(l);
                let _ = self.check_action(r);
                lt
            }
            ActionKind::Eq(l, r) | ActionKind::Lt(l, r) => {
                self.check_action(l);
                self.check_action(r);
                Type::Int32
            }
            ActionKind::Not(inner) | ActionKind::Neg(inner) | ActionKind::Inv(inner) => self.check_action(inner),

            ActionKind::If(cond, then_b, else_b) => {
                let cond_ty = self.check_action(cond);
                if !cond_ty.is_condition_compatible() {
                    self.diags.report(TypeError::NotConditionCompatible { found: cond_ty, loc: loc.clone() });
                }
                let then_ty = self.check_action(then_b);
                let else_ty = self.check_action(else_b);
                join_branch_types(then_ty, else_ty)
            }
            ActionKind::LAnd(l, r) | ActionKind::LOr(l, r) => {
                self.check_action(l);
                self.check_action(r);
                Type::Int32
            }
            ActionKind::Loop(body) => {
                self.lambda_depth += 1;
                let _ = self.check_block(body);
                self.lambda_depth -= 1;
                Type::Void
            }

            ActionKind::CastOp(inner, target) => {
                self.check_action(inner);
                target.clone()
            }
            ActionKind::ToInt32(inner) => {
                self.check_action(inner);
                Type::Int32
            }
            ActionKind::ToInt(inner) => {
                self.check_action(inner);
                // §9 decided Open Question: to_int saturates rather than
                // wrapping or panicking (NaN -> 0, out-of-range -> MIN/MAX);
                // lowering.rs emits the saturating-cast contract for this node.
                Type::Int64
            }
            ActionKind::ToFloat(inner) => {
                self.check_action(inner);
                Type::Float
            }
            ActionKind::ToDouble(inner) => {
                self.check_action(inner);
                Type::Double
            }
            ActionKind::ToStr(stream, value) => {
                let stream_ty = self.check_action(stream);
                let value_ty = self.check_action(value);
                self.rewrite_to_str(&stream_ty, value_ty, &loc)
            }

            ActionKind::CopyOp(inner) => {
                let inner_ty = self.check_action(inner);
                match inner_ty {
                    Type::Pointer(_, class) => Type::Pointer(PtrKind::Own, class),
                    other => other,
                }
            }
            ActionKind::FreezeOp(inner) => {
                let inner_ty = self.check_action(inner);
                match inner_ty {
                    Type::Pointer(_, class) => Type::Pointer(PtrKind::Shared, class),
                    other => other,
                }
            }
            ActionKind::RefOp(inner) => {
                let inner_ty = self.check_action(inner);
                match inner_ty {
                    Type::Pointer(_, class) => Type::Pointer(PtrKind::Ref, class),
                    other => other,
                }
            }
            ActionKind::ConformOp(inner) => {
                let inner_ty = self.check_action(inner);
                match inner_ty {
                    Type::Pointer(k, class) if k.is_weak() => Type::Pointer(PtrKind::ConformWeak, class),
                    Type::Pointer(_, class) => Type::Pointer(PtrKind::ConformRef, class),
                    other => other,
                }
            }
            ActionKind::MkWeakOp(inner) => {
                let inner_ty = self.check_action(inner);
                match inner_ty {
                    Type::Pointer(PtrKind::Shared, class) => Type::Pointer(PtrKind::FrozenWeak, class),
                    Type::Pointer(_, class) => Type::Pointer(PtrKind::Weak, class),
                    other => other,
                }
            }
            ActionKind::DerefWeakOp(inner) => {
                let inner_ty = self.check_action(inner);
                match inner_ty {
                    Type::Pointer(PtrKind::FrozenWeak, class) => Type::optional(Type::Pointer(PtrKind::Shared, class), 1),
                    Type::Pointer(_, class) => Type::optional(Type::Pointer(PtrKind::Ref, class), 1),
                    other => Type::optional(other, 1),
                }
            }

            ActionKind::GetAtIndex(base, index) => {
                let base_ty = self.check_action(base);
                self.check_action(index);
                self.container_element_type(&base_ty, &loc)
            }
            ActionKind::SetAtIndex(base, index, value) => {
                let base_ty = self.check_action(base);
                self.check_mutating_receiver(&base_ty, &loc);
                self.check_action(index);
                let elem_ty = self.container_element_type(&base_ty, &loc);
                let value_ty = self.check_action(value);
                self.expect_coerces(&value_ty, &elem_ty, &loc);
                // §4.2: set-at-index yields the value that was installed.
                elem_ty
            }
        };
        action.ty = Some(ty.clone());
        ty
    }

    fn check_lambda(&mut self, params: &[crate::ast::Var], body: &mut Block) -> Type {
        self.lambda_depth += 1;
        let saved: Vec<(VarId, Option<Type>)> = params.iter().map(|p| (p.id, p.ty.clone())).collect();
        for (id, ty) in &saved {
            if let Some(ty) = ty {
                self.vars.insert(*id, ty.clone());
            }
        }
        let result = self.check_block(body);
        self.lambda_depth -= 1;

        let all_typed = params.iter().all(|p| p.ty.is_some());
        if all_typed {
            Type::Lambda(Box::new(FunctionType {
                params: params.iter().map(|p| p.ty.clone().unwrap()).collect(),
                result: Box::new(result),
            }))
        } else {
            let id = self.cold.fresh();
            Type::ColdLambdaPlaceholder(crate::types::ColdLambdaId(id))
        }
    }

    /// A call site invoking a still-cold lambda with concrete argument types
    /// constrains it; two incompatible call sites is a (best-effort
    /// reported-once) mismatch, per §4.2.
    fn constrain_cold_lambda(&mut self, id: crate::types::ColdLambdaId, args: &[Type], result: Type, loc: &crate::ast::SourceLocation) {
        let ft = FunctionType { params: args.to_vec(), result: Box::new(result) };
        if self.cold.constrain(id.0, ft).is_err() {
            self.diags.report(TypeError::UnresolvedColdLambda { loc: loc.clone() });
        }
    }

    fn check_call(&mut self, receiver: &mut Action, method_ref: crate::ast::MethodOrFunctionRef, args: &mut [Action], loc: &crate::ast::SourceLocation) -> Type {
        let recv_ty = self.check_action(receiver);
        let arg_tys: Vec<Type> = args.iter_mut().map(|a| self.check_action(a)).collect();

        match method_ref {
            crate::ast::MethodOrFunctionRef::Method(method) => {
                self.check_mutating_receiver_if_needed(&recv_ty, method, loc);
                let ft = self.method_function_type(&recv_ty, method);
                for (actual, expected) in arg_tys.iter().zip(ft.params.iter()) {
                    if let Type::ColdLambdaPlaceholder(id) = actual {
                        if let Type::Lambda(want) = expected {
                            self.constrain_cold_lambda(*id, &want.params, (*want.result).clone(), loc);
                        }
                    } else {
                        self.expect_coerces(actual, expected, loc);
                    }
                }
                (*ft.result).clone()
            }
            crate::ast::MethodOrFunctionRef::Function(_func) => Type::Void,
        }
    }

    /// §4.2 "Method dispatch typing": a method called on a `ConformRef`
    /// receiver must be tagged ANY; on a `Shared` receiver it must not be
    /// MUTATING; on an owned/ref receiver it must not be FROZEN.
    fn check_mutating_receiver_if_needed(&mut self, recv_ty: &Type, method: crate::ast::MethodId, loc: &crate::ast::SourceLocation) {
        let Some(sig) = self.names.methods.get(&method) else {
            return;
        };
        match (recv_ty, sig.mutability) {
            (Type::Pointer(PtrKind::Shared, _), crate::ast::Mutability::Mutating) => {
                self.diags.report(TypeError::MutatingCallOnNonUniqueReceiver { method, loc: loc.clone() });
            }
            (Type::Pointer(PtrKind::ConformRef, _), mutability) if mutability != crate::ast::Mutability::Any => {
                self.diags.report(TypeError::ConformRefRequiresAnyMethod { method, loc: loc.clone() });
            }
            (Type::Pointer(PtrKind::Own | PtrKind::Ref, _), crate::ast::Mutability::Frozen) => {
                self.diags.report(TypeError::FrozenCallOnNonSharedReceiver { method, loc: loc.clone() });
            }
            _ => {}
        }
    }

    fn check_mutating_receiver(&mut self, recv_ty: &Type, loc: &crate::ast::SourceLocation) {
        if matches!(recv_ty, Type::Pointer(PtrKind::Shared, _)) {
            self.diags.report(TypeError::MutatingCallOnNonUniqueReceiver {
                method: crate::ast::MethodId(u32::MAX),
                loc: loc.clone(),
            });
        }
    }

    fn expect_coerces(&mut self, actual: &Type, expected: &Type, loc: &crate::ast::SourceLocation) {
        if !actual.coerces_to(expected) {
            self.diags.report(TypeError::Mismatch { expected: expected.to_string(), found: actual.to_string(), loc: loc.clone() });
        }
    }

    fn field_type(&mut self, base_ty: &Type, field: crate::ast::FieldId, loc: &crate::ast::SourceLocation) -> Type {
        let _ = base_ty;
        match self.names.field_types.get(&field) {
            Some(ty) => ty.clone(),
            None => {
                self.diags.report(TypeError::UntypedField { field, loc: loc.clone() });
                Type::Void
            }
        }
    }

    /// Looks up `method`'s declared signature (§4.2 "Method dispatch
    /// typing"). Factory methods return the caller's own receiver type
    /// rather than their declared result, preserving Own-vs-Ref and any
    /// derived-class refinement at the call site.
    fn method_function_type(&self, recv_ty: &Type, method: crate::ast::MethodId) -> FunctionType {
        let Some(sig) = self.names.methods.get(&method) else {
            return FunctionType { params: vec![], result: Box::new(Type::Void) };
        };
        let mut ft = sig.function_type();
        if sig.is_factory {
            ft.result = Box::new(recv_ty.clone());
        }
        ft
    }

    /// §4.8: an `Array`/`Map` holds owned elements, a `SharedArray`/`SharedMap`
    /// holds shared elements, and a `WeakArray`/`WeakMap` holds weak ones.
    fn container_element_type(&mut self, base_ty: &Type, loc: &crate::ast::SourceLocation) -> Type {
        match base_ty.class_id().and_then(|c| builtin_container_kind(c)) {
            Some(ContainerKind::Array) | Some(ContainerKind::Map) => Type::Pointer(PtrKind::Own, builtins::OBJECT_CLASS),
            Some(ContainerKind::SharedArray) | Some(ContainerKind::SharedMap) => Type::Pointer(PtrKind::Shared, builtins::OBJECT_CLASS),
            Some(ContainerKind::WeakArray) | Some(ContainerKind::WeakMap) => Type::Pointer(PtrKind::Weak, builtins::OBJECT_CLASS),
            _ => {
                self.diags.report(TypeError::Mismatch {
                    expected: "Array/Map family".into(),
                    found: base_ty.to_string(),
                    loc: loc.clone(),
                });
                Type::Void
            }
        }
    }

    /// §4.2 "ToStr": the fixed argument-type -> TypeTag mapping that
    /// `rewrite_to_str` rewrites into a `put<Tag>` method name. Enum types
    /// tag by their own declared name, since this middle end has no
    /// separate module namespace to prefix onto `<module><enumname>`.
    fn type_tag(&self, ty: &Type) -> Option<String> {
        match ty {
            Type::Int32 => Some("Int32".to_string()),
            Type::Int64 => Some("Int".to_string()),
            Type::Float => Some("Float".to_string()),
            Type::Double => Some("Double".to_string()),
            Type::Void => Some("Void".to_string()),
            Type::Pointer(_, class) if *class == builtins::STRING_CLASS => Some("Str".to_string()),
            Type::Pointer(..) => Some("Obj".to_string()),
            Type::Enum(class) => self.names.class_by_id.get(class).map(|info| info.name.clone()),
            _ => None,
        }
    }

    /// §4.2 "ToStr": rewrites `ToStr(stream, value)` into `stream.put<Tag>(value)`
    /// per the fixed TypeTag mapping, reporting an error if the stream class
    /// has no matching `put<Tag>` method.
    fn rewrite_to_str(&mut self, stream_ty: &Type, value_ty: Type, loc: &crate::ast::SourceLocation) -> Type {
        let Some(tag) = self.type_tag(&value_ty) else {
            self.diags.report(TypeError::ToStrValueNotTaggable { found: value_ty, loc: loc.clone() });
            return Type::Void;
        };
        let method_name = format!("put{tag}");
        let Some(stream_class) = stream_ty.class_id() else {
            self.diags.report(TypeError::Mismatch { expected: "a stream object".into(), found: stream_ty.to_string(), loc: loc.clone() });
            return Type::Void;
        };
        match self.names.method_lookup(stream_class, &method_name) {
            Some(method) => {
                let ft = self.method_function_type(stream_ty, method);
                (*ft.result).clone()
            }
            None => {
                self.diags.report(TypeError::NoStreamPutMethod { class: stream_class, method: method_name, loc: loc.clone() });
                Type::Void
            }
        }
    }
}

fn builtin_container_kind(class: ClassId) -> Option<ContainerKind> {
    builtins::builtin_classes().iter().find(|c| c.id == class).and_then(|c| c.container_kind)
}

/// §4.2: an `If` with branches of different concrete types, where one side
/// is `NoRet` (an unconditional `Break`), takes the other side's type.
fn join_branch_types(then_ty: Type, else_ty: Type) -> Type {
    match (then_ty, else_ty) {
        (Type::NoRet, other) | (other, Type::NoRet) => other,
        (a, b) if a == b => a,
        (a, _) => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ActionKind, Function, FunctionId, SourceLocation, Var, VarId};

    fn simple_function(body: Vec<Action>, result: Option<Type>) -> Function {
        Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![],
            result,
            body: Some(Block { actions: body }),
            is_platform: false,
            loc: SourceLocation::unknown(),
        }
    }

    #[test]
    fn arithmetic_action_gets_typed() {
        let mut module = Module {
            classes: vec![],
            functions: vec![simple_function(
                vec![Action::new(
                    ActionKind::Add(
                        Box::new(Action::new(ActionKind::ConstInt32(1), SourceLocation::unknown())),
                        Box::new(Action::new(ActionKind::ConstInt32(2), SourceLocation::unknown())),
                    ),
                    SourceLocation::unknown(),
                )],
                Some(Type::Int32),
            )],
        };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(!diags.has_errors());
        assert_eq!(module.functions[0].body.as_ref().unwrap().actions[0].ty, Some(Type::Int32));
    }

    #[test]
    fn condition_must_be_optional_or_weak() {
        let mut module = Module {
            classes: vec![],
            functions: vec![simple_function(
                vec![Action::new(
                    ActionKind::If(
                        Box::new(Action::new(ActionKind::ConstInt32(1), SourceLocation::unknown())),
                        Box::new(Action::new(ActionKind::ConstVoid, SourceLocation::unknown())),
                        Box::new(Action::new(ActionKind::ConstVoid, SourceLocation::unknown())),
                    ),
                    SourceLocation::unknown(),
                )],
                None,
            )],
        };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(diags.has_errors());
    }

    #[test]
    fn fully_typed_lambda_is_not_cold() {
        let param = Var { id: VarId(0), name: "x".into(), ty: Some(Type::Int32), loc: SourceLocation::unknown() };
        let mut module = Module {
            classes: vec![],
            functions: vec![simple_function(
                vec![Action::new(
                    ActionKind::MkLambda(
                        vec![param],
                        Box::new(Block { actions: vec![Action::new(ActionKind::Get(VarId(0)), SourceLocation::unknown())] }),
                        vec![],
                    ),
                    SourceLocation::unknown(),
                )],
                None,
            )],
        };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(!diags.has_errors());
        matches!(module.functions[0].body.as_ref().unwrap().actions[0].ty, Some(Type::Lambda(_)));
    }

    fn class_with_method(class_id: u32, method_id: u32, mutability: crate::ast::Mutability) -> Class {
        Class {
            id: ClassId(class_id),
            name: "C".into(),
            base: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![crate::ast::Method {
                id: crate::ast::MethodId(method_id),
                name: "go".into(),
                mutability,
                params: vec![],
                result: Some(Type::Void),
                body: Some(Block { actions: vec![] }),
                is_factory: false,
                is_interface_method: false,
                is_override: false,
                loc: SourceLocation::unknown(),
            }],
            enum_tags: vec![],
            loc: SourceLocation::unknown(),
        }
    }

    /// Builds `r.go()` where `r` (param `VarId(0)`) already carries the
    /// receiver pointer-flavor via its declared `Var::ty` (the checker reads
    /// parameter types straight off `Var::ty`, so no separate annotation is
    /// needed on the `Get` node itself).
    fn call_through(_recv: PtrKind, _class_id: u32, method_id: u32) -> Action {
        Action::new(
            ActionKind::Call(
                Box::new(Action::new(ActionKind::Get(VarId(0)), SourceLocation::unknown())),
                crate::ast::MethodOrFunctionRef::Method(crate::ast::MethodId(method_id)),
                vec![],
            ),
            SourceLocation::unknown(),
        )
    }

    #[test]
    fn mutating_method_through_shared_receiver_is_rejected() {
        let class = class_with_method(900, 9000, crate::ast::Mutability::Mutating);
        let recv = Var { id: VarId(0), name: "r".into(), ty: Some(Type::Pointer(PtrKind::Shared, ClassId(900))), loc: SourceLocation::unknown() };
        let mut module = Module {
            classes: vec![class],
            functions: vec![Function {
                id: FunctionId(0),
                name: "f".into(),
                params: vec![recv],
                result: None,
                body: Some(Block { actions: vec![call_through(PtrKind::Shared, 900, 9000)] }),
                is_platform: false,
                loc: SourceLocation::unknown(),
            }],
        };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(diags.has_errors(), "a MUTATING method called through a Shared receiver must be rejected");
    }

    #[test]
    fn frozen_method_through_owned_receiver_is_rejected() {
        let class = class_with_method(901, 9001, crate::ast::Mutability::Frozen);
        let recv = Var { id: VarId(0), name: "r".into(), ty: Some(Type::Pointer(PtrKind::Own, ClassId(901))), loc: SourceLocation::unknown() };
        let mut module = Module {
            classes: vec![class],
            functions: vec![Function {
                id: FunctionId(0),
                name: "f".into(),
                params: vec![recv],
                result: None,
                body: Some(Block { actions: vec![call_through(PtrKind::Own, 901, 9001)] }),
                is_platform: false,
                loc: SourceLocation::unknown(),
            }],
        };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(diags.has_errors(), "a FROZEN method called through an owned receiver must be rejected");
    }

    #[test]
    fn conform_ref_receiver_requires_any_method() {
        let class = class_with_method(902, 9002, crate::ast::Mutability::Mutating);
        let recv = Var { id: VarId(0), name: "r".into(), ty: Some(Type::Pointer(PtrKind::ConformRef, ClassId(902))), loc: SourceLocation::unknown() };
        let mut module = Module {
            classes: vec![class],
            functions: vec![Function {
                id: FunctionId(0),
                name: "f".into(),
                params: vec![recv],
                result: None,
                body: Some(Block { actions: vec![call_through(PtrKind::ConformRef, 902, 9002)] }),
                is_platform: false,
                loc: SourceLocation::unknown(),
            }],
        };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(diags.has_errors(), "a ConformRef receiver may only call ANY-mutability methods");
    }

    fn stream_class(has_put_int32: bool) -> Class {
        let methods = if has_put_int32 {
            vec![crate::ast::Method {
                id: crate::ast::MethodId(9500),
                name: "putInt32".into(),
                mutability: crate::ast::Mutability::Mutating,
                params: vec![Var { id: VarId(1), name: "v".into(), ty: Some(Type::Int32), loc: SourceLocation::unknown() }],
                result: Some(Type::Void),
                body: Some(Block { actions: vec![] }),
                is_factory: false,
                is_interface_method: false,
                is_override: false,
                loc: SourceLocation::unknown(),
            }]
        } else {
            vec![]
        };
        Class {
            id: ClassId(950),
            name: "Stream".into(),
            base: None,
            interfaces: vec![],
            fields: vec![],
            methods,
            enum_tags: vec![],
            loc: SourceLocation::unknown(),
        }
    }

    fn to_str_function(stream_recv: Var) -> Function {
        Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![stream_recv],
            result: None,
            body: Some(Block {
                actions: vec![Action::new(
                    ActionKind::ToStr(
                        Box::new(Action::new(ActionKind::Get(VarId(0)), SourceLocation::unknown())),
                        Box::new(Action::new(ActionKind::ConstInt32(1), SourceLocation::unknown())),
                    ),
                    SourceLocation::unknown(),
                )],
            }),
            is_platform: false,
            loc: SourceLocation::unknown(),
        }
    }

    #[test]
    fn to_str_rewrites_to_the_matching_put_method() {
        let stream_recv = Var { id: VarId(0), name: "s".into(), ty: Some(Type::Pointer(PtrKind::Own, ClassId(950))), loc: SourceLocation::unknown() };
        let mut module = Module { classes: vec![stream_class(true)], functions: vec![to_str_function(stream_recv)] };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(!diags.has_errors(), "{:?}", diags.errors());
        assert_eq!(module.functions[0].body.as_ref().unwrap().actions[0].ty, Some(Type::Void));
    }

    #[test]
    fn to_str_reports_an_error_when_the_stream_has_no_matching_put_method() {
        let stream_recv = Var { id: VarId(0), name: "s".into(), ty: Some(Type::Pointer(PtrKind::Own, ClassId(950))), loc: SourceLocation::unknown() };
        let mut module = Module { classes: vec![stream_class(false)], functions: vec![to_str_function(stream_recv)] };
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(diags.has_errors(), "a stream class with no putInt32 method must be rejected");
    }

    #[test]
    fn weak_array_elements_are_typed_weak_not_own() {
        let mut module = Module {
            classes: vec![],
            functions: vec![simple_function(
                vec![Action::new(
                    ActionKind::GetAtIndex(
                        Box::new(Action::new(ActionKind::Get(VarId(0)), SourceLocation::unknown())),
                        Box::new(Action::new(ActionKind::ConstInt32(0), SourceLocation::unknown())),
                    ),
                    SourceLocation::unknown(),
                )],
                None,
            )],
        };
        module.functions[0].params =
            vec![Var { id: VarId(0), name: "a".into(), ty: Some(Type::Pointer(PtrKind::Own, builtins::WEAK_ARRAY_CLASS)), loc: SourceLocation::unknown() }];
        let (names, _) = crate::resolver::resolve_module(&module);
        let diags = check_module(&mut module, &names);
        assert!(!diags.has_errors());
        assert_eq!(
            module.functions[0].body.as_ref().unwrap().actions[0].ty,
            Some(Type::Pointer(PtrKind::Weak, builtins::OBJECT_CLASS))
        );
    }
}
