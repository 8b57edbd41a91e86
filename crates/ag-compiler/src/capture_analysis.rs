//! Lambda capture-list computation: which outer variables a `MkLambda`
//! literal reads or writes, needed so the lowering advisor's `MkLambda`
//! contract knows which of the enclosing scope's variables to retain into
//! the closure environment. Kept the familiar "walk a body, collect free
//! variables not bound within it" shape, retargeted from effect-driven
//! captures onto this language's named-variable `Get`/`Set` captures.

use std::collections::HashSet;

use crate::ast::{Action, ActionKind, Block, Var, VarId};

/// The free variables of a lambda body: every `VarId` it reads or writes
/// that isn't one of its own parameters and wasn't first bound by a `Set`
/// inside the body itself.
pub fn compute_captures(params: &[Var], body: &Block) -> Vec<VarId> {
    let mut bound: HashSet<VarId> = params.iter().map(|p| p.id).collect();
    let mut free = HashSet::new();
    walk_block(body, &mut bound, &mut free);

    let mut captures: Vec<VarId> = free.into_iter().collect();
    captures.sort_by_key(|v| v.0);
    captures
}

fn walk_block(block: &Block, bound: &mut HashSet<VarId>, free: &mut HashSet<VarId>) {
    for action in &block.actions {
        walk_action(action, bound, free);
    }
}

fn walk_action(action: &Action, bound: &mut HashSet<VarId>, free: &mut HashSet<VarId>) {
    match &action.kind {
        ActionKind::Get(var) => {
            if !bound.contains(var) {
                free.insert(*var);
            }
        }
        ActionKind::Set(var, value) => {
            walk_action(value, bound, free);
            // A `Set` of a variable never bound by an enclosing scope
            // introduces a genuinely local variable for the rest of this
            // body, not a capture of an outer one.
            bound.insert(*var);
        }
        ActionKind::MkLambda(inner_params, inner_body, _captures) => {
            // A nested lambda's own free variables that aren't its
            // parameters are still free in *this* body unless already
            // bound here — nested closures transitively capture through.
            let mut inner_bound = bound.clone();
            inner_bound.extend(inner_params.iter().map(|p| p.id));
            let mut inner_free = HashSet::new();
            walk_block(inner_body, &mut inner_bound, &mut inner_free);
            for v in inner_free {
                if !bound.contains(&v) {
                    free.insert(v);
                }
            }
        }
        ActionKind::Block(b) | ActionKind::Loop(b) => walk_block(b, bound, free),
        ActionKind::If(cond, then_b, else_b) => {
            walk_action(cond, bound, free);
            walk_action(then_b, bound, free);
            walk_action(else_b, bound, free);
        }
        ActionKind::Break(_, value) => walk_action(value, bound, free),
        ActionKind::Add(l, r)
        | ActionKind::Sub(l, r)
        | ActionKind::Mul(l, r)
        | ActionKind::Div(l, r)
        | ActionKind::Mod(l, r)
        | ActionKind::And(l, r)
        | ActionKind::Or(l, r)
        | ActionKind::Xor(l, r)
        | ActionKind::Shl(l, r)
        | ActionKind::Shr(l, r)
        | ActionKind::Eq(l, r)
        | ActionKind::Lt(l, r)
        | ActionKind::LAnd(l, r)
        | ActionKind::LOr(l, r)
        | ActionKind::GetAtIndex(l, r) => {
            walk_action(l, bound, free);
            walk_action(r, bound, free);
        }
        ActionKind::SetAtIndex(b, i, v) => {
            walk_action(b, bound, free);
            walk_action(i, bound, free);
            walk_action(v, bound, free);
        }
        ActionKind::Not(i) | ActionKind::Neg(i) | ActionKind::Inv(i) | ActionKind::CastOp(i, _) | ActionKind::ToInt32(i)
        | ActionKind::ToInt(i) | ActionKind::ToFloat(i) | ActionKind::ToDouble(i)
        | ActionKind::CopyOp(i) | ActionKind::FreezeOp(i) | ActionKind::RefOp(i) | ActionKind::ConformOp(i)
        | ActionKind::MkWeakOp(i) | ActionKind::DerefWeakOp(i) | ActionKind::GetField(i, _) => walk_action(i, bound, free),
        ActionKind::ToStr(stream, value) => {
            walk_action(stream, bound, free);
            walk_action(value, bound, free);
        }
        ActionKind::SetField(base, _, value) | ActionKind::SpliceField(base, _, value) => {
            walk_action(base, bound, free);
            walk_action(value, bound, free);
        }
        ActionKind::Call(receiver, _, args) | ActionKind::AsyncCall(receiver, _, args) | ActionKind::ImmediateDelegate(receiver, _, args) => {
            walk_action(receiver, bound, free);
            for a in args {
                walk_action(a, bound, free);
            }
        }
        ActionKind::MakeDelegate(receiver, _) => walk_action(receiver, bound, free),
        ActionKind::MkInstance(_, args) => {
            for a in args {
                walk_action(a, bound, free);
            }
        }
        ActionKind::ConstInt32(_)
        | ActionKind::ConstInt64(_)
        | ActionKind::ConstFloat(_)
        | ActionKind::ConstDouble(_)
        | ActionKind::ConstBool(_)
        | ActionKind::ConstVoid
        | ActionKind::ConstString(_)
        | ActionKind::ConstEnumTag(..)
        | ActionKind::MakeFnPtr(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;

    #[test]
    fn captures_outer_variable_read_inside_lambda_body() {
        let outer = VarId(7);
        let body = Block { actions: vec![Action::new(ActionKind::Get(outer), SourceLocation::unknown())] };
        let captures = compute_captures(&[], &body);
        assert_eq!(captures, vec![outer]);
    }

    #[test]
    fn does_not_capture_its_own_parameter() {
        let param = Var { id: VarId(1), name: "x".into(), ty: None, loc: SourceLocation::unknown() };
        let body = Block { actions: vec![Action::new(ActionKind::Get(VarId(1)), SourceLocation::unknown())] };
        let captures = compute_captures(&[param], &body);
        assert!(captures.is_empty());
    }

    #[test]
    fn does_not_capture_a_variable_it_sets_before_reading() {
        let body = Block {
            actions: vec![
                Action::new(ActionKind::Set(VarId(2), Box::new(Action::new(ActionKind::ConstInt32(1), SourceLocation::unknown()))), SourceLocation::unknown()),
                Action::new(ActionKind::Get(VarId(2)), SourceLocation::unknown()),
            ],
        };
        let captures = compute_captures(&[], &body);
        assert!(captures.is_empty());
    }
}
