//! The lowering advisor (§4.4): attaches a lifetime tag to every
//! [`crate::ast::Action`] and a retain/release/parent-set/splice/weak-copy/
//! cross-break contract to the nodes that need one. This crate does not
//! itself lower to any IR (§1 Non-goals: "bit-exact LLVM IR shape" and
//! codegen generally are out of scope) — it produces the advice an
//! external codegen backend (`crate::codegen::CodegenBackend`) consumes.

use std::collections::HashMap;

use crate::ast::{Action, ActionKind, Block, ClassId, FieldId, Function, Method, Module, VarId};

/// §4.4 lifetime tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifetime {
    /// A value with no refcount to manage (a primitive, or a pointer that
    /// outlives the whole call with no retain needed — e.g. `self`).
    Static,
    /// Owns one retain that must be released when `var` goes out of scope,
    /// unless moved out first.
    Temp(VarId),
    /// The unique strong reference just produced by this action; the
    /// advisor expects the consumer (a `Set`, `SetField`, `Call` argument
    /// slot, or the enclosing block's last-action return) to either retain
    /// it further or release it.
    Retained,
    /// A borrowed alias into a field of `owner`, where `owner` is the node
    /// id of the (Retained) expression the field was read off — an
    /// arbitrary retained expression, not necessarily a named variable;
    /// never independently released, since releasing `owner` covers it.
    RField(NodeId),
}

/// The contract attached to one lowering-relevant node: what retain/release
/// traffic, parent-pointer maintenance, and splice/weak-copy work the
/// generated code must perform around this action.
#[derive(Debug, Clone, Default)]
pub struct NodeContract {
    /// Retain calls the codegen backend must emit before evaluating this
    /// node's operands, in order.
    pub retains: Vec<RetainOp>,
    /// Release calls after the node's result is consumed.
    pub releases: Vec<ReleaseOp>,
    /// Set when this node installs a new parent pointer (a field/array/map
    /// store of an owning reference).
    pub parent_set: Option<ParentSetOp>,
    /// Set when this node must run the splice-cycle check before installing
    /// the new owner (§3 "SpliceField").
    pub splice_check: bool,
    /// Set when a weak field must be retargeted because its owner was
    /// copied (§4.6).
    pub weak_copy: bool,
    /// Set on a `Break` that crosses one or more enclosing lambda
    /// boundaries: the generated code wraps the lambda's result in an
    /// extra optional layer and the caller dispatches on it post-call
    /// (§4.4 "cross-break").
    pub cross_break: Option<CrossBreak>,
}

#[derive(Debug, Clone, Copy)]
pub enum RetainOp {
    Own,
    Pin,
    Weak,
}

#[derive(Debug, Clone, Copy)]
pub enum ReleaseOp {
    Own,
    Pin,
    Weak,
}

#[derive(Debug, Clone, Copy)]
pub struct ParentSetOp {
    pub field: FieldId,
}

#[derive(Debug, Clone, Copy)]
pub struct CrossBreak {
    pub levels: u32,
}

/// Keyed by the `Action`'s identity (its pointer address is unstable across
/// clones, so the advisor keys by a pass-assigned sequence number instead;
/// see `NodeId`). Produced once per function/method body by `advise_block`.
pub type Advice = HashMap<NodeId, (Lifetime, NodeContract)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

struct Advisor {
    next_id: u32,
    advice: Advice,
}

/// Every function's and method's advice, keyed by id rather than name —
/// two overloads, or a base method and its override, share a name but must
/// not share an `Advice` map.
#[derive(Debug, Default)]
pub struct ModuleAdvice {
    pub functions: HashMap<crate::ast::FunctionId, Advice>,
    pub methods: HashMap<crate::ast::MethodId, Advice>,
}

pub fn advise_module(module: &Module) -> ModuleAdvice {
    let mut functions = HashMap::new();
    let mut methods = HashMap::new();
    for function in &module.functions {
        if let Some(body) = &function.body {
            functions.insert(function.id, advise_function(function, body));
        }
    }
    for class in &module.classes {
        for method in &class.methods {
            if let Some(body) = &method.body {
                methods.insert(method.id, advise_method(method, body));
            }
        }
    }
    ModuleAdvice { functions, methods }
}

pub fn advise_function(_function: &Function, body: &Block) -> Advice {
    let mut advisor = Advisor { next_id: 0, advice: HashMap::new() };
    advisor.advise_block(body);
    advisor.advice
}

pub fn advise_method(_method: &Method, body: &Block) -> Advice {
    let mut advisor = Advisor { next_id: 0, advice: HashMap::new() };
    advisor.advise_block(body);
    advisor.advice
}

impl Advisor {
    fn advise_block(&mut self, block: &Block) {
        for action in &block.actions {
            self.advise_action(action, 0);
        }
    }

    fn advise_action(&mut self, action: &Action, cross_break_depth: u32) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let (lifetime, contract) = match &action.kind {
            ActionKind::MkInstance(..) => (Lifetime::Retained, NodeContract { retains: vec![RetainOp::Own], ..Default::default() }),

            ActionKind::SetField(_, field, value) => {
                self.advise_action(value, cross_break_depth);
                (
                    Lifetime::Static,
                    NodeContract {
                        releases: vec![ReleaseOp::Own],
                        parent_set: Some(ParentSetOp { field: *field }),
                        ..Default::default()
                    },
                )
            }
            ActionKind::SpliceField(_, field, value) => {
                self.advise_action(value, cross_break_depth);
                (
                    Lifetime::Static,
                    NodeContract {
                        releases: vec![ReleaseOp::Own],
                        parent_set: Some(ParentSetOp { field: *field }),
                        splice_check: true,
                        ..Default::default()
                    },
                )
            }
            ActionKind::CopyOp(inner) => {
                self.advise_action(inner, cross_break_depth);
                (Lifetime::Retained, NodeContract { weak_copy: true, retains: vec![RetainOp::Own], ..Default::default() })
            }
            ActionKind::FreezeOp(inner) => {
                self.advise_action(inner, cross_break_depth);
                (Lifetime::Retained, NodeContract { weak_copy: true, retains: vec![RetainOp::Pin], ..Default::default() })
            }
            ActionKind::MkWeakOp(inner) => {
                self.advise_action(inner, cross_break_depth);
                (Lifetime::Retained, NodeContract { retains: vec![RetainOp::Weak], ..Default::default() })
            }
            ActionKind::Get(var) => (Lifetime::Temp(*var), NodeContract::default()),
            ActionKind::GetField(base, _) => {
                let base_id = self.advise_action(base, cross_break_depth);
                // §4.4: "if `b` is Retained, the result is RField(b);
                // otherwise Temp(null)" — mapped to Static here since there
                // is no refcount obligation to track in that branch.
                let lifetime = match self.advice.get(&base_id) {
                    Some((Lifetime::Retained, _)) => Lifetime::RField(base_id),
                    _ => Lifetime::Static,
                };
                (lifetime, NodeContract::default())
            }
            ActionKind::Break(levels, value) => {
                self.advise_action(value, cross_break_depth);
                let cb = levels.map(|l| CrossBreak { levels: l }).or(if cross_break_depth > 0 {
                    Some(CrossBreak { levels: cross_break_depth })
                } else {
                    None
                });
                (Lifetime::Retained, NodeContract { cross_break: cb, ..Default::default() })
            }
            ActionKind::MkLambda(_, lambda_body, _captures) => {
                self.advise_block_at_depth(lambda_body, cross_break_depth + 1);
                (Lifetime::Retained, NodeContract { retains: vec![RetainOp::Own], ..Default::default() })
            }
            ActionKind::Loop(body) => {
                self.advise_block(body);
                (Lifetime::Static, NodeContract::default())
            }
            ActionKind::Block(body) => {
                self.advise_block(body);
                (Lifetime::Static, NodeContract::default())
            }
            ActionKind::If(cond, then_b, else_b) => {
                self.advise_action(cond, cross_break_depth);
                self.advise_action(then_b, cross_break_depth);
                self.advise_action(else_b, cross_break_depth);
                (Lifetime::Static, NodeContract::default())
            }
            ActionKind::Call(receiver, _, args) => {
                self.advise_action(receiver, cross_break_depth);
                for a in args {
                    self.advise_action(a, cross_break_depth);
                }
                (Lifetime::Static, NodeContract::default())
            }
            _ => (Lifetime::Static, NodeContract::default()),
        };

        self.advice.insert(id, (lifetime, contract));
        id
    }

    fn advise_block_at_depth(&mut self, block: &Block, depth: u32) {
        for action in &block.actions {
            self.advise_action(action, depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ActionKind, FunctionId, SourceLocation};

    #[test]
    fn mk_instance_gets_retained_lifetime_with_own_retain() {
        let body = Block { actions: vec![Action::new(ActionKind::MkInstance(ClassId(1), vec![]), SourceLocation::unknown())] };
        let function = Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![],
            result: None,
            body: Some(body.clone()),
            is_platform: false,
            loc: SourceLocation::unknown(),
        };
        let advice = advise_function(&function, &body);
        let (lifetime, contract) = advice.values().next().unwrap();
        assert_eq!(*lifetime, Lifetime::Retained);
        assert!(matches!(contract.retains.as_slice(), [RetainOp::Own]));
    }

    #[test]
    fn get_field_on_a_retained_base_is_rfield_of_that_node() {
        let base = Action::new(ActionKind::MkInstance(ClassId(1), vec![]), SourceLocation::unknown());
        let body = Block { actions: vec![Action::new(ActionKind::GetField(Box::new(base), FieldId(0)), SourceLocation::unknown())] };
        let function = Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![],
            result: None,
            body: Some(body.clone()),
            is_platform: false,
            loc: SourceLocation::unknown(),
        };
        let advice = advise_function(&function, &body);
        let base_id = NodeId(0);
        let get_field_id = NodeId(1);
        assert_eq!(advice.get(&base_id).unwrap().0, Lifetime::Retained);
        assert_eq!(advice.get(&get_field_id).unwrap().0, Lifetime::RField(base_id));
    }

    #[test]
    fn get_field_on_a_non_retained_base_is_static() {
        let base = Action::new(ActionKind::Get(VarId(0)), SourceLocation::unknown());
        let body = Block { actions: vec![Action::new(ActionKind::GetField(Box::new(base), FieldId(0)), SourceLocation::unknown())] };
        let function = Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![],
            result: None,
            body: Some(body.clone()),
            is_platform: false,
            loc: SourceLocation::unknown(),
        };
        let advice = advise_function(&function, &body);
        let get_field_id = NodeId(1);
        assert_eq!(advice.get(&get_field_id).unwrap().0, Lifetime::Static);
    }

    #[test]
    fn break_inside_nested_lambda_carries_cross_break_depth() {
        let inner_break = Action::new(
            ActionKind::Break(None, Box::new(Action::new(ActionKind::ConstVoid, SourceLocation::unknown()))),
            SourceLocation::unknown(),
        );
        let lambda_body = Block { actions: vec![inner_break] };
        let body = Block {
            actions: vec![Action::new(ActionKind::MkLambda(vec![], Box::new(lambda_body), vec![]), SourceLocation::unknown())],
        };
        let function = Function {
            id: FunctionId(0),
            name: "f".into(),
            params: vec![],
            result: None,
            body: Some(body.clone()),
            is_platform: false,
            loc: SourceLocation::unknown(),
        };
        let advice = advise_function(&function, &body);
        let has_cross_break = advice.values().any(|(_, c)| c.cross_break.is_some());
        assert!(has_cross_break, "a bare `break` one lambda deep should carry a cross-break contract");
    }
}
