//! The AST model the middle end consumes (§3 "Data Model"). The concrete
//! grammar that produces this tree is out of contract (§1 Non-goals) — only
//! this structure, built either by `crate::parser`'s stub trait or by an
//! embedding host, is.

use std::path::PathBuf;

use crate::types::Type;

/// Source location for diagnostics, shared with the runtime's own
/// `SourceLocation` in spirit (file/line/column) but kept as a distinct
/// compiler-side type since AST spans cover a line range, not a point.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

impl SourceLocation {
    pub fn new(file: PathBuf, line: usize) -> Self {
        SourceLocation { file, start_line: line, end_line: line }
    }

    pub fn span(file: PathBuf, start_line: usize, end_line: usize) -> Self {
        SourceLocation { file, start_line, end_line }
    }

    pub fn unknown() -> Self {
        SourceLocation { file: PathBuf::new(), start_line: 0, end_line: 0 }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

/// A whole compilation unit: every class and free function in source order,
/// plus the name each top-level declaration was given in source (consumed
/// by the resolver, §4.1).
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default)]
pub struct Module {
    pub classes: Vec<Class>,
    pub functions: Vec<Function>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub base: Option<ClassId>,
    /// Interfaces this class claims to implement, resolved by the name
    /// resolver (§4.1) before the layout planner runs (§4.3).
    pub interfaces: Vec<ClassId>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Non-empty for an enum-backing class; each tag's ordinal is its index.
    pub enum_tags: Vec<String>,
    pub loc: SourceLocation,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    /// `None` until the type checker fills it in (§4.2); declared fields may
    /// carry an explicit annotation in source, inferred ones do not.
    pub ty: Option<Type>,
    pub loc: SourceLocation,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Callable only through a uniquely-owned or ref receiver; `this` is a
    /// mutable ref (§3 Method: "A MUTATING method receives a mutable-ref
    /// `this`").
    Mutating,
    /// Callable through any receiver flavor; `this` is a conform-ref (§3
    /// Method: "An ANY method receives a conform-ref `this`").
    Any,
    /// Callable only through a shared receiver; `this` is shared (§3
    /// Method: "A FROZEN method receives its `this` as shared").
    Frozen,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Method {
    pub id: MethodId,
    pub name: String,
    pub mutability: Mutability,
    pub params: Vec<Var>,
    pub result: Option<Type>,
    pub body: Option<Block>,
    /// `true` for a factory method: the type checker rewrites its static
    /// result type to whatever the caller's own receiver type is (Own vs.
    /// Ref, with any derived-class refinement preserved) rather than the
    /// method's own declared result (§3 Method, §4.2 "Method dispatch
    /// typing": "Factory methods return the caller's receiver type").
    pub is_factory: bool,
    /// `true` for a method declared by an interface with no body of its own;
    /// the layout planner assigns it an i-table slot instead of a VMT slot.
    pub is_interface_method: bool,
    /// `true` when this method overrides a same-named base method; checked
    /// by the resolver, consumed by the layout planner's VMT slot reuse.
    pub is_override: bool,
    pub loc: SourceLocation,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Var>,
    pub result: Option<Type>,
    pub body: Option<Block>,
    /// Functions bound to a foreign symbol rather than an AST body (§4 FFI
    /// surface); `crate::builtins` marks these `is_platform`.
    pub is_platform: bool,
    pub loc: SourceLocation,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Var {
    pub id: VarId,
    pub name: String,
    pub ty: Option<Type>,
    pub loc: SourceLocation,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default)]
pub struct Block {
    pub actions: Vec<Action>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    /// Filled in by the type checker (§4.2); `None` before that pass runs.
    pub ty: Option<Type>,
    pub loc: SourceLocation,
}

impl Action {
    pub fn new(kind: ActionKind, loc: SourceLocation) -> Self {
        Action { kind, ty: None, loc }
    }
}

/// The full expression-kind enumeration from §3.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub enum ActionKind {
    // --- Constants ---
    ConstInt32(i32),
    ConstInt64(i64),
    ConstFloat(f32),
    ConstDouble(f64),
    ConstBool(bool),
    ConstVoid,
    ConstString(String),
    ConstEnumTag(ClassId, u32),

    // --- Variables ---
    Get(VarId),
    Set(VarId, Box<Action>),

    // --- Object model ---
    MkInstance(ClassId, Vec<Action>),
    GetField(Box<Action>, FieldId),
    SetField(Box<Action>, FieldId, Box<Action>),
    /// Assign a field that may create a parent-pointer cycle; the lowering
    /// advisor attaches the splice-cycle-check contract here (§4.4).
    SpliceField(Box<Action>, FieldId, Box<Action>),
    Call(Box<Action>, MethodOrFunctionRef, Vec<Action>),
    AsyncCall(Box<Action>, MethodOrFunctionRef, Vec<Action>),
    MakeDelegate(Box<Action>, MethodId),
    ImmediateDelegate(Box<Action>, MethodId, Vec<Action>),
    MakeFnPtr(FunctionId),
    MkLambda(Vec<Var>, Box<Block>, Vec<VarId>),
    Block(Box<Block>),
    /// Non-local exit; `None` target means "exit the nearest enclosing
    /// `Loop`", `Some(n)` means "exit n enclosing lambdas up" (§4.4
    /// "cross-break").
    Break(Option<u32>, Box<Action>),

    // --- Arithmetic / logical ---
    Add(Box<Action>, Box<Action>),
    Sub(Box<Action>, Box<Action>),
    Mul(Box<Action>, Box<Action>),
    Div(Box<Action>, Box<Action>),
    Mod(Box<Action>, Box<Action>),
    And(Box<Action>, Box<Action>),
    Or(Box<Action>, Box<Action>),
    Xor(Box<Action>, Box<Action>),
    Shl(Box<Action>, Box<Action>),
    Shr(Box<Action>, Box<Action>),
    Eq(Box<Action>, Box<Action>),
    Lt(Box<Action>, Box<Action>),
    Not(Box<Action>),
    Neg(Box<Action>),
    Inv(Box<Action>),

    // --- Conditional ---
    If(Box<Action>, Box<Action>, Box<Action>),
    LAnd(Box<Action>, Box<Action>),
    LOr(Box<Action>, Box<Action>),
    Loop(Box<Block>),

    // --- Casts ---
    CastOp(Box<Action>, Type),
    ToInt32(Box<Action>),
    ToInt(Box<Action>),
    ToFloat(Box<Action>),
    ToDouble(Box<Action>),
    /// `ToStr(stream, value)`: rewritten by the type checker into
    /// `stream.put<TypeTag>(value)` per the fixed argument-type -> tag
    /// mapping (§4.2 "ToStr").
    ToStr(Box<Action>, Box<Action>),

    // --- Ownership ---
    CopyOp(Box<Action>),
    FreezeOp(Box<Action>),
    RefOp(Box<Action>),
    ConformOp(Box<Action>),
    MkWeakOp(Box<Action>),
    DerefWeakOp(Box<Action>),

    // --- Indexing (containers, §4.2 GetAtIndex/SetAtIndex rewrite target) ---
    GetAtIndex(Box<Action>, Box<Action>),
    SetAtIndex(Box<Action>, Box<Action>, Box<Action>),
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOrFunctionRef {
    Method(MethodId),
    Function(FunctionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_starts_untyped() {
        let a = Action::new(ActionKind::ConstInt32(1), SourceLocation::unknown());
        assert!(a.ty.is_none());
    }
}
