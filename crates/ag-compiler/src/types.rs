//! The type algebra the checker assigns to every [`crate::ast::Action`]
//! (§3 "Types").
//!
//! Pointer flavors are kept as a separate `PtrKind` rather than one enum
//! variant per flavor so the checker's coercion rules (§4.2 "Implicit
//! conversions") can pattern-match on "same class, different flavor"
//! without duplicating the class reference in every arm.

use std::fmt;

use crate::ast::ClassId;

/// How a pointer to a class is held. Ownership flavors mirror §3's
/// "Ownership invariants" directly; this is the compile-time tag the
/// runtime's `ParentLink`/counter-flag pair enforces at run time.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrKind {
    /// Unique parent-tracked owner.
    Own,
    /// Borrowed alias; never the unique owner.
    Ref,
    /// Multi-referenced immutable (frozen) alias.
    Shared,
    /// Accepts Own, Ref, or Shared at a call boundary (method receiver only
    /// for ANY-mutability methods, §4.2 "Method dispatch typing").
    ConformRef,
    /// Non-owning reference that survives object death.
    Weak,
    /// A weak into a frozen object specifically.
    FrozenWeak,
    /// Accepts Weak or FrozenWeak at a call boundary.
    ConformWeak,
}

impl PtrKind {
    /// §4.2: `Own<C>` is compatible with `Ref<C>`, never the reverse.
    /// `Shared<C>` and `Own<C>` both coerce to `ConformRef<C>`.
    pub fn coerces_to(self, target: PtrKind) -> bool {
        use PtrKind::*;
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (Own, Ref) | (Own, ConformRef) | (Shared, ConformRef) | (Weak, ConformWeak) | (FrozenWeak, ConformWeak)
        )
    }

    pub fn is_weak(self) -> bool {
        matches!(self, PtrKind::Weak | PtrKind::FrozenWeak | PtrKind::ConformWeak)
    }
}

/// A fully resolved type. `Optional` nests to an explicit depth per §3
/// invariant 6 ("an optional type of depth d ... operations preserve
/// depth") rather than as a chain of single-level wrappers, so depth
/// comparisons in the checker's auto-wrap rule are a plain integer compare.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub enum Type {
    Int32,
    Int64,
    Float,
    Double,
    Void,
    /// The type of an expression that never returns normally (an
    /// unconditional `Break`/cross-break propagation, or a `Loop` with no
    /// escape and a non-optional body).
    NoRet,
    Enum(ClassId),
    Pointer(PtrKind, ClassId),
    Function(Box<FunctionType>),
    Lambda(Box<FunctionType>),
    Delegate(Box<FunctionType>),
    /// A lambda whose parameter/result types are not yet known; see
    /// `ColdLambda` in `crate::typechecker`. Never appears in a fully
    /// checked program — `typechecker::check_module` resolves every
    /// `ColdLambda` before returning, or reports
    /// `TypeError::UnresolvedColdLambda`.
    ColdLambdaPlaceholder(ColdLambdaId),
    Optional(Box<Type>, u32),
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColdLambdaId(pub u32);

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub result: Box<Type>,
}

impl Type {
    pub fn optional(base: Type, depth: u32) -> Type {
        if depth == 0 {
            base
        } else {
            Type::Optional(Box::new(base), depth)
        }
    }

    /// Peels exactly one level of optional, per §3 invariant 6. Returns
    /// `None` if `self` is not an optional.
    pub fn unwrap_optional_once(&self) -> Option<Type> {
        match self {
            Type::Optional(inner, depth) if *depth > 1 => Some(Type::Optional(inner.clone(), depth - 1)),
            Type::Optional(inner, _) => Some((**inner).clone()),
            _ => None,
        }
    }

    pub fn optional_depth(&self) -> u32 {
        match self {
            Type::Optional(_, depth) => *depth,
            _ => 0,
        }
    }

    pub fn is_pointer_kind(&self) -> bool {
        matches!(self, Type::Pointer(..) | Type::Lambda(_) | Type::Delegate(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int32 | Type::Int64 | Type::Float | Type::Double)
    }

    /// §4.2 "Conditions": any expression used as a condition must evaluate
    /// to an optional or a weak reference.
    pub fn is_condition_compatible(&self) -> bool {
        matches!(self, Type::Optional(..)) || matches!(self, Type::Pointer(k, _) if k.is_weak())
    }

    pub fn ptr_kind(&self) -> Option<PtrKind> {
        match self {
            Type::Pointer(k, _) => Some(*k),
            _ => None,
        }
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            Type::Pointer(_, c) | Type::Enum(c) => Some(*c),
            _ => None,
        }
    }

    /// §4.2 coercion rule, lifted to full `Type`s (non-pointer types only
    /// coerce to themselves).
    pub fn coerces_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (Type::Pointer(sk, sc), Type::Pointer(tk, tc)) if sc == tc => sk.coerces_to(*tk),
            (Type::NoRet, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::Float => write!(f, "Float"),
            Type::Double => write!(f, "Double"),
            Type::Void => write!(f, "Void"),
            Type::NoRet => write!(f, "NoRet"),
            Type::Enum(c) => write!(f, "Enum({})", c.0),
            Type::Pointer(k, c) => write!(f, "{:?}<{}>", k, c.0),
            Type::Function(ft) => write!(f, "fn({:?}) -> {}", ft.params, ft.result),
            Type::Lambda(ft) => write!(f, "lambda({:?}) -> {}", ft.params, ft.result),
            Type::Delegate(ft) => write!(f, "delegate({:?}) -> {}", ft.params, ft.result),
            Type::ColdLambdaPlaceholder(id) => write!(f, "<cold lambda #{}>", id.0),
            Type::Optional(inner, depth) => write!(f, "Optional({}, {})", inner, depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_coerces_to_ref_and_conform_ref_not_reverse() {
        assert!(PtrKind::Own.coerces_to(PtrKind::Ref));
        assert!(PtrKind::Own.coerces_to(PtrKind::ConformRef));
        assert!(!PtrKind::Ref.coerces_to(PtrKind::Own));
    }

    #[test]
    fn shared_coerces_to_conform_ref_only() {
        assert!(PtrKind::Shared.coerces_to(PtrKind::ConformRef));
        assert!(!PtrKind::Shared.coerces_to(PtrKind::Ref));
        assert!(!PtrKind::Shared.coerces_to(PtrKind::Own));
    }

    #[test]
    fn optional_depth_round_trips() {
        let t = Type::optional(Type::Int32, 2);
        assert_eq!(t.optional_depth(), 2);
        let once = t.unwrap_optional_once().unwrap();
        assert_eq!(once.optional_depth(), 1);
        let twice = once.unwrap_optional_once().unwrap();
        assert_eq!(twice, Type::Int32);
    }

    #[test]
    fn weak_is_condition_compatible_pointer_is_not() {
        let weak = Type::Pointer(PtrKind::Weak, ClassId(0));
        let owned = Type::Pointer(PtrKind::Own, ClassId(0));
        assert!(weak.is_condition_compatible());
        assert!(!owned.is_condition_compatible());
        assert!(Type::optional(Type::Int32, 1).is_condition_compatible());
    }
}
