//! VMT/interface dispatch layout planning (§4.3). Follows the familiar
//! shape for a planning pass (a struct holding `&ResolvedNames`, one public
//! entry point, `#[cfg(test)]` colocated tests) the same way
//! `call_graph.rs`/`capture_analysis.rs` do their own analyses.

use std::collections::{HashMap, HashSet};

use crate::ast::{ClassId, MethodId, Module};
use crate::diagnostics::{Diagnostics, LayoutError};
use crate::resolver::ResolvedNames;

/// One class's fully built virtual method table: `[dispatcher] ++
/// new_methods(C) ++ VMT(base(C))`, with overridden slots replaced in
/// place rather than appended (§4.3 "VMT layout").
#[derive(Debug, Clone, Default)]
pub struct Vmt {
    /// Slot 0 is conceptually the dispatcher word; `slots[0]` here is the
    /// first real method slot (the runtime header carries the dispatcher
    /// itself, see `ag_runtime::header::Counter`).
    pub slots: Vec<MethodId>,
}

/// A class's field layout: declared-nearest-root-first offsets, so a
/// subclass adding fields never invalidates a base class's accessors
/// (§4.3 "Field layout").
#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    pub offsets: HashMap<crate::ast::FieldId, usize>,
    pub field_count: usize,
}

/// A random 48-bit id, assigned once per interface class and stable across
/// a compilation (§4.3 "Interface dispatch"). Stored as the bare 48-bit
/// random value; `shifted()` produces the actual "interface-key" word with
/// its low 16 bits reserved for a method ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceKey(pub u64);

pub const RANDOM_BITS: u32 = 48;
pub const ORDINAL_BITS: u32 = 16;
pub const RANDOM_MASK: u64 = (1u64 << RANDOM_BITS) - 1;
pub const ORDINAL_MASK: u64 = (1u64 << ORDINAL_BITS) - 1;

impl InterfaceKey {
    /// The actual "interface-key" word: the random 48-bit id shifted left
    /// by `ORDINAL_BITS` so the low 16 bits are free to carry a method
    /// ordinal (§4.3: "assigned a random 48-bit id at plan time, shifted
    /// left by 16 and stored as an interface-key").
    pub fn shifted(&self) -> u64 {
        (self.0 & RANDOM_MASK) << ORDINAL_BITS
    }

    /// `interface-key | method-ordinal`, the combined id a caller passes to
    /// a class's dispatcher function.
    pub fn combined(&self, ordinal: u32) -> u64 {
        self.shifted() | (ordinal as u64 & ORDINAL_MASK)
    }
}

/// A selected bit window over a combined `interface-key | method-ordinal`
/// id, optionally paired with one extra "splinter" bit drawn from elsewhere
/// in the key (§4.3 "i-table bit-selection algorithm", step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSelection {
    pub lo: u32,
    pub hi: u32,
    pub splinter: Option<u32>,
}

impl BitSelection {
    fn window_width(&self) -> u32 {
        self.hi - self.lo
    }

    pub fn width(&self) -> u32 {
        self.window_width() + self.splinter.is_some() as u32
    }

    /// Extracts this selection's bits from `combined`, appending the
    /// splinter bit (if any) as the top bit of the result.
    pub fn extract(&self, combined: u64) -> u64 {
        let window = (combined >> self.lo) & ((1u64 << self.window_width()) - 1);
        match self.splinter {
            Some(bit) => window | (((combined >> bit) & 1) << self.window_width()),
            None => window,
        }
    }
}

/// One class's per-interface method vector: slot 0 is the interface-key
/// (read by a dynamic cast to verify the class really implements `interface`
/// before trusting the following slots), slots 1.. are the class's method
/// implementations in the interface's own declared method order (§4.3
/// "Interface dispatch"; §8 invariants `i_table(C,I)[0] == interface_key(I)`
/// and `|i_table(C,I)| == 1 + |new_methods(I)|`).
#[derive(Debug, Clone)]
pub struct PerInterfaceTable {
    pub interface: ClassId,
    pub key: InterfaceKey,
    /// `methods.len() + 1 == |i_table(C,I)|`; the `+1` is the key slot.
    pub methods: Vec<MethodId>,
}

impl PerInterfaceTable {
    /// slot 0 of `i_table(C,I)` — the interface-key word itself.
    pub fn key_slot(&self) -> u64 {
        self.key.shifted()
    }

    pub fn len(&self) -> usize {
        1 + self.methods.len()
    }
}

/// The dispatcher's i-table indexing plan: one flat bit-selection level, or
/// (when no single window distinguishes every implemented interface) a
/// two-level table keyed by a first-level selection with a recursively
/// chosen second-level selection per colliding bucket (§4.3 step 3).
#[derive(Debug, Clone)]
pub enum IDispatch {
    Flat {
        selection: BitSelection,
        /// `slots[extracted_value]` is an index into `ITablePlan::tables`.
        slots: Vec<Option<usize>>,
    },
    TwoLevel {
        selection: BitSelection,
        buckets: Vec<Option<Bucket>>,
    },
}

#[derive(Debug, Clone)]
pub struct Bucket {
    pub selection: BitSelection,
    pub slots: Vec<Option<usize>>,
}

/// A class's full interface-dispatch plan (§4.3 "Interface dispatch" +
/// "i-Table bit selection"): the per-interface method vectors it owns, plus
/// the bit-selection plan that lets the dispatcher pick the right vector
/// from a combined `interface-key | method-ordinal` id.
#[derive(Debug, Clone)]
pub struct ITablePlan {
    pub tables: Vec<PerInterfaceTable>,
    pub dispatch: IDispatch,
}

#[derive(Debug, Clone, Default)]
pub struct ClassLayoutPlan {
    pub vmt: Vmt,
    pub fields: FieldLayout,
    /// Present only for classes implementing at least one interface.
    pub itable: Option<ITablePlan>,
}

pub struct LayoutPlanner<'a> {
    names: &'a ResolvedNames,
    plans: HashMap<ClassId, ClassLayoutPlan>,
    interface_keys: HashMap<ClassId, InterfaceKey>,
    diags: Diagnostics<LayoutError>,
}

pub fn plan_module(module: &Module, names: &ResolvedNames, interface_keys: HashMap<ClassId, InterfaceKey>) -> (HashMap<ClassId, ClassLayoutPlan>, Diagnostics<LayoutError>) {
    let mut planner = LayoutPlanner { names, plans: HashMap::new(), interface_keys, diags: Diagnostics::new() };

    // Plan base classes before derived ones regardless of declaration
    // order, so `plan_fields`/`plan_vmt` always find an already-built base
    // plan in `self.plans`.
    let mut ordered: Vec<&crate::ast::Class> = module.classes.iter().collect();
    ordered.sort_by_key(|c| names.ancestors(c.id).len());
    for class in ordered {
        planner.plan_class(class);
    }
    (planner.plans, planner.diags)
}

impl<'a> LayoutPlanner<'a> {
    fn plan_class(&mut self, class: &crate::ast::Class) {
        if self.plans.contains_key(&class.id) {
            return;
        }
        let fields = self.plan_fields(class);
        let vmt = self.plan_vmt(class);
        let itable = self.plan_itable(class);

        self.plans.insert(class.id, ClassLayoutPlan { vmt, fields, itable });
    }

    fn plan_fields(&self, class: &crate::ast::Class) -> FieldLayout {
        let mut offsets = HashMap::new();
        let mut ancestors = self.names.ancestors(class.id);
        ancestors.reverse(); // root-first
        let mut offset = 0usize;

        for ancestor in ancestors {
            if let Some(plan) = self.plans.get(&ancestor) {
                offsets.extend(plan.fields.offsets.iter().map(|(k, v)| (*k, *v)));
                offset = plan.fields.field_count;
            }
        }
        for field in &class.fields {
            offsets.insert(field.id, offset);
            offset += 1;
        }
        FieldLayout { offsets, field_count: offset }
    }

    /// `VMT(C) = [dispatcher] ++ new_methods(C) ++ VMT(base(C))`, with a
    /// method that overrides a base slot replacing that slot in place
    /// rather than appending a new one.
    fn plan_vmt(&self, class: &crate::ast::Class) -> Vmt {
        let base_slots: Vec<MethodId> = class
            .base
            .and_then(|b| self.plans.get(&b))
            .map(|p| p.vmt.slots.clone())
            .unwrap_or_default();

        let mut slots = base_slots;
        let mut new_methods = Vec::new();

        for method in &class.methods {
            if method.is_interface_method {
                continue;
            }
            if method.is_override {
                if let Some(base) = class.base
                    && let Some(base_method) = self.names.method_lookup(base, &method.name)
                    && let Some(pos) = slots.iter().position(|m| *m == base_method)
                {
                    slots[pos] = method.id;
                    continue;
                }
            }
            new_methods.push(method.id);
        }

        // new_methods(C) is prepended ahead of the inherited VMT per the
        // formula above; overrides already replaced their slot in place.
        let mut out = new_methods;
        out.extend(slots);
        Vmt { slots: out }
    }

    /// Builds the per-interface method vectors this class owns, one per
    /// implemented interface, then hands them to [`build_dispatch`] for the
    /// bit-selection plan (§4.3 "i-Table bit selection").
    fn plan_itable(&mut self, class: &crate::ast::Class) -> Option<ITablePlan> {
        if class.interfaces.is_empty() {
            return None;
        }

        let mut tables = Vec::new();
        for iface in &class.interfaces {
            let key = *self.interface_keys.get(iface).unwrap_or(&InterfaceKey(0));
            let Some(iface_info) = self.names.class_by_id.get(iface) else { continue };

            // Ordinals must be stable across compilations for a given
            // interface, so sort by method name rather than relying on
            // hash-map iteration order.
            let mut names_sorted: Vec<&String> = iface_info.methods_by_name.keys().collect();
            names_sorted.sort();
            let methods: Vec<MethodId> = names_sorted
                .into_iter()
                .filter_map(|name| self.names.method_lookup(class.id, name))
                .collect();

            tables.push(PerInterfaceTable { interface: *iface, key, methods });
        }

        if tables.is_empty() {
            return None;
        }

        let keys: Vec<InterfaceKey> = tables.iter().map(|t| t.key).collect();
        let dispatch = build_dispatch(&keys);
        if !dispatch_reaches_every_interface(&dispatch, &keys) {
            // Even the two-level fallback's recursive bucket selection
            // couldn't separate every implemented interface.
            self.diags.report(LayoutError::NoDistinguishingBitSelection { class: class.id });
        }
        Some(ITablePlan { tables, dispatch })
    }
}

/// §4.3 "i-Table bit-selection algorithm":
/// 1. `k = min(ceil(log2(n)), 6)` where `n` is the number of interfaces.
/// 2. For each consecutive window `[pos-k+1, pos]` in `[16, 63]`, plus each
///    window paired with a single splinter bit taken from elsewhere in
///    `[16, 63]`, compute the extracted-value spread and keep the window
///    with the largest distinct count (ties broken by lower bit position).
/// 3. If no window distinguishes all `n` interfaces, retry once with
///    `k + 1`; if that still can't separate them, fall back to a two-level
///    table keyed by the best window found, with a second selection
///    recursively chosen per colliding bucket.
fn build_dispatch(keys: &[InterfaceKey]) -> IDispatch {
    let n = keys.len();
    let base_k = min_k_for(n);

    let (first_pass, _) = best_window(keys, base_k);
    if distinct_count(keys, &first_pass) == n {
        return flat_from(keys, &first_pass);
    }

    let widened_k = (base_k + 1).min(RANDOM_BITS);
    let (second_pass, _) = best_window(keys, widened_k);
    if distinct_count(keys, &second_pass) == n {
        return flat_from(keys, &second_pass);
    }

    // Neither pass fully separates the interfaces; fall back to a
    // two-level table keyed by whichever window did best, with a second,
    // independently chosen selection per colliding bucket.
    let top_level = if distinct_count(keys, &second_pass) >= distinct_count(keys, &first_pass) { second_pass } else { first_pass };
    two_level_from(keys, &top_level)
}

fn min_k_for(n: usize) -> u32 {
    if n <= 1 {
        return 1;
    }
    ((n as f64).log2().ceil() as u32).max(1).min(6)
}

/// Scans every contiguous `k`-bit window inside `[16, 63]`, plus that same
/// window paired with each possible single splinter bit elsewhere in
/// `[16, 63]`, returning the one achieving the largest distinct spread
/// (ties broken by the lower window position, scanned in ascending order).
fn best_window(keys: &[InterfaceKey], k: u32) -> (BitSelection, usize) {
    let shifted: Vec<u64> = keys.iter().map(|key| key.shifted()).collect();
    let k = k.max(1).min(RANDOM_BITS + ORDINAL_BITS - 16);

    let mut best_sel = BitSelection { lo: 16, hi: 16 + k, splinter: None };
    let mut best_count = distinct_count_raw(&shifted, &best_sel);

    let hi_bound = 64 - k;
    for lo in 16..=hi_bound {
        let sel = BitSelection { lo, hi: lo + k, splinter: None };
        let cnt = distinct_count_raw(&shifted, &sel);
        if cnt > best_count {
            best_count = cnt;
            best_sel = sel;
        }

        for splinter in 16..64u32 {
            if splinter >= lo && splinter < lo + k {
                continue;
            }
            let sel = BitSelection { lo, hi: lo + k, splinter: Some(splinter) };
            let cnt = distinct_count_raw(&shifted, &sel);
            if cnt > best_count {
                best_count = cnt;
                best_sel = sel;
            }
        }
    }

    (best_sel, best_count)
}

fn distinct_count(keys: &[InterfaceKey], selection: &BitSelection) -> usize {
    let shifted: Vec<u64> = keys.iter().map(|key| key.shifted()).collect();
    distinct_count_raw(&shifted, selection)
}

fn distinct_count_raw(shifted: &[u64], selection: &BitSelection) -> usize {
    let mut seen = HashSet::new();
    for value in shifted {
        seen.insert(selection.extract(*value));
    }
    seen.len()
}

/// Whether every interface index `0..keys.len()` is reachable through
/// `dispatch` by extracting its own key — i.e. the selection (plus, for a
/// two-level table, its buckets' recursive sub-selections) never let one
/// interface's slot get silently overwritten by another's.
fn dispatch_reaches_every_interface(dispatch: &IDispatch, keys: &[InterfaceKey]) -> bool {
    let mut reached = HashSet::new();
    match dispatch {
        IDispatch::Flat { selection, slots } => {
            for (i, key) in keys.iter().enumerate() {
                let idx = selection.extract(key.shifted()) as usize;
                if slots.get(idx).copied().flatten() == Some(i) {
                    reached.insert(i);
                }
            }
        }
        IDispatch::TwoLevel { selection, buckets } => {
            for (i, key) in keys.iter().enumerate() {
                let idx = selection.extract(key.shifted()) as usize;
                if let Some(Some(bucket)) = buckets.get(idx) {
                    let sub_idx = bucket.selection.extract(key.shifted()) as usize;
                    if bucket.slots.get(sub_idx).copied().flatten() == Some(i) {
                        reached.insert(i);
                    }
                }
            }
        }
    }
    reached.len() == keys.len()
}

fn flat_from(keys: &[InterfaceKey], selection: &BitSelection) -> IDispatch {
    let size = 1usize << selection.width();
    let mut slots: Vec<Option<usize>> = vec![None; size];
    for (i, key) in keys.iter().enumerate() {
        let idx = selection.extract(key.shifted()) as usize;
        slots[idx] = Some(i);
    }
    IDispatch::Flat { selection: *selection, slots }
}

fn two_level_from(keys: &[InterfaceKey], selection: &BitSelection) -> IDispatch {
    let size = 1usize << selection.width();
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); size];
    for (i, key) in keys.iter().enumerate() {
        let idx = selection.extract(key.shifted()) as usize;
        groups[idx].push(i);
    }

    let mut buckets = vec![None; size];
    for (idx, members) in groups.into_iter().enumerate() {
        if members.is_empty() {
            continue;
        }
        if members.len() == 1 {
            buckets[idx] = Some(Bucket { selection: BitSelection { lo: 0, hi: 0, splinter: None }, slots: vec![Some(members[0])] });
            continue;
        }
        let sub_keys: Vec<InterfaceKey> = members.iter().map(|&i| keys[i]).collect();
        let sub_k = min_k_for(sub_keys.len());
        let (sub_sel, _) = best_window(&sub_keys, sub_k);
        let sub_size = 1usize << sub_sel.width();
        let mut sub_slots: Vec<Option<usize>> = vec![None; sub_size];
        for (local_i, &global_i) in members.iter().enumerate() {
            let pos = sub_sel.extract(sub_keys[local_i].shifted()) as usize;
            sub_slots[pos] = Some(global_i);
        }
        buckets[idx] = Some(Bucket { selection: sub_sel, slots: sub_slots });
    }

    IDispatch::TwoLevel { selection: *selection, buckets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Class, Field, Method, Mutability, SourceLocation};

    fn method(id: u32, name: &str, is_override: bool) -> Method {
        Method {
            id: MethodId(id),
            name: name.into(),
            mutability: Mutability::Any,
            params: vec![],
            result: None,
            body: None,
            is_factory: false,
            is_interface_method: false,
            is_override,
            loc: SourceLocation::unknown(),
        }
    }

    fn class(id: u32, name: &str, base: Option<ClassId>, methods: Vec<Method>) -> Class {
        Class {
            id: ClassId(id),
            name: name.into(),
            base,
            interfaces: vec![],
            fields: vec![Field { id: crate::ast::FieldId(id), name: "f".into(), ty: None, loc: SourceLocation::unknown() }],
            methods,
            enum_tags: vec![],
            loc: SourceLocation::unknown(),
        }
    }

    fn iface(id: u32, name: &str, methods: Vec<&str>) -> Class {
        Class {
            id: ClassId(id),
            name: name.into(),
            base: None,
            interfaces: vec![],
            fields: vec![],
            methods: methods
                .into_iter()
                .map(|m| Method {
                    id: MethodId(id * 1000 + m.len() as u32),
                    name: m.into(),
                    mutability: Mutability::Any,
                    params: vec![],
                    result: None,
                    body: None,
                    is_factory: false,
                    is_interface_method: true,
                    is_override: false,
                    loc: SourceLocation::unknown(),
                })
                .collect(),
            enum_tags: vec![],
            loc: SourceLocation::unknown(),
        }
    }

    #[test]
    fn override_replaces_base_slot_in_place() {
        let base = class(100, "Base", None, vec![method(1000, "go", false)]);
        let base_id = base.id;
        let derived = class(101, "Derived", Some(base_id), vec![method(1001, "go", true), method(1002, "extra", false)]);
        let module = Module { classes: vec![base, derived.clone()], functions: vec![] };
        let (names, _) = crate::resolver::resolve_module(&module);
        let (plans, diags) = plan_module(&module, &names, HashMap::new());
        assert!(!diags.has_errors());

        let derived_plan = &plans[&derived.id];
        assert!(derived_plan.vmt.slots.contains(&MethodId(1001)));
        assert!(!derived_plan.vmt.slots.contains(&MethodId(1000)), "overridden slot should not survive");
        assert!(derived_plan.vmt.slots.contains(&MethodId(1002)));
    }

    #[test]
    fn field_offsets_are_stable_across_a_subclass() {
        let base = class(200, "Base", None, vec![]);
        let base_id = base.id;
        let derived = class(201, "Derived", Some(base_id), vec![]);
        let module = Module { classes: vec![base, derived.clone()], functions: vec![] };
        let (names, _) = crate::resolver::resolve_module(&module);
        let (plans, _) = plan_module(&module, &names, HashMap::new());
        let base_plan = &plans[&ClassId(200)];
        let derived_plan = &plans[&derived.id];
        for (field, offset) in &base_plan.fields.offsets {
            assert_eq!(derived_plan.fields.offsets.get(field), Some(offset));
        }
    }

    #[test]
    fn per_interface_table_key_slot_matches_interface_key() {
        let face = iface(300, "Face", vec!["go", "stop"]);
        let face_id = face.id;
        let mut impl_class = class(301, "Impl", None, vec![]);
        impl_class.interfaces.push(face_id);
        impl_class.methods.push(method(3010, "go", false));
        impl_class.methods.push(method(3011, "stop", false));

        let module = Module { classes: vec![face, impl_class.clone()], functions: vec![] };
        let (names, _) = crate::resolver::resolve_module(&module);
        let mut keys = HashMap::new();
        keys.insert(face_id, InterfaceKey(0xABCDEF));
        let (plans, _) = plan_module(&module, &names, keys);

        let plan = plans[&impl_class.id].itable.as_ref().unwrap();
        let table = plan.tables.iter().find(|t| t.interface == face_id).unwrap();
        assert_eq!(table.key_slot(), InterfaceKey(0xABCDEF).shifted());
        assert_eq!(table.len(), 1 + 2, "1 key slot + one slot per interface method");
    }

    #[test]
    fn bit_selection_distinguishes_every_interface() {
        let keys = vec![InterfaceKey(1), InterfaceKey(2), InterfaceKey(3)];
        let dispatch = build_dispatch(&keys);
        match dispatch {
            IDispatch::Flat { selection, slots } => {
                let mut found = HashSet::new();
                for key in &keys {
                    let idx = selection.extract(key.shifted()) as usize;
                    assert!(slots[idx].is_some());
                    found.insert(slots[idx].unwrap());
                }
                assert_eq!(found.len(), keys.len());
            }
            IDispatch::TwoLevel { .. } => {
                // Acceptable for pathological key sets, but not for these
                // trivially distinct low values.
                panic!("expected a flat table to separate these well-spread keys");
            }
        }
    }

    #[test]
    fn two_level_fallback_still_reaches_every_interface() {
        // Every key shares the same low 16 bits of the shifted value
        // (all zero after `<< 16` on a tiny base value), so any window
        // confined to a narrow span can collide; widen the test by forcing
        // identical windows via identical raw ids. The recursive bucket
        // selection must still land each interface on a distinct slot
        // within its bucket.
        let keys: Vec<InterfaceKey> = (0..5).map(InterfaceKey).collect();
        let dispatch = build_dispatch(&keys);
        assert!(dispatch_reaches_every_interface(&dispatch, &keys), "every interface must be reachable through the dispatch table");
    }
}
