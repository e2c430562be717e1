// =============================================================================
// qgrad-core - Variable registry
// =============================================================================
// Table of Contents:
//   1. ParameterSlot - symbolic placeholder for a free parameter
//   2. ParameterBinding - thread-scoped concrete values
//   3. flatten/unflatten - nested argument structure helpers
// =============================================================================
// Purpose: A process-addressable indirection layer binding symbolic
//          parameter slots to concrete numeric values for a single
//          evaluation. This is the sole concession to dynamic parameter
//          injection: a thread-local binding read by device code during
//          apply/expval/var/sample, established before execute and
//          cleared after.
// =============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Mul, Neg};

// =============================================================================
// 1. ParameterSlot
// =============================================================================

/// A symbolic placeholder for a free parameter, identified by an index and
/// an accumulated multiplicative scale. Scalar multiplication is the only
/// classical preprocessing a slot supports; there is deliberately no `Add`
/// or `Mul<Self>` impl, so `slot + slot` is a compile error rather than an
/// undocumented runtime policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlot {
    pub idx: usize,
    pub name: Option<String>,
    pub mult: f64,
}

impl ParameterSlot {
    pub fn new(idx: usize) -> Self {
        Self { idx, name: None, mult: 1.0 }
    }

    pub fn keyword(idx: usize, name: impl Into<String>) -> Self {
        Self { idx, name: Some(name.into()), mult: 1.0 }
    }

    pub fn is_keyword(&self) -> bool {
        self.name.is_some()
    }

    /// Return a copy of this slot with a different `idx`, used by the
    /// scoped parameter substitution protocol to install a temporary slot
    /// at an unused index without disturbing `mult`.
    pub fn with_idx(&self, idx: usize) -> Self {
        Self { idx, name: self.name.clone(), mult: self.mult }
    }

    pub fn resolve(&self, binding: &ParameterBinding) -> f64 {
        binding.resolve(self)
    }
}

impl Mul<f64> for ParameterSlot {
    type Output = ParameterSlot;

    fn mul(self, c: f64) -> ParameterSlot {
        ParameterSlot { idx: self.idx, name: self.name, mult: c * self.mult }
    }
}

impl Mul<ParameterSlot> for f64 {
    type Output = ParameterSlot;

    fn mul(self, slot: ParameterSlot) -> ParameterSlot {
        slot * self
    }
}

impl Neg for ParameterSlot {
    type Output = ParameterSlot;

    fn neg(self) -> ParameterSlot {
        self * -1.0
    }
}

/// A gate/observable parameter is either a fixed real number or a symbolic
/// slot resolved against the active `ParameterBinding`.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Fixed(f64),
    Slot(ParameterSlot),
}

impl Param {
    pub fn resolve(&self, binding: &ParameterBinding) -> f64 {
        match self {
            Param::Fixed(v) => *v,
            Param::Slot(slot) => slot.resolve(binding),
        }
    }

    pub fn as_slot(&self) -> Option<&ParameterSlot> {
        match self {
            Param::Slot(slot) => Some(slot),
            Param::Fixed(_) => None,
        }
    }
}

// =============================================================================
// 2. ParameterBinding
// =============================================================================

/// Two arrays resolved by every `ParameterSlot` when a device reads a
/// concrete number: `free_values[idx]` for positional slots, and
/// `kwarg_values[name][idx]` for keyword-placeholder slots. Lifetime is the
/// critical section of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinding {
    pub free_values: Vec<f64>,
    pub kwarg_values: HashMap<String, Vec<f64>>,
}

impl ParameterBinding {
    pub fn new(free_values: Vec<f64>) -> Self {
        Self { free_values, kwarg_values: HashMap::new() }
    }

    pub fn with_kwargs(mut self, kwarg_values: HashMap<String, Vec<f64>>) -> Self {
        self.kwarg_values = kwarg_values;
        self
    }

    pub fn resolve(&self, slot: &ParameterSlot) -> f64 {
        let base = match &slot.name {
            None => self.free_values[slot.idx],
            Some(name) => self.kwarg_values.get(name).expect("unbound keyword slot")[slot.idx],
        };
        base * slot.mult
    }

    /// Return a copy with `free_values` extended by one entry, used by the
    /// scoped substitution protocol to evaluate a temporary slot installed
    /// at index `free_values.len()`.
    pub fn extended(&self, extra: f64) -> Self {
        let mut free_values = self.free_values.clone();
        free_values.push(extra);
        Self { free_values, kwarg_values: self.kwarg_values.clone() }
    }

    /// Return a copy with `free_values[idx]` shifted by `delta`.
    pub fn shifted(&self, idx: usize, delta: f64) -> Self {
        let mut free_values = self.free_values.clone();
        free_values[idx] += delta;
        Self { free_values, kwarg_values: self.kwarg_values.clone() }
    }
}

thread_local! {
    static ACTIVE_BINDING: RefCell<Option<ParameterBinding>> = const { RefCell::new(None) };
}

/// RAII guard installing a `ParameterBinding` for the duration of one
/// device execution. Dropping the guard always clears the binding, even
/// on an early return via `?` or a panic unwinding through `execute`.
pub struct BindingGuard {
    _private: (),
}

impl BindingGuard {
    pub fn install(binding: ParameterBinding) -> Self {
        ACTIVE_BINDING.with(|cell| {
            *cell.borrow_mut() = Some(binding);
        });
        Self { _private: () }
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        ACTIVE_BINDING.with(|cell| {
            *cell.borrow_mut() = None;
        });
    }
}

/// Resolve a slot against the binding currently installed on this thread.
/// Panics if called outside an active `BindingGuard` scope — callers are
/// devices invoked exclusively from within `Device::execute`.
pub fn resolve_active(slot: &ParameterSlot) -> f64 {
    ACTIVE_BINDING.with(|cell| {
        let borrow = cell.borrow();
        let binding = borrow.as_ref().expect("no parameter binding installed");
        binding.resolve(slot)
    })
}

pub fn resolve_param_active(param: &Param) -> f64 {
    match param {
        Param::Fixed(v) => *v,
        Param::Slot(slot) => resolve_active(slot),
    }
}

// =============================================================================
// 3. flatten / unflatten
// =============================================================================

/// A minimal nested-argument tree over real numbers, mirroring the shapes
/// a builder function's positional arguments can take: a bare scalar, an
/// ordered sequence, or a named mapping of sequences (used for keyword
/// arguments bearing default values).
#[derive(Debug, Clone, PartialEq)]
pub enum ArgTree {
    Scalar(f64),
    Seq(Vec<ArgTree>),
}

/// Flatten a nested argument tree into an ordered list of reals plus a
/// shape descriptor that `unflatten` can later replay. Pure function: no
/// shared state, grounded on the flatten/unflatten pair used by the
/// tracer to assign `ParameterSlot::idx` in traversal order and by the
/// result assembler to rebuild a Jacobian's per-input-argument shape.
pub fn flatten(tree: &ArgTree) -> Vec<f64> {
    let mut out = Vec::new();
    flatten_into(tree, &mut out);
    out
}

fn flatten_into(tree: &ArgTree, out: &mut Vec<f64>) {
    match tree {
        ArgTree::Scalar(v) => out.push(*v),
        ArgTree::Seq(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
    }
}

/// Rebuild a nested tree of the same shape as `template`, reading values
/// from `flat` in the same order `flatten` would have produced them.
pub fn unflatten(flat: &[f64], template: &ArgTree) -> ArgTree {
    let mut iter = flat.iter().copied();
    let result = unflatten_from(&mut iter, template);
    result
}

fn unflatten_from(iter: &mut impl Iterator<Item = f64>, template: &ArgTree) -> ArgTree {
    match template {
        ArgTree::Scalar(_) => {
            ArgTree::Scalar(iter.next().expect("flat values exhausted before template"))
        }
        ArgTree::Seq(items) => {
            ArgTree::Seq(items.iter().map(|item| unflatten_from(iter, item)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_multiplication_accumulates() {
        let slot = ParameterSlot::new(0);
        let scaled = 2.0 * (3.0 * slot);
        assert_eq!(scaled.mult, 6.0);
        assert_eq!(scaled.idx, 0);
    }

    #[test]
    fn keyword_slot_resolves_from_kwarg_values() {
        let mut kwargs = HashMap::new();
        kwargs.insert("input_state".to_string(), vec![0.0, 1.0]);
        let binding = ParameterBinding::new(vec![]).with_kwargs(kwargs);
        let slot = ParameterSlot::keyword(1, "input_state");
        assert_eq!(slot.resolve(&binding), 1.0);
    }

    #[test]
    fn flatten_unflatten_roundtrip() {
        let tree = ArgTree::Seq(vec![
            ArgTree::Scalar(1.0),
            ArgTree::Seq(vec![ArgTree::Scalar(2.0), ArgTree::Scalar(3.0)]),
        ]);
        let flat = flatten(&tree);
        assert_eq!(flat, vec![1.0, 2.0, 3.0]);
        assert_eq!(unflatten(&flat, &tree), tree);
    }

    #[test]
    fn binding_guard_clears_on_drop() {
        let slot = ParameterSlot::new(0);
        {
            let _guard = BindingGuard::install(ParameterBinding::new(vec![4.2]));
            assert_eq!(resolve_active(&slot), 4.2);
        }
        let result = std::panic::catch_unwind(|| resolve_active(&slot));
        assert!(result.is_err());
    }
}
