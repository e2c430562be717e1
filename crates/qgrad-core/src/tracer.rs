// =============================================================================
// qgrad-core - Tracer
// =============================================================================
// Table of Contents:
//   1. TraceContext - thread-local exclusive construction buffer
//   2. append_gate / append_observable - called by op constructors
//   3. trace - the builder-to-Tape entry point
//   4. validation and classification helpers
// =============================================================================
// Purpose: Turns a builder function into a `Tape` by installing a
//          thread-local construction context, running the builder (which
//          appends gates/observables as a side effect of constructing
//          them), and validating the result. The construction context is
//          an exclusive, scoped RAII token rather than a global mutable
//          slot: a second trace on the same thread fails fast instead of
//          silently interleaving with the first.
// =============================================================================

use std::cell::RefCell;
use std::collections::HashMap;

use crate::descriptor::Family;
use crate::error::{QgradResult, TraceError};
use crate::gradient::compute_grad_methods;
use crate::operation::Operation;
use crate::param::{flatten, ArgTree, Param, ParameterSlot};
use crate::tape::{OutputShape, Tape};

// =============================================================================
// 1. TraceContext
// =============================================================================

struct TraceContext {
    gates: Vec<Operation>,
    observables: Vec<Operation>,
}

thread_local! {
    static ACTIVE_TRACE: RefCell<Option<TraceContext>> = const { RefCell::new(None) };
}

/// Installs an empty `TraceContext` for the duration of one trace. Clears
/// it unconditionally on drop, including when the builder panics.
struct TraceGuard {
    _private: (),
}

impl TraceGuard {
    fn install() -> QgradResult<Self> {
        ACTIVE_TRACE.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_some() {
                return Err(TraceError::ReentrantTrace.into());
            }
            *slot = Some(TraceContext { gates: Vec::new(), observables: Vec::new() });
            Ok(())
        })?;
        Ok(Self { _private: () })
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        ACTIVE_TRACE.with(|cell| {
            *cell.borrow_mut() = None;
        });
    }
}

// =============================================================================
// 2. append_gate / append_observable
// =============================================================================

/// Called by every gate/state-prep constructor in the op library as the
/// final step of construction. Fails outside an active trace, or once an
/// observable has already been queued (all gates must precede all
/// returned observables).
pub fn append_gate(op: Operation) -> QgradResult<()> {
    ACTIVE_TRACE.with(|cell| {
        let mut slot = cell.borrow_mut();
        let ctx = slot.as_mut().ok_or(TraceError::NoActiveContext)?;
        if !ctx.observables.is_empty() {
            return Err(TraceError::GateAfterObservable.into());
        }
        ctx.gates.push(op);
        Ok(())
    })
}

/// Called by every observable constructor. Returns a clone of the queued
/// operation so the builder can hand the same value back as part of its
/// return value; `trace` checks the two agree by identity and order.
pub fn append_observable(op: Operation) -> QgradResult<Operation> {
    ACTIVE_TRACE.with(|cell| {
        let mut slot = cell.borrow_mut();
        let ctx = slot.as_mut().ok_or(TraceError::NoActiveContext)?;
        ctx.observables.push(op.clone());
        Ok(op)
    })
}

// =============================================================================
// 3. trace
// =============================================================================

/// Run `builder` under a fresh trace and assemble the resulting `Tape`.
/// `builder` receives one `Param::Slot` per entry of `flatten(&arg_template)`,
/// in flatten order, and must return the full ordered list of observables
/// it measured (normally by returning exactly what each observable
/// constructor handed back).
pub fn trace(
    arg_template: ArgTree,
    default_kwargs: HashMap<String, Vec<f64>>,
    builder: impl FnOnce(&[Param]) -> QgradResult<Vec<Operation>>,
) -> QgradResult<Tape> {
    let flat = flatten(&arg_template);
    let params: Vec<Param> = (0..flat.len()).map(|idx| Param::Slot(ParameterSlot::new(idx))).collect();

    let _guard = TraceGuard::install()?;
    let build_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| builder(&params)));
    let ctx = ACTIVE_TRACE.with(|cell| cell.borrow_mut().take());

    let returned = match build_result {
        Ok(inner) => inner?,
        Err(payload) => std::panic::resume_unwind(payload),
    };
    let ctx = ctx.unwrap_or(TraceContext { gates: Vec::new(), observables: Vec::new() });

    validate_return_value(&returned, &ctx.observables)?;
    validate_no_duplicate_wires(&ctx.observables)?;
    let family = classify_family(&ctx)?;

    let var_ops = build_var_ops(&ctx);
    let output_dim = ctx.observables.len();
    let output_shape = if output_dim <= 1 { OutputShape::Scalar } else { OutputShape::Vector };

    let mut tape = Tape {
        gates: ctx.gates,
        observables: ctx.observables,
        var_ops,
        family,
        output_dim,
        output_shape,
        arg_template,
        default_kwargs,
        grad_method_for_par: HashMap::new(),
        heisenberg_order2_ops: Default::default(),
    };

    let (grad_method_for_par, heisenberg_order2_ops) = compute_grad_methods(&tape);
    tape.grad_method_for_par = grad_method_for_par;
    tape.heisenberg_order2_ops = heisenberg_order2_ops;

    Ok(tape)
}

// =============================================================================
// 4. validation and classification helpers
// =============================================================================

fn validate_return_value(returned: &[Operation], queued: &[Operation]) -> QgradResult<()> {
    if returned.is_empty() {
        return Err(TraceError::WrongReturnShape.into());
    }
    if returned.len() != queued.len() {
        return Err(TraceError::ReturnOrderMismatch.into());
    }
    for (r, q) in returned.iter().zip(queued) {
        if r.return_type.is_none() {
            return Err(TraceError::MissingReturnType.into());
        }
        if !same_site(r, q) {
            return Err(TraceError::ReturnOrderMismatch.into());
        }
    }
    Ok(())
}

/// Two observable records refer to the same measurement site: same name,
/// wires, parameters and return type. Used instead of comparing the
/// trait-object descriptor (not meaningfully comparable) to check that a
/// builder's return value lists exactly the operations it queued, in order.
fn same_site(a: &Operation, b: &Operation) -> bool {
    a.name == b.name && a.wires == b.wires && a.params == b.params && a.return_type == b.return_type
}

fn validate_no_duplicate_wires(observables: &[Operation]) -> QgradResult<()> {
    let mut seen = std::collections::HashSet::new();
    for obs in observables {
        for &wire in &obs.wires {
            if !seen.insert(wire) {
                return Err(TraceError::WireMeasuredTwice { wire }.into());
            }
        }
    }
    Ok(())
}

/// A tape is entirely `Qubit` or entirely `Cv`; operations named
/// `Identity` are ignored (they carry no physical family).
fn classify_family(ctx: &TraceContext) -> QgradResult<Family> {
    let mut seen: Option<Family> = None;
    for op in ctx.gates.iter().chain(ctx.observables.iter()) {
        if op.is_identity() {
            continue;
        }
        let family = op.family();
        match seen {
            None => seen = Some(family),
            Some(prev) if prev == family => {}
            Some(_) => return Err(TraceError::MixedFamily.into()),
        }
    }
    Ok(seen.unwrap_or(Family::Qubit))
}

/// Walk every operation's flattened parameter list and record the
/// (op_idx, param_idx) use sites of each non-keyword free-parameter slot.
/// Keyword-placeholder slots are deliberately excluded (they can change
/// value between calls without retracing, so they have no Jacobian column).
fn build_var_ops(ctx: &TraceContext) -> HashMap<usize, Vec<(usize, usize)>> {
    let mut var_ops: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
    for (op_idx, op) in ctx.gates.iter().chain(ctx.observables.iter()).enumerate() {
        for (p_idx, param) in op.params.iter().enumerate() {
            if let Param::Slot(slot) = param {
                if !slot.is_keyword() {
                    var_ops.entry(slot.idx).or_default().push((op_idx, p_idx));
                }
            }
        }
    }
    var_ops
}
