// =============================================================================
// qgrad-core - Scoped parameter substitution
// =============================================================================
// Table of Contents:
//   1. with_substituted_param - the parameter-shift substitution protocol
//   2. with_substituted_observable - variance-rule observable substitution
// =============================================================================
// Purpose: For the parameter-shift rule, a single operation's parameter
//          must be temporarily replaced by a fresh slot at an unused
//          index, evaluated, and then the original restored on every
//          exit path — including a panic unwinding through the closure.
//          This is the single most error-prone invariant of the engine
//          (property test 4 in the test suite asserts it holds after
//          every jacobian() call); a closure-scoped function is the
//          idiomatic Rust analogue of a try/finally block, guaranteeing
//          the restore step runs regardless of how the closure returns.
// =============================================================================

use crate::operation::Operation;
use crate::param::Param;
use crate::tape::Tape;

/// Save `tape.combined_op(op_idx).params[p_idx]`, install a copy with
/// `idx` rebound to `new_idx`, run `f`, then restore the saved parameter
/// unconditionally — even if `f` panics.
///
/// Panics if the targeted parameter is not a `Param::Slot`.
pub fn with_substituted_param<T>(
    tape: &mut Tape,
    op_idx: usize,
    p_idx: usize,
    new_idx: usize,
    f: impl FnOnce(&mut Tape) -> T,
) -> T {
    let original = tape.combined_op(op_idx).params[p_idx].clone();
    let slot = original
        .as_slot()
        .expect("scoped substitution target must be a Param::Slot")
        .with_idx(new_idx);
    tape.combined_op_mut(op_idx).params[p_idx] = Param::Slot(slot);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(tape)));

    tape.combined_op_mut(op_idx).params[p_idx] = original;

    match result {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

/// Save `tape.observables[obs_idx]`, install `replacement`, run `f`, then
/// restore the original observable unconditionally. Used by the variance
/// shift rule to temporarily swap a `Variance` observable for an
/// `Expectation` of the squared observable.
pub fn with_substituted_observable<T>(
    tape: &mut Tape,
    obs_idx: usize,
    replacement: Operation,
    f: impl FnOnce(&mut Tape) -> T,
) -> T {
    let original = tape.observables[obs_idx].clone();
    tape.observables[obs_idx] = replacement;

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(tape)));

    tape.observables[obs_idx] = original;

    match result {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
