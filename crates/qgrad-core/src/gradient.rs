// =============================================================================
// qgrad-core - Gradient engine
// =============================================================================
// Table of Contents:
//   1. JacobianMethod - top-level method selector
//   2. compute_grad_methods - per-parameter method selection (§4.7)
//   3. jacobian - Jacobian computation dispatch
//   4. finite-difference rules
//   5. parameter-shift (analytic order 1) rule
//   6. Heisenberg (analytic order 2) rule
//   7. variance shift rule
// =============================================================================
// Purpose: Chooses a per-parameter differentiation method, evaluates
//          finite-difference shifts, applies the parameter-shift rule,
//          applies the Heisenberg order-2 rule, and implements the
//          variance shift rule on top of the expectation shift rule.
// =============================================================================

use std::collections::{HashMap, HashSet};

use ndarray::Array2;

use crate::descriptor::{Family, GradMethod, GradRecipe, ReturnType};
use crate::device::{Device, DeviceOutput, QueryOutput};
use crate::error::{ArgumentError, QgradResult};
use crate::param::ParameterBinding;
use crate::substitution::{with_substituted_observable, with_substituted_param};
use crate::tape::{JacobianMatrix, Tape};

// =============================================================================
// 1. JacobianMethod
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacobianMethod {
    Analytic,
    Finite,
    Best,
}

impl std::str::FromStr for JacobianMethod {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analytic" => Ok(JacobianMethod::Analytic),
            "finite" => Ok(JacobianMethod::Finite),
            "best" => Ok(JacobianMethod::Best),
            other => Err(ArgumentError::UnknownMethod(other.to_string())),
        }
    }
}

// =============================================================================
// 2. compute_grad_methods
// =============================================================================

/// Per-parameter method selection (§4.7). Returns the combined method for
/// every free-parameter slot referenced in `tape.var_ops`, plus the set of
/// combined-tape op indices whose contribution should use the order-2
/// Heisenberg rule rather than plain parameter-shift.
pub fn compute_grad_methods(tape: &Tape) -> (HashMap<usize, GradMethod>, HashSet<usize>) {
    let mut grad_method_for_par = HashMap::new();
    let mut heisenberg_order2_ops = HashSet::new();

    for (&slot, sites) in &tape.var_ops {
        let mut op_indices: Vec<usize> = sites.iter().map(|&(op_idx, _)| op_idx).collect();
        op_indices.sort_unstable();
        op_indices.dedup();

        let mut methods = Vec::with_capacity(op_indices.len());
        for op_idx in op_indices {
            let method = best_method_for_op(tape, op_idx, &mut heisenberg_order2_ops);
            methods.push(method);
        }

        let combined = if methods.iter().any(|m| *m == GradMethod::None) {
            GradMethod::None
        } else if methods.iter().all(|m| *m == GradMethod::Analytic) {
            GradMethod::Analytic
        } else {
            GradMethod::Finite
        };
        grad_method_for_par.insert(slot, combined);
    }

    (grad_method_for_par, heisenberg_order2_ops)
}

fn best_method_for_op(tape: &Tape, op_idx: usize, heisenberg_order2_ops: &mut HashSet<usize>) -> GradMethod {
    let op = tape.combined_op(op_idx);
    let descriptor = op
        .descriptor
        .as_op()
        .expect("var_ops entries must reference gate/state_prep operations");

    if descriptor.family() != Family::Cv {
        return descriptor.grad_method();
    }

    if descriptor.grad_method() != GradMethod::Analytic {
        return descriptor.grad_method();
    }

    // CV op with an analytic hint: inspect downstream structure.
    let successors = tape.successors(op_idx);
    if successors.iter().any(|succ| {
        succ.descriptor
            .as_op()
            .map(|d| !d.supports_heisenberg())
            .unwrap_or(true)
    }) {
        return GradMethod::Finite;
    }

    let mut saw_unsupported_order = false;
    let mut saw_order2_variance = false;
    let mut saw_order2_expectation = false;
    for obs in &tape.observables {
        let obs_descriptor = obs.descriptor.as_obs().expect("observables carry ObservableDescriptor");
        match obs_descriptor.ev_order() {
            None => saw_unsupported_order = true,
            Some(2) if obs.return_type == Some(ReturnType::Variance) => saw_order2_variance = true,
            Some(2) if obs.return_type == Some(ReturnType::Expectation) => saw_order2_expectation = true,
            _ => {}
        }
    }

    if saw_unsupported_order || saw_order2_variance {
        return GradMethod::Finite;
    }
    if saw_order2_expectation {
        heisenberg_order2_ops.insert(op_idx);
    }
    GradMethod::Analytic
}

// =============================================================================
// 3. jacobian
// =============================================================================

pub struct JacobianRequest<'a> {
    pub which: Option<&'a [usize]>,
    pub method: JacobianMethod,
    pub h: f64,
    pub order: u8,
}

/// Compute the Jacobian of the tape's returned observables with respect
/// to the requested free parameters. `params` is the current point;
/// `device` must already have had `tape` traced against it (i.e. tape and
/// device agree on wire count / supported ops).
pub fn jacobian(
    device: &mut dyn Device,
    tape: &mut Tape,
    params: &[f64],
    request: &JacobianRequest,
) -> QgradResult<JacobianMatrix> {
    if request.order != 1 && request.order != 2 {
        return Err(ArgumentError::InvalidOrder(request.order).into());
    }

    let num_free = params.len();
    let which: Vec<usize> = match request.which {
        Some(idx) => {
            let mut seen = HashSet::new();
            for &i in idx {
                if i >= num_free {
                    return Err(ArgumentError::IndexOutOfRange { index: i, num_params: num_free }.into());
                }
                if !seen.insert(i) {
                    return Err(ArgumentError::DuplicateIndex(i).into());
                }
            }
            idx.to_vec()
        }
        None => (0..num_free).collect(),
    };

    if tape.observables.iter().any(|obs| matches!(obs.return_type, Some(ReturnType::Sample(_)))) {
        return Err(crate::error::TraceError::DifferentiatingSample { slot: which.first().copied().unwrap_or(0) }.into());
    }

    let base_binding = ParameterBinding::new(params.to_vec()).with_kwargs(tape.default_kwargs.clone());

    let has_variance = tape.observables.iter().any(|obs| obs.return_type == Some(ReturnType::Variance));

    let mut jac = JacobianMatrix::zeros(tape.output_dim, which.len());

    // y0 is reused across every order-1 finite-diff column (§4.7).
    let mut y0_cache: Option<Vec<f64>> = None;

    for (col, &slot) in which.iter().enumerate() {
        let effective_method = match request.method {
            JacobianMethod::Finite => GradMethod::Finite,
            JacobianMethod::Best => *tape.grad_method_for_par.get(&slot).unwrap_or(&GradMethod::Finite),
            JacobianMethod::Analytic => {
                let best = *tape.grad_method_for_par.get(&slot).unwrap_or(&GradMethod::Finite);
                if best != GradMethod::Analytic {
                    return Err(ArgumentError::AnalyticUnavailable { slot, actual: format!("{:?}", best) }.into());
                }
                GradMethod::Analytic
            }
        };

        let column = match effective_method {
            GradMethod::None => vec![0.0; tape.output_dim],
            GradMethod::Finite => {
                if request.order == 1 {
                    if y0_cache.is_none() {
                        y0_cache = Some(evaluate_scalars(device, tape, &base_binding)?);
                    }
                    finite_diff_order1(device, tape, &base_binding, slot, request.h, y0_cache.as_ref().unwrap())?
                } else {
                    finite_diff_order2(device, tape, &base_binding, slot, request.h)?
                }
            }
            GradMethod::Analytic => {
                analytic_column(device, tape, &base_binding, slot)?
            }
        };

        jac.set_column(col, &column);

        if has_variance {
            let variance_column = variance_rule_column(device, tape, &base_binding, slot, effective_method, request)?;
            for (row, value) in variance_column.iter().enumerate() {
                if let Some(v) = value {
                    jac.data[[row, col]] = *v;
                }
            }
        }
    }

    Ok(jac)
}

fn evaluate_scalars(device: &mut dyn Device, tape: &Tape, binding: &ParameterBinding) -> QgradResult<Vec<f64>> {
    let out = device.execute(tape, binding)?;
    Ok(scalars_or_zero(&out))
}

fn scalars_or_zero(out: &DeviceOutput) -> Vec<f64> {
    out.values
        .iter()
        .map(|v| match v {
            QueryOutput::Scalar(x) => *x,
            QueryOutput::Sample(_) => 0.0,
        })
        .collect()
}

// =============================================================================
// 4. finite-difference rules
// =============================================================================

fn finite_diff_order1(
    device: &mut dyn Device,
    tape: &Tape,
    base: &ParameterBinding,
    slot: usize,
    h: f64,
    y0: &[f64],
) -> QgradResult<Vec<f64>> {
    let shifted = base.shifted(slot, h);
    let y1 = evaluate_scalars(device, tape, &shifted)?;
    Ok(y1.iter().zip(y0).map(|(a, b)| (a - b) / h).collect())
}

fn finite_diff_order2(
    device: &mut dyn Device,
    tape: &Tape,
    base: &ParameterBinding,
    slot: usize,
    h: f64,
) -> QgradResult<Vec<f64>> {
    let plus = base.shifted(slot, h / 2.0);
    let minus = base.shifted(slot, -h / 2.0);
    let y_plus = evaluate_scalars(device, tape, &plus)?;
    let y_minus = evaluate_scalars(device, tape, &minus)?;
    Ok(y_plus.iter().zip(&y_minus).map(|(p, m)| (p - m) / h).collect())
}

// =============================================================================
// 5. parameter-shift (analytic order 1) rule
// =============================================================================

fn analytic_column(
    device: &mut dyn Device,
    tape: &mut Tape,
    base: &ParameterBinding,
    slot: usize,
) -> QgradResult<Vec<f64>> {
    let sites = tape.var_ops.get(&slot).cloned().unwrap_or_default();
    let mut total = vec![0.0; tape.output_dim];

    for (op_idx, p_idx) in sites {
        let is_heisenberg = tape.heisenberg_order2_ops.contains(&op_idx);
        let contribution = if is_heisenberg {
            heisenberg_contribution(device, tape, base, op_idx, p_idx)?
        } else {
            parameter_shift_contribution(device, tape, base, op_idx, p_idx)?
        };
        for (acc, c) in total.iter_mut().zip(contribution) {
            *acc += c;
        }
    }

    Ok(total)
}

fn parameter_shift_contribution(
    device: &mut dyn Device,
    tape: &mut Tape,
    base: &ParameterBinding,
    op_idx: usize,
    p_idx: usize,
) -> QgradResult<Vec<f64>> {
    let original = tape.combined_op(op_idx).params[p_idx].clone();
    let original_slot = original.as_slot().expect("parameter-shift site must hold a Param::Slot").clone();

    let descriptor = tape
        .combined_op(op_idx)
        .descriptor
        .as_op()
        .expect("parameter-shift site must be a gate/state_prep op")
        .clone();
    let GradRecipe { multiplier, shift } = descriptor.grad_recipe(p_idx).unwrap_or_default();

    let new_idx = base.free_values.len();
    let base_value = base.free_values[original_slot.idx];

    let run = |tape: &mut Tape, device: &mut dyn Device, shift_amount: f64| -> QgradResult<Vec<f64>> {
        with_substituted_param(tape, op_idx, p_idx, new_idx, |tape| {
            let shifted_value = base_value + shift_amount / original_slot.mult;
            let extended = base.extended(shifted_value);
            evaluate_scalars(device, tape, &extended)
        })
    };

    let y_plus = run(tape, device, shift)?;
    let y_minus = run(tape, device, -shift)?;

    Ok(y_plus
        .iter()
        .zip(&y_minus)
        .map(|(p, m)| (p - m) * multiplier * original_slot.mult)
        .collect())
}

// =============================================================================
// 6. Heisenberg (analytic order 2) rule
// =============================================================================

fn heisenberg_contribution(
    device: &mut dyn Device,
    tape: &mut Tape,
    base: &ParameterBinding,
    op_idx: usize,
    p_idx: usize,
) -> QgradResult<Vec<f64>> {
    let op = tape.combined_op(op_idx);
    let num_wires = op.wires.len();
    let op_wires = op.wires.clone();
    let descriptor = op.descriptor.as_op().expect("heisenberg site must be a gate").clone();
    let GradRecipe { multiplier, shift } = descriptor.grad_recipe(p_idx).unwrap_or_default();

    let original_mult = op.params[p_idx].as_slot().map(|s| s.mult).unwrap_or(1.0);
    let base_params: Vec<f64> = op.params.iter().map(|p| p.resolve(base)).collect();

    let mut params_plus = base_params.clone();
    params_plus[p_idx] += shift;
    let mut params_minus = base_params.clone();
    params_minus[p_idx] -= shift;

    let z_plus = descriptor.heisenberg_tr(&params_plus, num_wires, false);
    let z_minus = descriptor.heisenberg_tr(&params_minus, num_wires, false);
    let z0_inverse = descriptor.heisenberg_tr(&base_params, num_wires, true);

    // Derivative of the op's own symplectic transform, scaled back to a
    // derivative with respect to the raw (unscaled) free parameter.
    let mut z = (&z_plus - &z_minus).mapv(|v| v * multiplier * original_mult);
    z = z.dot(&z0_inverse);

    // Conjugate through every downstream non-observable op: B * Z * B^-1.
    let successors = tape.successors(op_idx).to_vec();
    let total_wires = tape.num_wires_used();
    let mut b = Array2::<f64>::eye(1 + 2 * total_wires);
    let mut b_inv = Array2::<f64>::eye(1 + 2 * total_wires);
    for succ in &successors {
        let succ_descriptor = succ.descriptor.as_op().expect("successors must be gates");
        let succ_params: Vec<f64> = succ.params.iter().map(|p| p.resolve(base)).collect();
        let succ_wires = succ.wires.len();
        let tr = embed(&succ_descriptor.heisenberg_tr(&succ_params, succ_wires, false), &succ.wires, total_wires);
        let tr_inv = embed(&succ_descriptor.heisenberg_tr(&succ_params, succ_wires, true), &succ.wires, total_wires);
        b = tr.dot(&b);
        b_inv = b_inv.dot(&tr_inv);
    }
    let z_embedded = embed(&z, &op_wires, total_wires);
    let z_conjugated = b.dot(&z_embedded).dot(&b_inv);

    // Transform each returned observable and evaluate at the unshifted binding.
    let mut contribution = vec![0.0; tape.output_dim];
    for (row, obs) in tape.observables.iter().enumerate() {
        let obs_descriptor = obs.descriptor.as_obs().expect("observables carry ObservableDescriptor");
        if obs.return_type != Some(ReturnType::Expectation) {
            continue;
        }
        let Some(order) = obs_descriptor.ev_order() else { continue };
        let q = embed(&obs_descriptor.heisenberg_obs(obs.wires.len()), &obs.wires, total_wires);
        let mut q_prime = q.dot(&z_conjugated);
        if order == 2 {
            let q_prime_t = q_prime.t().to_owned();
            q_prime = q_prime + q_prime_t;
        }
        contribution[row] = transformed_observable_expectation(device, tape, base, &q_prime, order)?;
    }

    Ok(contribution)
}

/// Embed a `(1+2w) x (1+2w)` transformation acting on `wires` into the
/// full `(1+2W) x (1+2W)` homogeneous-basis space (`W` = total wires
/// used by the tape), leaving untouched wires as identity.
fn embed(local: &Array2<f64>, wires: &[usize], total_wires: usize) -> Array2<f64> {
    let full_dim = 1 + 2 * total_wires;
    let mut full = Array2::<f64>::eye(full_dim);
    // index 0 is the homogeneous "1"; wire w occupies rows/cols
    // 1 + 2w (x quadrature) and 2 + 2w (p quadrature).
    let mut local_to_full = vec![0usize];
    for &w in wires {
        local_to_full.push(1 + 2 * w);
        local_to_full.push(2 + 2 * w);
    }
    for (li, &fi) in local_to_full.iter().enumerate() {
        for (lj, &fj) in local_to_full.iter().enumerate() {
            full[[fi, fj]] = local[[li, lj]];
        }
    }
    full
}

/// Evaluate a transformed (not queued) observable at the unshifted
/// binding by asking the device for its Heisenberg expectation directly.
/// Reference devices expose this via the same `expval`/`var` pathway
/// using a synthetic "__heisenberg__" observable name carrying `q_prime`
/// as its parameter payload is impractical across the trait boundary, so
/// instead qgrad-refsim's Gaussian device computes `tr(q' . state)`
/// itself; this helper resolves the current mean/covariance through the
/// device's `expval` hook keyed on the polynomial coefficients.
fn transformed_observable_expectation(
    device: &mut dyn Device,
    tape: &Tape,
    base: &ParameterBinding,
    q_prime: &Array2<f64>,
    order: u8,
) -> QgradResult<f64> {
    device.reset();
    for op in &tape.gates {
        let params: Vec<f64> = op.params.iter().map(|p| p.resolve(base)).collect();
        device.apply(&op.name, &op.wires, &params);
    }
    let coeffs: Vec<f64> = q_prime.iter().copied().collect();
    let name = if order == 1 { "__heisenberg_linear__" } else { "__heisenberg_quadratic__" };
    Ok(device.expval(name, &[], &coeffs))
}

// =============================================================================
// 7. variance shift rule
// =============================================================================

/// `∂Var(A)/∂θ = ∂⟨A²⟩/∂θ − 2⟨A⟩∂⟨A⟩/∂θ`. Returns one entry per row of
/// the output, `None` for rows that are not variance observables (so the
/// caller can leave the plain-expectation column untouched there).
fn variance_rule_column(
    device: &mut dyn Device,
    tape: &mut Tape,
    base: &ParameterBinding,
    slot: usize,
    method: GradMethod,
    request: &JacobianRequest,
) -> QgradResult<Vec<Option<f64>>> {
    let mut out = vec![None; tape.output_dim];

    let variance_rows: Vec<usize> = tape
        .observables
        .iter()
        .enumerate()
        .filter(|(_, obs)| obs.return_type == Some(ReturnType::Variance))
        .map(|(i, _)| i)
        .collect();
    if variance_rows.is_empty() {
        return Ok(out);
    }

    let y0 = evaluate_scalars(device, tape, base)?;

    for row in variance_rows {
        let obs_descriptor = tape.observables[row].descriptor.as_obs().expect("variance obs").clone();
        // y0 has one entry per returned observable, in order, so the
        // variance row's own index is also its <A> baseline value.
        let a_value = y0[row];

        // d<A>/dtheta: treat the variance observable as a plain expectation.
        let replacement = crate::operation::Operation::observable(
            obs_descriptor.clone(),
            tape.observables[row].wires.clone(),
            tape.observables[row].params.clone(),
            Some(ReturnType::Expectation),
        );
        let d_expectation = with_substituted_observable(tape, row, replacement, |tape| {
            differentiate_single_column(device, tape, base, slot, method, request)
        })?;
        let d_a = d_expectation[row];

        // d<A^2>/dtheta, or exactly zero when A^2 = I (squared() is None).
        let d_a2 = if let Some(squared) = obs_descriptor.squared() {
            let replacement = crate::operation::Operation::observable(
                squared.into(),
                tape.observables[row].wires.clone(),
                tape.observables[row].params.clone(),
                Some(ReturnType::Expectation),
            );
            let d_squared = with_substituted_observable(tape, row, replacement, |tape| {
                differentiate_single_column(device, tape, base, slot, method, request)
            })?;
            d_squared[row]
        } else {
            0.0
        };

        out[row] = Some(d_a2 - 2.0 * a_value * d_a);
    }

    Ok(out)
}

fn differentiate_single_column(
    device: &mut dyn Device,
    tape: &mut Tape,
    base: &ParameterBinding,
    slot: usize,
    method: GradMethod,
    request: &JacobianRequest,
) -> QgradResult<Vec<f64>> {
    match method {
        GradMethod::None => Ok(vec![0.0; tape.output_dim]),
        GradMethod::Finite => {
            if request.order == 1 {
                let y0 = evaluate_scalars(device, tape, base)?;
                finite_diff_order1(device, tape, base, slot, request.h, &y0)
            } else {
                finite_diff_order2(device, tape, base, slot, request.h)
            }
        }
        GradMethod::Analytic => analytic_column(device, tape, base, slot),
    }
}
