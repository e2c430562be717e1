// =============================================================================
// qgrad-ops - Continuous-variable (Gaussian) gates and observables
// =============================================================================
// Table of Contents:
//   1. Displacement, PhaseRotation, Squeezing - single-mode Gaussian gates
//   2. QuadX, QuadP, QuadX2 - first-/second-order quadrature observables
//   3. Measurement helpers
// =============================================================================
// Purpose: A minimal single-mode CV operation set exercising the order-2
//          Heisenberg-picture differentiation rule. Each gate's symplectic
//          transform is expressed in the homogeneous phase-space basis
//          `[1, x, p]`; qgrad-core's gradient engine embeds this local
//          `3x3` matrix into the tape's full `(1+2W) x (1+2W)` space.
// =============================================================================

use std::sync::Arc;

use ndarray::{array, Array2};

use qgrad_core::descriptor::{Family, GradMethod, GradRecipe, ObservableDescriptor, OperationDescriptor, ReturnType};
use qgrad_core::error::QgradResult;
use qgrad_core::operation::Operation;
use qgrad_core::param::Param;
use qgrad_core::tracer;

// =============================================================================
// 1. Single-mode Gaussian gates
// =============================================================================

/// `D(r, phi)`: a phase-space translation by `(2r cos phi, 2r sin phi)`.
/// Affine, hence the homogeneous-basis representation rather than a plain
/// linear one.
#[derive(Debug)]
pub struct DisplacementGate;

impl OperationDescriptor for DisplacementGate {
    fn name(&self) -> &str {
        "Displacement"
    }
    fn family(&self) -> Family {
        Family::Cv
    }
    fn num_params(&self) -> usize {
        2
    }
    fn grad_method(&self) -> GradMethod {
        GradMethod::Analytic
    }
    fn supports_heisenberg(&self) -> bool {
        true
    }
    fn heisenberg_tr(&self, params: &[f64], _num_wires: usize, inverse: bool) -> Array2<f64> {
        let (r, phi) = (params[0], params[1]);
        let sign = if inverse { -1.0 } else { 1.0 };
        let dx = sign * 2.0 * r * phi.cos();
        let dp = sign * 2.0 * r * phi.sin();
        array![[1.0, 0.0, 0.0], [dx, 1.0, 0.0], [dp, 0.0, 1.0]]
    }
}

pub fn displacement(r: Param, phi: Param, wire: usize) -> QgradResult<()> {
    tracer::append_gate(Operation::gate(Arc::new(DisplacementGate), vec![wire], vec![r, phi]))
}

/// `R(phi)`: a phase-space rotation by `phi`.
#[derive(Debug)]
pub struct PhaseRotationGate;

impl OperationDescriptor for PhaseRotationGate {
    fn name(&self) -> &str {
        "PhaseRotation"
    }
    fn family(&self) -> Family {
        Family::Cv
    }
    fn num_params(&self) -> usize {
        1
    }
    fn grad_method(&self) -> GradMethod {
        GradMethod::Analytic
    }
    fn grad_recipe(&self, _param_idx: usize) -> Option<GradRecipe> {
        Some(GradRecipe { multiplier: 0.5, shift: std::f64::consts::FRAC_PI_2 })
    }
    fn supports_heisenberg(&self) -> bool {
        true
    }
    fn heisenberg_tr(&self, params: &[f64], _num_wires: usize, inverse: bool) -> Array2<f64> {
        let phi = if inverse { -params[0] } else { params[0] };
        let (c, s) = (phi.cos(), phi.sin());
        array![[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
    }
}

pub fn phase_rotation(phi: Param, wire: usize) -> QgradResult<()> {
    tracer::append_gate(Operation::gate(Arc::new(PhaseRotationGate), vec![wire], vec![phi]))
}

/// `S(r)`: squeezing along the `x`/`p` axes (zero squeezing angle).
#[derive(Debug)]
pub struct SqueezingGate;

impl OperationDescriptor for SqueezingGate {
    fn name(&self) -> &str {
        "Squeezing"
    }
    fn family(&self) -> Family {
        Family::Cv
    }
    fn num_params(&self) -> usize {
        1
    }
    fn grad_method(&self) -> GradMethod {
        GradMethod::Analytic
    }
    fn supports_heisenberg(&self) -> bool {
        true
    }
    fn heisenberg_tr(&self, params: &[f64], _num_wires: usize, inverse: bool) -> Array2<f64> {
        let r = if inverse { -params[0] } else { params[0] };
        array![[1.0, 0.0, 0.0], [0.0, (-r).exp(), 0.0], [0.0, 0.0, r.exp()]]
    }
}

pub fn squeezing(r: Param, wire: usize) -> QgradResult<()> {
    tracer::append_gate(Operation::gate(Arc::new(SqueezingGate), vec![wire], vec![r]))
}

// =============================================================================
// 2. Observables
// =============================================================================

#[derive(Debug)]
pub struct QuadXObservable;

impl ObservableDescriptor for QuadXObservable {
    fn name(&self) -> &str {
        "QuadX"
    }
    fn family(&self) -> Family {
        Family::Cv
    }
    fn num_params(&self) -> usize {
        0
    }
    fn ev_order(&self) -> Option<u8> {
        Some(1)
    }
    fn heisenberg_obs(&self, _num_wires: usize) -> Array2<f64> {
        array![[0.0, 1.0, 0.0]]
    }
    fn squared(&self) -> Option<Box<dyn ObservableDescriptor>> {
        Some(Box::new(QuadX2Observable))
    }
}

#[derive(Debug)]
pub struct QuadPObservable;

impl ObservableDescriptor for QuadPObservable {
    fn name(&self) -> &str {
        "QuadP"
    }
    fn family(&self) -> Family {
        Family::Cv
    }
    fn num_params(&self) -> usize {
        0
    }
    fn ev_order(&self) -> Option<u8> {
        Some(1)
    }
    fn heisenberg_obs(&self, _num_wires: usize) -> Array2<f64> {
        array![[0.0, 0.0, 1.0]]
    }
}

/// `x^2`, represented as the quadratic form `r^T Q r` with `r = [1, x, p]`.
#[derive(Debug)]
pub struct QuadX2Observable;

impl ObservableDescriptor for QuadX2Observable {
    fn name(&self) -> &str {
        "QuadX2"
    }
    fn family(&self) -> Family {
        Family::Cv
    }
    fn num_params(&self) -> usize {
        0
    }
    fn ev_order(&self) -> Option<u8> {
        Some(2)
    }
    fn heisenberg_obs(&self, _num_wires: usize) -> Array2<f64> {
        array![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]
    }
}

// =============================================================================
// 3. Measurement helpers
// =============================================================================

pub fn expval_quad_x(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(QuadXObservable), vec![wire], vec![], Some(ReturnType::Expectation)))
}

pub fn expval_quad_p(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(QuadPObservable), vec![wire], vec![], Some(ReturnType::Expectation)))
}

pub fn var_quad_x(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(QuadXObservable), vec![wire], vec![], Some(ReturnType::Variance)))
}

pub fn expval_quad_x2(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(QuadX2Observable), vec![wire], vec![], Some(ReturnType::Expectation)))
}
