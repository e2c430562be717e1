// =============================================================================
// qgrad-core - End-to-end continuous-variable scenarios
// =============================================================================
// Table of Contents:
//   1. S5 - mixing CV and qubit operations is rejected
//   2. Order-2 Heisenberg rule vs finite difference
// =============================================================================

use std::collections::HashMap;

use qgrad_core::error::{QgradError, QgradResult, TraceError};
use qgrad_core::node::QuantumNode;
use qgrad_core::operation::Operation;
use qgrad_core::param::{ArgTree, Param};
use qgrad_ops::cv::{displacement, expval_quad_p, expval_quad_x, expval_quad_x2, phase_rotation};
use qgrad_ops::qubit::{expval_pauli_z, rx};
use qgrad_refsim::{ReferenceGaussianDevice, ReferenceQubitDevice};

// =============================================================================
// 1. S5 - mixing CV and qubit operations is rejected
// =============================================================================

#[test]
fn s5_mixing_cv_and_qubit_operations_is_rejected() {
    fn mixed_family_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
        rx(params[0].clone(), 0)?;
        displacement(Param::Fixed(0.1), Param::Fixed(0.0), 0)?;
        let z0 = expval_pauli_z(0)?;
        Ok(vec![z0])
    }

    let device = Box::new(ReferenceQubitDevice::new(1));
    let mut node = QuantumNode::new(mixed_family_circuit, device);
    let result = node.evaluate(&ArgTree::Scalar(0.2), &HashMap::new());

    assert!(matches!(result, Err(QgradError::Trace(TraceError::MixedFamily))));
}

// =============================================================================
// 2. Order-2 Heisenberg rule vs finite difference
// =============================================================================

/// `Displacement(0.8, 0, wire 0); PhaseRotation(phi, wire 0); return <x>,
/// <p>, <x^2>`. The `<x^2>` return forces `phi`'s gate onto the order-2
/// Heisenberg path rather than plain parameter-shift.
fn gaussian_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    displacement(Param::Fixed(0.8), Param::Fixed(0.0), 0)?;
    phase_rotation(params[0].clone(), 0)?;
    let x = expval_quad_x(0)?;
    let p = expval_quad_p(0)?;
    let x2 = expval_quad_x2(0)?;
    Ok(vec![x, p, x2])
}

#[test]
fn phase_rotation_uses_the_order2_heisenberg_rule_when_x_squared_is_returned() {
    let device = Box::new(ReferenceGaussianDevice::new(1));
    let mut node = QuantumNode::new(gaussian_circuit, device);
    let phi = ArgTree::Scalar(std::f64::consts::FRAC_PI_4);
    node.evaluate(&phi, &HashMap::new()).unwrap();

    let tape = node.tape().unwrap();
    assert!(!tape.heisenberg_order2_ops.is_empty(), "phase rotation's own op index must be marked for order-2 treatment");
}

#[test]
fn cv_analytic_jacobian_agrees_with_finite_difference() {
    let phi = ArgTree::Scalar(0.37);

    let device_a = Box::new(ReferenceGaussianDevice::new(1));
    let mut node_a = QuantumNode::new(gaussian_circuit, device_a);
    node_a.evaluate(&phi, &HashMap::new()).unwrap();
    let analytic = node_a.jacobian(&phi, None, "analytic", 0.0, 2).unwrap();

    let device_b = Box::new(ReferenceGaussianDevice::new(1));
    let mut node_b = QuantumNode::new(gaussian_circuit, device_b);
    node_b.evaluate(&phi, &HashMap::new()).unwrap();
    let finite = node_b.jacobian(&phi, None, "finite", 1e-4, 2).unwrap();

    let (rows, cols) = analytic.shape();
    assert_eq!((rows, cols), (3, 1));
    for row in 0..rows {
        let diff = (analytic.data[[row, 0]] - finite.data[[row, 0]]).abs();
        assert!(diff < 1e-4, "row {row}: analytic {} vs finite {}", analytic.data[[row, 0]], finite.data[[row, 0]]);
    }
}
