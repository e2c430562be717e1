// =============================================================================
// qgrad-core - End-to-end qubit circuit scenarios
// =============================================================================
// Table of Contents:
//   1. S1 - shared-parameter fan-out, closed-form Jacobian
//   2. S2 - argument-shape equivalence
//   3. S3 - keyword placeholder excluded from the Jacobian
//   4. S4 - wrong return order is rejected
//   5. S6 - differentiating a sample observable is forbidden
// =============================================================================

use std::collections::HashMap;

use qgrad_core::error::{QgradError, QgradResult, TraceError};
use qgrad_core::node::QuantumNode;
use qgrad_core::operation::Operation;
use qgrad_core::param::{ArgTree, Param, ParameterSlot};
use qgrad_ops::qubit::{cnot, expval_pauli_y, expval_pauli_z, hadamard, rx, ry, rz, sample_pauli_z};
use qgrad_refsim::ReferenceQubitDevice;

// =============================================================================
// 1. S1 - shared-parameter fan-out
// =============================================================================

/// `RX(theta, 0); RZ(phi, 0); RX(theta, 0); return <Z0>`. `theta` drives
/// two gate sites; the tape's single free-parameter Jacobian column for
/// `theta` must sum both sites' contributions.
fn fanout_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    rz(params[1].clone(), 0)?;
    rx(params[0].clone(), 0)?;
    let z0 = expval_pauli_z(0)?;
    Ok(vec![z0])
}

#[test]
fn s1_fanout_circuit_matches_closed_form_expectation_and_gradient() {
    let theta = std::f64::consts::FRAC_PI_4;
    let phi = 0.7;

    let device = Box::new(ReferenceQubitDevice::new(1));
    let mut node = QuantumNode::new(fanout_circuit, device);
    let args = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(phi)]);

    let out = node.evaluate(&args, &HashMap::new()).unwrap();
    let value = out.as_scalar().unwrap();

    // Closed form for RX(theta) RZ(phi) RX(theta) |0>, <Z>, under the
    // RX(theta) = exp(-i theta X / 2), RZ(phi) = exp(-i phi Z / 2) convention.
    let expected = theta.cos().powi(2) - theta.sin().powi(2) * phi.cos();
    assert!((value - expected).abs() < 1e-9, "value {value} vs expected {expected}");

    let jac = node.jacobian(&args, None, "analytic", 0.0, 1).unwrap();
    let expected_d_theta = -(2.0 * theta).sin() * (1.0 + phi.cos());
    let expected_d_phi = theta.sin().powi(2) * phi.sin();
    assert!((jac.data[[0, 0]] - expected_d_theta).abs() < 1e-6, "d/dtheta {} vs {}", jac.data[[0, 0]], expected_d_theta);
    assert!((jac.data[[0, 1]] - expected_d_phi).abs() < 1e-6, "d/dphi {} vs {}", jac.data[[0, 1]], expected_d_phi);
}

// =============================================================================
// 2. S2 - argument-shape equivalence
// =============================================================================

/// `RX(x,0); RY(y,0); RZ(z,0); CNOT(0,1); return <Z0>, <Y1>`. Three
/// differently-shaped `ArgTree`s carrying the same flattened values must
/// evaluate to the same output.
fn rot_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    ry(params[1].clone(), 0)?;
    rz(params[2].clone(), 0)?;
    cnot(0, 1)?;
    let z0 = expval_pauli_z(0)?;
    let y1 = expval_pauli_y(1)?;
    Ok(vec![z0, y1])
}

#[test]
fn s2_argument_shape_does_not_affect_output() {
    let (x, y, z) = (0.3, -0.6, 1.1);

    let all_scalar = ArgTree::Seq(vec![ArgTree::Scalar(x), ArgTree::Scalar(y), ArgTree::Scalar(z)]);
    let grouped = ArgTree::Seq(vec![ArgTree::Scalar(x), ArgTree::Seq(vec![ArgTree::Scalar(y), ArgTree::Scalar(z)])]);
    let nested = ArgTree::Seq(vec![ArgTree::Seq(vec![ArgTree::Scalar(x), ArgTree::Scalar(y), ArgTree::Scalar(z)])]);

    let mut outputs = Vec::new();
    for args in [&all_scalar, &grouped, &nested] {
        let device = Box::new(ReferenceQubitDevice::new(2));
        let mut node = QuantumNode::new(rot_circuit, device);
        let out = node.evaluate(args, &HashMap::new()).unwrap();
        outputs.push(out);
    }

    let first = outputs[0].as_scalar();
    assert!(first.is_none(), "two returned observables must stay an array output");
    for out in &outputs[1..] {
        match (&outputs[0], out) {
            (qgrad_core::node::NodeOutput::Array(a), qgrad_core::node::NodeOutput::Array(b)) => {
                assert_eq!(a.len(), b.len());
                for (va, vb) in a.iter().zip(b.iter()) {
                    match (va, vb) {
                        (qgrad_core::device::QueryOutput::Scalar(sa), qgrad_core::device::QueryOutput::Scalar(sb)) => {
                            assert!((sa - sb).abs() < 1e-12, "{sa} vs {sb}");
                        }
                        _ => panic!("expected scalar observables"),
                    }
                }
            }
            _ => panic!("expected array outputs"),
        }
    }
}

// =============================================================================
// 3. S3 - keyword placeholder excluded from the Jacobian
// =============================================================================

/// `RX(theta, 0); RZ(input_state, 0); return <Z0>`, where `input_state`
/// is a keyword placeholder, not a positional free parameter.
fn keyword_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    rz(Param::Slot(ParameterSlot::keyword(0, "input_state")), 0)?;
    let z0 = expval_pauli_z(0)?;
    Ok(vec![z0])
}

#[test]
fn s3_keyword_placeholder_is_excluded_from_the_jacobian() {
    let device = Box::new(ReferenceQubitDevice::new(1));
    let mut default_kwargs = HashMap::new();
    default_kwargs.insert("input_state".to_string(), vec![0.2]);
    let mut node = QuantumNode::new(keyword_circuit, device).with_default_kwargs(default_kwargs);

    let theta = ArgTree::Scalar(0.5);
    node.evaluate(&theta, &HashMap::new()).unwrap();

    let tape = node.tape().unwrap();
    // Only the positional `theta` slot is a free parameter; the keyword
    // slot never enters `var_ops` under its own addressing.
    assert_eq!(tape.var_ops.get(&0).unwrap().len(), 1);

    let jac = node.jacobian(&theta, None, "analytic", 0.0, 1).unwrap();
    let (rows, cols) = jac.shape();
    assert_eq!((rows, cols), (1, 1));

    // Changing the keyword value changes the evaluated output...
    let mut other_kwargs = HashMap::new();
    other_kwargs.insert("input_state".to_string(), vec![1.3]);
    let out_a = node.evaluate(&theta, &HashMap::new()).unwrap().as_scalar().unwrap();
    let out_b = node.evaluate(&theta, &other_kwargs).unwrap().as_scalar().unwrap();
    assert!((out_a - out_b).abs() > 1e-6, "keyword value must affect the circuit");

    // ...but the Jacobian's shape, and which slot it differentiates, is unchanged.
    let jac_b = node.jacobian(&theta, None, "analytic", 0.0, 1).unwrap();
    assert_eq!(jac_b.shape(), (1, 1));
}

// =============================================================================
// 4. S4 - wrong return order is rejected
// =============================================================================

#[test]
fn s4_observables_must_be_returned_in_queued_order() {
    fn wrong_order_circuit(_params: &[Param]) -> QgradResult<Vec<Operation>> {
        hadamard(0)?;
        let z0 = expval_pauli_z(0)?;
        let z1 = expval_pauli_z(1)?;
        Ok(vec![z1, z0])
    }

    let device = Box::new(ReferenceQubitDevice::new(2));
    let mut node = QuantumNode::new(wrong_order_circuit, device);
    let result = node.evaluate(&ArgTree::Scalar(0.0), &HashMap::new());

    assert!(matches!(result, Err(QgradError::Trace(TraceError::ReturnOrderMismatch))));
}

// =============================================================================
// 5. S6 - differentiating a sample observable is forbidden
// =============================================================================

#[test]
fn s6_jacobian_of_a_sample_observable_is_rejected() {
    fn sample_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
        rx(params[0].clone(), 0)?;
        let s = sample_pauli_z(0, 100)?;
        Ok(vec![s])
    }

    let device = Box::new(ReferenceQubitDevice::new(1));
    let mut node = QuantumNode::new(sample_circuit, device);
    let args = ArgTree::Scalar(0.3);

    // Plain evaluation succeeds; only differentiation is forbidden.
    node.evaluate(&args, &HashMap::new()).unwrap();

    let result = node.jacobian(&args, None, "analytic", 0.0, 1);
    assert!(matches!(result, Err(QgradError::Trace(TraceError::DifferentiatingSample { .. }))));
}
