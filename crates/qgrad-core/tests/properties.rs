// =============================================================================
// qgrad-core - Invariant property tests
// =============================================================================
// Table of Contents:
//   1. Shared circuits
//   2. Invariants 1-8
// =============================================================================
// Purpose: Property tests for the eight tracing/gradient invariants,
//          exercised against qgrad-ops' qubit gate set and
//          qgrad-refsim's dense state-vector device.
// =============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;

use qgrad_core::error::QgradResult;
use qgrad_core::node::QuantumNode;
use qgrad_core::operation::Operation;
use qgrad_core::param::{ArgTree, Param};
use qgrad_ops::qubit::{expval_pauli_z, rx, rz, var_pauli_z};
use qgrad_refsim::ReferenceQubitDevice;

// =============================================================================
// 1. Shared circuits
// =============================================================================

/// `RX(theta, 0); RZ(phi, 0); RX(theta, 0); return <Z0>` - shares one
/// slot (`theta`) across two gate sites, the other (`phi`) across one.
fn fanout_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    rz(params[1].clone(), 0)?;
    rx(params[0].clone(), 0)?;
    let z0 = expval_pauli_z(0)?;
    Ok(vec![z0])
}

fn single_param_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    let z0 = expval_pauli_z(0)?;
    Ok(vec![z0])
}

fn with_unused_second_param(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    let z0 = expval_pauli_z(0)?;
    Ok(vec![z0])
}

fn var_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    rx(params[0].clone(), 0)?;
    let v = var_pauli_z(0)?;
    Ok(vec![v])
}

// =============================================================================
// 2. Invariants
// =============================================================================

proptest! {
    /// 1. Re-running evaluate(args) twice returns identical outputs.
    #[test]
    fn evaluate_is_deterministic(theta in -3.0f64..3.0, phi in -3.0f64..3.0) {
        let device = Box::new(ReferenceQubitDevice::new(1));
        let mut node = QuantumNode::new(fanout_circuit, device);
        let args = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(phi)]);

        let out1 = node.evaluate(&args, &HashMap::new()).unwrap();
        let out2 = node.evaluate(&args, &HashMap::new()).unwrap();
        prop_assert_eq!(out1.as_scalar(), out2.as_scalar());
    }

    /// 2. Tape observable order equals the return-statement order.
    #[test]
    fn observable_tape_order_matches_return_order(theta in -3.0f64..3.0, swap in any::<bool>()) {
        let first_wire = if swap { 1usize } else { 0usize };
        let second_wire = if swap { 0usize } else { 1usize };
        let builder = move |params: &[Param]| -> QgradResult<Vec<Operation>> {
            rx(params[0].clone(), 0)?;
            let a = expval_pauli_z(first_wire)?;
            let b = expval_pauli_z(second_wire)?;
            Ok(vec![a, b])
        };

        let device = Box::new(ReferenceQubitDevice::new(2));
        let mut node = QuantumNode::new(builder, device);
        node.evaluate(&ArgTree::Scalar(theta), &HashMap::new()).unwrap();

        let tape = node.tape().unwrap();
        prop_assert_eq!(tape.observables[0].wires[0], first_wire);
        prop_assert_eq!(tape.observables[1].wires[0], second_wire);
    }

    /// 3. var_ops[k] includes every (op_idx, param_idx) site where slot k appears.
    #[test]
    fn var_ops_tracks_every_use_site_of_a_shared_slot(theta in -3.0f64..3.0, phi in -3.0f64..3.0) {
        let device = Box::new(ReferenceQubitDevice::new(1));
        let mut node = QuantumNode::new(fanout_circuit, device);
        let args = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(phi)]);
        node.evaluate(&args, &HashMap::new()).unwrap();

        let tape = node.tape().unwrap();
        prop_assert_eq!(tape.var_ops.get(&0).map(|s| s.len()), Some(2));
        prop_assert_eq!(tape.var_ops.get(&1).map(|s| s.len()), Some(1));
    }

    /// 4. After any jacobian call, every op.params[p] equals its original slot.
    #[test]
    fn jacobian_leaves_no_residual_substitution(theta in -3.0f64..3.0, phi in -3.0f64..3.0) {
        let device = Box::new(ReferenceQubitDevice::new(1));
        let mut node = QuantumNode::new(fanout_circuit, device);
        let args = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(phi)]);
        node.evaluate(&args, &HashMap::new()).unwrap();

        let before: Vec<Param> = node.tape().unwrap().gates.iter().flat_map(|g| g.params.clone()).collect();
        node.jacobian(&args, None, "analytic", 0.0, 1).unwrap();
        let after: Vec<Param> = node.tape().unwrap().gates.iter().flat_map(|g| g.params.clone()).collect();

        prop_assert_eq!(before, after);
    }

    /// 5. Finite-difference (order 2) agrees with analytic to O(h^2).
    #[test]
    fn finite_diff_agrees_with_analytic(theta in -1.5f64..1.5, phi in -1.5f64..1.5) {
        let device = Box::new(ReferenceQubitDevice::new(1));
        let mut node = QuantumNode::new(fanout_circuit, device);
        let args = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(phi)]);
        node.evaluate(&args, &HashMap::new()).unwrap();

        let analytic = node.jacobian(&args, None, "analytic", 0.0, 1).unwrap();
        let finite = node.jacobian(&args, None, "finite", 1e-3, 2).unwrap();

        for col in 0..2 {
            let diff = (analytic.data[[0, col]] - finite.data[[0, col]]).abs();
            prop_assert!(diff < 1e-4, "col {col}: analytic {} vs finite {}", analytic.data[[0, col]], finite.data[[0, col]]);
        }
    }

    /// 6. Variance shift rule for an involutory observable (A^2 = I):
    /// d/dtheta Var(A) = -2 <A> d<A>/dtheta.
    #[test]
    fn variance_shift_rule_matches_expectation_identity(theta in -1.5f64..1.5) {
        let args = ArgTree::Scalar(theta);

        let device = Box::new(ReferenceQubitDevice::new(1));
        let mut var_node = QuantumNode::new(var_circuit, device);
        var_node.evaluate(&args, &HashMap::new()).unwrap();
        let var_jac = var_node.jacobian(&args, None, "analytic", 0.0, 1).unwrap();

        let device2 = Box::new(ReferenceQubitDevice::new(1));
        let mut mean_node = QuantumNode::new(single_param_circuit, device2);
        let mean_out = mean_node.evaluate(&args, &HashMap::new()).unwrap();
        let mean = mean_out.as_scalar().unwrap();
        let mean_jac = mean_node.jacobian(&args, None, "analytic", 0.0, 1).unwrap();

        let expected = -2.0 * mean * mean_jac.data[[0, 0]];
        prop_assert!((var_jac.data[[0, 0]] - expected).abs() < 1e-9);
    }

    /// 7. An unused parameter produces a zero column and leaves other
    /// columns unchanged.
    #[test]
    fn unused_parameter_yields_zero_column(theta in -1.5f64..1.5, extra in -1.5f64..1.5) {
        let device1 = Box::new(ReferenceQubitDevice::new(1));
        let mut node1 = QuantumNode::new(single_param_circuit, device1);
        let args1 = ArgTree::Scalar(theta);
        node1.evaluate(&args1, &HashMap::new()).unwrap();
        let jac1 = node1.jacobian(&args1, None, "analytic", 0.0, 1).unwrap();

        let device2 = Box::new(ReferenceQubitDevice::new(1));
        let mut node2 = QuantumNode::new(with_unused_second_param, device2);
        let args2 = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(extra)]);
        node2.evaluate(&args2, &HashMap::new()).unwrap();
        let jac2 = node2.jacobian(&args2, None, "best", 1e-3, 1).unwrap();

        prop_assert!((jac1.data[[0, 0]] - jac2.data[[0, 0]]).abs() < 1e-9);
        prop_assert!(jac2.data[[0, 1]].abs() < 1e-12);
    }

    /// 8. Retrace is triggered iff the flat length of args changes or
    /// cache=false.
    #[test]
    fn retrace_triggers_only_on_flat_length_change_or_cache_disabled(theta in -1.5f64..1.5, extra in -1.5f64..1.5, cache in any::<bool>()) {
        let counter = Rc::new(RefCell::new(0usize));
        let counter_for_builder = counter.clone();
        let builder = move |params: &[Param]| -> QgradResult<Vec<Operation>> {
            *counter_for_builder.borrow_mut() += 1;
            rx(params[0].clone(), 0)?;
            let z0 = expval_pauli_z(0)?;
            Ok(vec![z0])
        };

        let device = Box::new(ReferenceQubitDevice::new(1));
        let mut node = QuantumNode::new(builder, device).with_cache(cache);

        let args_a = ArgTree::Scalar(theta);
        node.evaluate(&args_a, &HashMap::new()).unwrap();
        let after_first = *counter.borrow();
        node.evaluate(&args_a, &HashMap::new()).unwrap();
        let after_second = *counter.borrow();

        if cache {
            prop_assert_eq!(after_second, after_first);
        } else {
            prop_assert_eq!(after_second, after_first + 1);
        }

        let args_b = ArgTree::Seq(vec![ArgTree::Scalar(theta), ArgTree::Scalar(extra)]);
        node.evaluate(&args_b, &HashMap::new()).unwrap();
        let after_third = *counter.borrow();
        prop_assert!(after_third > after_second);
    }
}
