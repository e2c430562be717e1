// =============================================================================
// qgrad-demos - Bell state and single-mode Gaussian walkthrough
// =============================================================================
// Table of Contents:
//   1. A parameterized Bell-state qubit circuit
//   2. A single-mode Gaussian (CV) circuit
//   3. main - evaluate and differentiate both
// =============================================================================
// Purpose: Demonstrates the full QuantumNode workflow end to end: trace a
//          circuit-building function, evaluate it on a reference device,
//          and compute a Jacobian via parameter-shift (qubit) and the
//          order-2 Heisenberg rule (CV).
// =============================================================================

use std::collections::HashMap;

use qgrad_core::device::QueryOutput;
use qgrad_core::error::QgradResult;
use qgrad_core::node::{NodeOutput, QuantumNode};
use qgrad_core::operation::Operation;
use qgrad_core::param::{ArgTree, Param};
use qgrad_ops::cv::{displacement, expval_quad_p, expval_quad_x, expval_quad_x2, phase_rotation};
use qgrad_ops::qubit::{cnot, expval_pauli_z, hadamard, rx};
use qgrad_refsim::{ReferenceGaussianDevice, ReferenceQubitDevice};

// =============================================================================
// 1. Bell-state qubit circuit
// =============================================================================

/// `H(0)`, a tunable `RX(theta)` on wire 1, then `CNOT(0, 1)`, returning
/// `<Z0>` and `<Z1>`. At `theta = 0` this is the textbook Bell state,
/// where both expectations vanish.
fn bell_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    hadamard(0)?;
    rx(params[0].clone(), 1)?;
    cnot(0, 1)?;
    let z0 = expval_pauli_z(0)?;
    let z1 = expval_pauli_z(1)?;
    Ok(vec![z0, z1])
}

// =============================================================================
// 2. Single-mode Gaussian circuit
// =============================================================================

/// A displacement followed by a tunable phase rotation, returning `<x>`,
/// `<p>`, and `<x^2>`. The second-order return forces the order-2
/// Heisenberg rule rather than the first-order parameter-shift path.
fn gaussian_circuit(params: &[Param]) -> QgradResult<Vec<Operation>> {
    displacement(Param::Fixed(0.8), Param::Fixed(0.0), 0)?;
    phase_rotation(params[0].clone(), 0)?;
    let x = expval_quad_x(0)?;
    let p = expval_quad_p(0)?;
    let x2 = expval_quad_x2(0)?;
    Ok(vec![x, p, x2])
}

fn print_output(label: &str, output: &NodeOutput) {
    match output {
        NodeOutput::Scalar(v) => println!("   {label} = {v:.6}"),
        NodeOutput::Array(values) => {
            for (i, value) in values.iter().enumerate() {
                match value {
                    QueryOutput::Scalar(v) => println!("   {label}[{i}] = {v:.6}"),
                    QueryOutput::Sample(samples) => println!("   {label}[{i}] = {samples:?} (samples)"),
                }
            }
        }
    }
}

fn main() -> QgradResult<()> {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║              qgrad - Bell State and Gaussian Walkthrough          ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // =========================================================================
    // Step 1: Trace and evaluate the Bell-state circuit
    // =========================================================================
    println!("📐 Step 1: Tracing the parameterized Bell-state circuit");
    println!("   - hadamard(0), rx(theta, 1), cnot(0, 1)");
    println!("   - returns <Z0>, <Z1>");
    println!();

    let device = Box::new(ReferenceQubitDevice::new(2));
    let mut bell_node = QuantumNode::new(bell_circuit, device);

    let theta = ArgTree::Scalar(0.0);
    let bell_output = bell_node.evaluate(&theta, &HashMap::new())?;
    print_output("bell", &bell_output);
    println!();

    let tape = bell_node.tape().expect("evaluate just installed a tape");
    println!("   tape: {} gates, {} observables, family = {:?}", tape.gates.len(), tape.observables.len(), tape.family);
    println!();

    // =========================================================================
    // Step 2: Differentiate it via parameter-shift
    // =========================================================================
    println!("⚡ Step 2: Computing the Jacobian with parameter-shift");
    println!();

    let jac = bell_node.jacobian(&theta, None, "analytic", 0.0, 1)?;
    let (rows, cols) = jac.shape();
    println!("   Jacobian shape: {rows} x {cols}");
    for row in 0..rows {
        for col in 0..cols {
            println!("   d<obs{row}>/d(theta{col}) = {:.6}", jac.data[[row, col]]);
        }
    }
    println!();

    // =========================================================================
    // Step 3: Trace and evaluate the Gaussian circuit
    // =========================================================================
    println!("📐 Step 3: Tracing the single-mode Gaussian circuit");
    println!("   - displacement(0.8, 0.0, wire 0), phase_rotation(phi, wire 0)");
    println!("   - returns <x>, <p>, <x^2>");
    println!();

    let device = Box::new(ReferenceGaussianDevice::new(1));
    let mut gaussian_node = QuantumNode::new(gaussian_circuit, device);

    let phi = ArgTree::Scalar(std::f64::consts::FRAC_PI_4);
    let gaussian_output = gaussian_node.evaluate(&phi, &HashMap::new())?;
    print_output("gaussian", &gaussian_output);
    println!();

    // =========================================================================
    // Step 4: Differentiate it via the order-2 Heisenberg rule
    // =========================================================================
    println!("⚡ Step 4: Computing the Jacobian with the order-2 Heisenberg rule");
    println!();

    let jac = gaussian_node.jacobian(&phi, None, "analytic", 0.0, 2)?;
    let (rows, cols) = jac.shape();
    println!("   Jacobian shape: {rows} x {cols}");
    for row in 0..rows {
        for col in 0..cols {
            println!("   d<quad{row}>/d(phi{col}) = {:.6}", jac.data[[row, col]]);
        }
    }
    println!();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                       Demo Complete                               ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  ✓ traced a qubit circuit and a CV circuit                        ║");
    println!("║  ✓ evaluated both on their reference devices                      ║");
    println!("║  ✓ differentiated with parameter-shift and the Heisenberg rule    ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    Ok(())
}
