// =============================================================================
// qgrad-core - Gate and Jacobian benchmarks
// =============================================================================
// Table of Contents:
//   1. Benchmark circuits
//   2. Criterion harness
// =============================================================================
// Purpose: Tracks the cost of tracing/evaluating a circuit versus
//          differentiating it, across a small and a wider qubit register,
//          using the dense reference simulator.
// =============================================================================

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use qgrad_core::error::QgradResult;
use qgrad_core::node::QuantumNode;
use qgrad_core::operation::Operation;
use qgrad_core::param::{ArgTree, Param};
use qgrad_ops::qubit::{cnot, expval_pauli_z, hadamard, rx};
use qgrad_refsim::ReferenceQubitDevice;

// =============================================================================
// 1. Benchmark circuits
// =============================================================================

/// A ladder of `num_wires - 1` `CNOT`s with a tunable `RX` on every wire,
/// returning `<Z>` on the last wire.
fn ladder_circuit(num_wires: usize) -> impl Fn(&[Param]) -> QgradResult<Vec<Operation>> {
    move |params: &[Param]| {
        hadamard(0)?;
        for wire in 0..num_wires {
            rx(params[wire].clone(), wire)?;
        }
        for wire in 0..num_wires - 1 {
            cnot(wire, wire + 1)?;
        }
        let z = expval_pauli_z(num_wires - 1)?;
        Ok(vec![z])
    }
}

// =============================================================================
// 2. Criterion harness
// =============================================================================

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    for num_wires in [2usize, 4, 6] {
        group.bench_with_input(BenchmarkId::from_parameter(num_wires), &num_wires, |b, &num_wires| {
            let device = Box::new(ReferenceQubitDevice::new(num_wires));
            let mut node = QuantumNode::new(ladder_circuit(num_wires), device);
            let args = ArgTree::Seq((0..num_wires).map(|i| ArgTree::Scalar(0.1 * i as f64)).collect());
            b.iter(|| node.evaluate(&args, &HashMap::new()).unwrap());
        });
    }
    group.finish();
}

fn bench_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian");
    for num_wires in [2usize, 4, 6] {
        group.bench_with_input(BenchmarkId::from_parameter(num_wires), &num_wires, |b, &num_wires| {
            let device = Box::new(ReferenceQubitDevice::new(num_wires));
            let mut node = QuantumNode::new(ladder_circuit(num_wires), device);
            let args = ArgTree::Seq((0..num_wires).map(|i| ArgTree::Scalar(0.1 * i as f64)).collect());
            node.evaluate(&args, &HashMap::new()).unwrap();
            b.iter(|| node.jacobian(&args, None, "analytic", 0.0, 1).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_jacobian);
criterion_main!(benches);
