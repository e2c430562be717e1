// =============================================================================
// qgrad-ops - Qubit gates and observables
// =============================================================================
// Table of Contents:
//   1. Rotation gates (RX, RY, RZ) - analytic, default grad_recipe
//   2. Fixed gates (Hadamard, Pauli X/Y/Z, CNOT) - no free parameter
//   3. Observables (Pauli X/Y/Z, Hermitian)
//   4. Measurement helpers
// =============================================================================
// Purpose: A minimal qubit operation/observable set grounded on the
//          teacher's gate catalogue (gate_operations.rs), re-expressed as
//          descriptors: this crate never touches amplitudes itself, it
//          only declares each gate's differentiability. The concrete
//          matrix math lives in the device backend (qgrad-refsim).
// =============================================================================

use std::sync::Arc;

use ndarray::Array2;

use qgrad_core::descriptor::{Family, GradMethod, ObservableDescriptor, OperationDescriptor, ReturnType};
use qgrad_core::error::QgradResult;
use qgrad_core::operation::Operation;
use qgrad_core::param::Param;
use qgrad_core::tracer;

// =============================================================================
// 1. Rotation gates
// =============================================================================

macro_rules! rotation_gate {
    ($struct_name:ident, $gate_name:literal, $ctor:ident) => {
        #[derive(Debug)]
        pub struct $struct_name;

        impl OperationDescriptor for $struct_name {
            fn name(&self) -> &str {
                $gate_name
            }
            fn family(&self) -> Family {
                Family::Qubit
            }
            fn num_params(&self) -> usize {
                1
            }
            fn grad_method(&self) -> GradMethod {
                GradMethod::Analytic
            }
        }

        pub fn $ctor(theta: Param, wire: usize) -> QgradResult<()> {
            tracer::append_gate(Operation::gate(Arc::new($struct_name), vec![wire], vec![theta]))
        }
    };
}

rotation_gate!(RxGate, "RX", rx);
rotation_gate!(RyGate, "RY", ry);
rotation_gate!(RzGate, "RZ", rz);

// =============================================================================
// 2. Fixed gates
// =============================================================================

macro_rules! fixed_single_qubit_gate {
    ($struct_name:ident, $gate_name:literal, $ctor:ident) => {
        #[derive(Debug)]
        pub struct $struct_name;

        impl OperationDescriptor for $struct_name {
            fn name(&self) -> &str {
                $gate_name
            }
            fn family(&self) -> Family {
                Family::Qubit
            }
            fn num_params(&self) -> usize {
                0
            }
            fn grad_method(&self) -> GradMethod {
                GradMethod::None
            }
        }

        pub fn $ctor(wire: usize) -> QgradResult<()> {
            tracer::append_gate(Operation::gate(Arc::new($struct_name), vec![wire], vec![]))
        }
    };
}

fixed_single_qubit_gate!(HadamardGate, "Hadamard", hadamard);
fixed_single_qubit_gate!(PauliXGate, "PauliX", pauli_x_gate);
fixed_single_qubit_gate!(PauliYGate, "PauliY", pauli_y_gate);
fixed_single_qubit_gate!(PauliZGate, "PauliZ", pauli_z_gate);

#[derive(Debug)]
pub struct CnotGate;

impl OperationDescriptor for CnotGate {
    fn name(&self) -> &str {
        "CNOT"
    }
    fn family(&self) -> Family {
        Family::Qubit
    }
    fn num_params(&self) -> usize {
        0
    }
    fn grad_method(&self) -> GradMethod {
        GradMethod::None
    }
}

pub fn cnot(control: usize, target: usize) -> QgradResult<()> {
    tracer::append_gate(Operation::gate(Arc::new(CnotGate), vec![control, target], vec![]))
}

// =============================================================================
// 3. Observables
// =============================================================================

macro_rules! pauli_observable {
    ($struct_name:ident, $obs_name:literal) => {
        #[derive(Debug)]
        pub struct $struct_name;

        impl ObservableDescriptor for $struct_name {
            fn name(&self) -> &str {
                $obs_name
            }
            fn family(&self) -> Family {
                Family::Qubit
            }
            fn num_params(&self) -> usize {
                0
            }
            // A Pauli observable is involutory (A^2 = I): the variance
            // shift rule's squared term is exactly zero, so `squared()`
            // keeps the trait default of `None`.
        }
    };
}

pauli_observable!(PauliXObservable, "PauliX");
pauli_observable!(PauliYObservable, "PauliY");
pauli_observable!(PauliZObservable, "PauliZ");

/// An arbitrary real-symmetric observable. The matrix is not itself a
/// differentiable parameter (it has no associated `ParameterSlot`); it is
/// carried as `Fixed` entries in the operation's own `params`, flattened
/// in row-major order, so the device can reconstruct it without a
/// separate channel across the `Device` trait boundary.
#[derive(Debug, Clone)]
pub struct HermitianObservable {
    dim: usize,
}

impl ObservableDescriptor for HermitianObservable {
    fn name(&self) -> &str {
        "Hermitian"
    }
    fn family(&self) -> Family {
        Family::Qubit
    }
    fn num_params(&self) -> usize {
        self.dim * self.dim
    }
    fn squared(&self) -> Option<Box<dyn ObservableDescriptor>> {
        Some(Box::new(SquaredHermitianObservable { dim: self.dim }))
    }
}

#[derive(Debug, Clone)]
struct SquaredHermitianObservable {
    dim: usize,
}

impl ObservableDescriptor for SquaredHermitianObservable {
    fn name(&self) -> &str {
        "Hermitian"
    }
    fn family(&self) -> Family {
        Family::Qubit
    }
    fn num_params(&self) -> usize {
        self.dim * self.dim
    }
}

fn flatten_matrix(matrix: &Array2<f64>) -> Vec<Param> {
    matrix.iter().map(|&v| Param::Fixed(v)).collect()
}

// =============================================================================
// 4. Measurement helpers
// =============================================================================

pub fn expval_pauli_x(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(PauliXObservable), vec![wire], vec![], Some(ReturnType::Expectation)))
}

pub fn expval_pauli_y(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(PauliYObservable), vec![wire], vec![], Some(ReturnType::Expectation)))
}

pub fn expval_pauli_z(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(PauliZObservable), vec![wire], vec![], Some(ReturnType::Expectation)))
}

pub fn var_pauli_z(wire: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(Arc::new(PauliZObservable), vec![wire], vec![], Some(ReturnType::Variance)))
}

pub fn sample_pauli_z(wire: usize, shots: usize) -> QgradResult<Operation> {
    tracer::append_observable(Operation::observable(
        Arc::new(PauliZObservable),
        vec![wire],
        vec![],
        Some(ReturnType::Sample(shots)),
    ))
}

pub fn expval_hermitian(matrix: Array2<f64>, wire: usize) -> QgradResult<Operation> {
    let dim = matrix.nrows();
    let params = flatten_matrix(&matrix);
    tracer::append_observable(Operation::observable(
        Arc::new(HermitianObservable { dim }),
        vec![wire],
        params,
        Some(ReturnType::Expectation),
    ))
}
