// =============================================================================
// qgrad-refsim - Dense state-vector qubit device
// =============================================================================
// Table of Contents:
//   1. ReferenceQubitDevice - state and construction
//   2. Gate application
//   3. Device impl
// =============================================================================
// Purpose: A from-scratch dense amplitude simulator for the qubit gate and
//          observable set in qgrad-ops::qubit. Grounded on the amplitude
//          bit-masking technique used throughout the teacher's state
//          backend (single-qubit operators act on amplitude pairs that
//          differ only in the target bit; a two-qubit gate permutes or
//          mixes amplitude quadruples).
// =============================================================================

use num_complex::Complex64;
use tracing::trace;

use qgrad_core::device::Device;
use qgrad_core::error::{DeviceError, QgradResult};

const QUBIT_OPERATIONS: &[&str] = &["RX", "RY", "RZ", "Hadamard", "PauliX", "PauliY", "PauliZ", "CNOT"];
const QUBIT_OBSERVABLES: &[&str] = &["PauliX", "PauliY", "PauliZ", "Hermitian"];

// =============================================================================
// 1. ReferenceQubitDevice
// =============================================================================

/// A dense `2^num_wires`-amplitude statevector simulator.
pub struct ReferenceQubitDevice {
    num_wires: usize,
    amplitudes: Vec<Complex64>,
    operations: Vec<String>,
    observables: Vec<String>,
}

impl ReferenceQubitDevice {
    pub fn new(num_wires: usize) -> Self {
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); 1usize << num_wires];
        amplitudes[0] = Complex64::new(1.0, 0.0);
        Self {
            num_wires,
            amplitudes,
            operations: QUBIT_OPERATIONS.iter().map(|s| s.to_string()).collect(),
            observables: QUBIT_OBSERVABLES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn target_mask(&self, wire: usize) -> usize {
        1usize << (self.num_wires - 1 - wire)
    }

    // -------------------------------------------------------------------
    // 2. Gate application
    // -------------------------------------------------------------------

    /// Applies a 2x2 unitary to the amplitude pairs that differ only in
    /// `wire`'s bit.
    fn apply_single_qubit(&mut self, wire: usize, matrix: [[Complex64; 2]; 2]) {
        let mask = self.target_mask(wire);
        let dim = self.amplitudes.len();
        for i in 0..dim {
            if i & mask == 0 {
                let j = i | mask;
                let c0 = self.amplitudes[i];
                let c1 = self.amplitudes[j];
                self.amplitudes[i] = matrix[0][0] * c0 + matrix[0][1] * c1;
                self.amplitudes[j] = matrix[1][0] * c0 + matrix[1][1] * c1;
            }
        }
    }

    /// `CNOT` is a computational-basis permutation: flip `target`'s bit
    /// wherever `control`'s bit is set.
    fn apply_cnot(&mut self, control: usize, target: usize) {
        let control_mask = self.target_mask(control);
        let target_mask = self.target_mask(target);
        let dim = self.amplitudes.len();
        let mut permuted = self.amplitudes.clone();
        for i in 0..dim {
            let j = if i & control_mask != 0 { i ^ target_mask } else { i };
            permuted[j] = self.amplitudes[i];
        }
        self.amplitudes = permuted;
    }

    /// `<psi| matrix |psi>` restricted to the single-qubit subspace
    /// spanned by the amplitude pairs differing only in `wire`'s bit.
    fn expectation_single_qubit(&self, wire: usize, matrix: [[Complex64; 2]; 2]) -> f64 {
        let mask = self.target_mask(wire);
        let mut acc = Complex64::new(0.0, 0.0);
        for (i, &c0) in self.amplitudes.iter().enumerate() {
            if i & mask == 0 {
                let j = i | mask;
                let c1 = self.amplitudes[j];
                acc += c0.conj() * matrix[0][0] * c0
                    + c0.conj() * matrix[0][1] * c1
                    + c1.conj() * matrix[1][0] * c0
                    + c1.conj() * matrix[1][1] * c1;
            }
        }
        acc.re
    }

    fn hermitian_matrix(params: &[f64]) -> (usize, Vec<Vec<Complex64>>) {
        let dim = (params.len() as f64).sqrt().round() as usize;
        let mut matrix = vec![vec![Complex64::new(0.0, 0.0); dim]; dim];
        for row in 0..dim {
            for col in 0..dim {
                matrix[row][col] = Complex64::new(params[row * dim + col], 0.0);
            }
        }
        (dim, matrix)
    }

    fn expectation_hermitian(&self, wire: usize, params: &[f64]) -> f64 {
        let (dim, matrix) = Self::hermitian_matrix(params);
        if dim != 2 {
            // Only single-qubit Hermitian observables are supported by
            // this reference device; a multi-qubit Hermitian would need
            // its own subspace-projection logic.
            return 0.0;
        }
        let m = [[matrix[0][0], matrix[0][1]], [matrix[1][0], matrix[1][1]]];
        self.expectation_single_qubit(wire, m)
    }
}

fn pauli_x() -> [[Complex64; 2]; 2] {
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    [[zero, one], [one, zero]]
}

fn pauli_y() -> [[Complex64; 2]; 2] {
    let zero = Complex64::new(0.0, 0.0);
    let i = Complex64::new(0.0, 1.0);
    [[zero, -i], [i, zero]]
}

fn pauli_z() -> [[Complex64; 2]; 2] {
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    [[one, zero], [zero, -one]]
}

fn hadamard_matrix() -> [[Complex64; 2]; 2] {
    let inv_sqrt2 = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
    [[inv_sqrt2, inv_sqrt2], [inv_sqrt2, -inv_sqrt2]]
}

fn rx_matrix(theta: f64) -> [[Complex64; 2]; 2] {
    let c = Complex64::new((theta / 2.0).cos(), 0.0);
    let s = Complex64::new(0.0, -(theta / 2.0).sin());
    [[c, s], [s, c]]
}

fn ry_matrix(theta: f64) -> [[Complex64; 2]; 2] {
    let c = Complex64::new((theta / 2.0).cos(), 0.0);
    let s = Complex64::new((theta / 2.0).sin(), 0.0);
    [[c, -s], [s, c]]
}

fn rz_matrix(theta: f64) -> [[Complex64; 2]; 2] {
    let plus = Complex64::new(0.0, -theta / 2.0).exp();
    let minus = Complex64::new(0.0, theta / 2.0).exp();
    let zero = Complex64::new(0.0, 0.0);
    [[plus, zero], [zero, minus]]
}

// =============================================================================
// 3. Device impl
// =============================================================================

impl Device for ReferenceQubitDevice {
    fn reset(&mut self) {
        self.amplitudes.iter_mut().for_each(|a| *a = Complex64::new(0.0, 0.0));
        self.amplitudes[0] = Complex64::new(1.0, 0.0);
    }

    fn num_wires(&self) -> usize {
        self.num_wires
    }

    fn short_name(&self) -> &str {
        "reference.qubit"
    }

    fn name(&self) -> &str {
        "Reference Qubit Simulator"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn author(&self) -> &str {
        "qgrad contributors"
    }

    fn requires_version(&self) -> &str {
        ">=0.1"
    }

    fn operations(&self) -> &[String] {
        &self.operations
    }

    fn observables(&self) -> &[String] {
        &self.observables
    }

    fn apply(&mut self, name: &str, wires: &[usize], params: &[f64]) {
        trace!(name, ?wires, "applying gate");
        match name {
            "RX" => self.apply_single_qubit(wires[0], rx_matrix(params[0])),
            "RY" => self.apply_single_qubit(wires[0], ry_matrix(params[0])),
            "RZ" => self.apply_single_qubit(wires[0], rz_matrix(params[0])),
            "Hadamard" => self.apply_single_qubit(wires[0], hadamard_matrix()),
            "PauliX" => self.apply_single_qubit(wires[0], pauli_x()),
            "PauliY" => self.apply_single_qubit(wires[0], pauli_y()),
            "PauliZ" => self.apply_single_qubit(wires[0], pauli_z()),
            "CNOT" => self.apply_cnot(wires[0], wires[1]),
            other => unreachable!("check_validity should have rejected unsupported operation '{other}'"),
        }
    }

    fn expval(&self, name: &str, wires: &[usize], params: &[f64]) -> f64 {
        match name {
            "PauliX" => self.expectation_single_qubit(wires[0], pauli_x()),
            "PauliY" => self.expectation_single_qubit(wires[0], pauli_y()),
            "PauliZ" => self.expectation_single_qubit(wires[0], pauli_z()),
            "Hermitian" => self.expectation_hermitian(wires[0], params),
            other => unreachable!("check_validity should have rejected unsupported observable '{other}'"),
        }
    }

    fn var(&self, name: &str, wires: &[usize], params: &[f64]) -> QgradResult<f64> {
        match name {
            // Every Pauli is involutory, so <A^2> = 1 identically.
            "PauliX" | "PauliY" | "PauliZ" => {
                let mean = self.expval(name, wires, params);
                Ok(1.0 - mean * mean)
            }
            "Hermitian" => {
                let (dim, matrix) = Self::hermitian_matrix(params);
                if dim != 2 {
                    return Err(DeviceError::VarianceNotImplemented(name.to_string()).into());
                }
                let mut squared = vec![vec![Complex64::new(0.0, 0.0); dim]; dim];
                for row in 0..dim {
                    for col in 0..dim {
                        let mut acc = Complex64::new(0.0, 0.0);
                        for k in 0..dim {
                            acc += matrix[row][k] * matrix[k][col];
                        }
                        squared[row][col] = acc;
                    }
                }
                let flat_squared: Vec<f64> = squared.iter().flatten().map(|c| c.re).collect();
                let mean = self.expval(name, wires, params);
                let mean_sq = self.expectation_hermitian(wires[0], &flat_squared);
                Ok(mean_sq - mean * mean)
            }
            other => Err(DeviceError::VarianceNotImplemented(other.to_string()).into()),
        }
    }

    fn sample(&self, name: &str, wires: &[usize], params: &[f64], n: Option<usize>) -> QgradResult<Vec<f64>> {
        let shots = n.unwrap_or(1);
        let mean = self.expval(name, wires, params);
        // No hardware-shot noise model: a deterministic repeat of the
        // analytic expectation stands in for sampled outcomes.
        Ok(vec![mean; shots])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_state_has_plus_one_pauli_z_expectation() {
        let device = ReferenceQubitDevice::new(1);
        assert!((device.expval("PauliZ", &[0], &[]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hadamard_then_pauli_z_expectation_is_zero() {
        let mut device = ReferenceQubitDevice::new(1);
        device.apply("Hadamard", &[0], &[]);
        assert!(device.expval("PauliZ", &[0], &[]).abs() < 1e-12);
    }

    #[test]
    fn rx_pi_flips_pauli_z_expectation() {
        let mut device = ReferenceQubitDevice::new(1);
        device.apply("RX", &[0], &[std::f64::consts::PI]);
        assert!((device.expval("PauliZ", &[0], &[]) - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn cnot_entangles_control_and_target() {
        let mut device = ReferenceQubitDevice::new(2);
        device.apply("Hadamard", &[0], &[]);
        device.apply("CNOT", &[0, 1], &[]);
        // Bell state: both wires individually maximally mixed in Z.
        assert!(device.expval("PauliZ", &[0], &[]).abs() < 1e-12);
        assert!(device.expval("PauliZ", &[1], &[]).abs() < 1e-12);
    }

    #[test]
    fn pauli_z_variance_of_plus_state_is_one() {
        let mut device = ReferenceQubitDevice::new(1);
        device.apply("Hadamard", &[0], &[]);
        let var = device.var("PauliZ", &[0], &[]).unwrap();
        assert!((var - 1.0).abs() < 1e-9);
    }
}
