// =============================================================================
// qgrad-refsim - Gaussian (continuous-variable) homogeneous-vector device
// =============================================================================
// Table of Contents:
//   1. ReferenceGaussianDevice - state and construction
//   2. Embedding helpers
//   3. Device impl
// =============================================================================
// Purpose: Tracks the mean phase-space vector in the homogeneous basis
//          `[1, x_1, p_1, ..., x_w, p_w]` and applies every gate through
//          its own `OperationDescriptor::heisenberg_tr`, the same
//          transform the gradient engine's order-2 Heisenberg rule uses.
//          Analytic and finite-difference Jacobians therefore agree by
//          construction rather than by a second, independently-written
//          simulation of the same physics.
// =============================================================================

use ndarray::{Array1, Array2};
use tracing::trace;

use qgrad_core::descriptor::OperationDescriptor;
use qgrad_core::device::Device;
use qgrad_core::error::{DeviceError, QgradResult};

use qgrad_ops::cv::{DisplacementGate, PhaseRotationGate, SqueezingGate};

const CV_OPERATIONS: &[&str] = &["Displacement", "PhaseRotation", "Squeezing"];
const CV_OBSERVABLES: &[&str] = &["QuadX", "QuadP", "QuadX2", "__heisenberg_linear__", "__heisenberg_quadratic__"];

// =============================================================================
// 1. ReferenceGaussianDevice
// =============================================================================

pub struct ReferenceGaussianDevice {
    num_wires: usize,
    /// Homogeneous mean vector `[1, x_1, p_1, ..., x_w, p_w]`, vacuum at
    /// the origin.
    state: Array1<f64>,
    operations: Vec<String>,
    observables: Vec<String>,
}

impl ReferenceGaussianDevice {
    pub fn new(num_wires: usize) -> Self {
        let mut state = Array1::<f64>::zeros(1 + 2 * num_wires);
        state[0] = 1.0;
        Self {
            num_wires,
            state,
            operations: CV_OPERATIONS.iter().map(|s| s.to_string()).collect(),
            observables: CV_OBSERVABLES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn full_dim(&self) -> usize {
        1 + 2 * self.num_wires
    }

    // -------------------------------------------------------------------
    // 2. Embedding helpers (mirrors gradient.rs's local-to-full embed,
    //    reimplemented here since it is a private helper of that module)
    // -------------------------------------------------------------------

    fn embed(&self, local: &Array2<f64>, wires: &[usize]) -> Array2<f64> {
        let full_dim = self.full_dim();
        let mut full = Array2::<f64>::eye(full_dim);
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

    fn embed_row(&self, local_row: &Array2<f64>, wires: &[usize]) -> Array1<f64> {
        let full_dim = self.full_dim();
        let mut full = Array1::<f64>::zeros(full_dim);
        full[0] = local_row[[0, 0]];
        for (li, &w) in wires.iter().enumerate() {
            full[1 + 2 * w] = local_row[[0, 1 + 2 * li]];
            full[2 + 2 * w] = local_row[[0, 2 + 2 * li]];
        }
        full
    }
}

fn quad_x_row() -> Array2<f64> {
    ndarray::array![[0.0, 1.0, 0.0]]
}

fn quad_p_row() -> Array2<f64> {
    ndarray::array![[0.0, 0.0, 1.0]]
}

fn quad_x2_matrix() -> Array2<f64> {
    ndarray::array![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]
}

// =============================================================================
// 3. Device impl
// =============================================================================

impl Device for ReferenceGaussianDevice {
    fn reset(&mut self) {
        self.state = Array1::<f64>::zeros(self.full_dim());
        self.state[0] = 1.0;
    }

    fn num_wires(&self) -> usize {
        self.num_wires
    }

    fn short_name(&self) -> &str {
        "reference.gaussian"
    }

    fn name(&self) -> &str {
        "Reference Gaussian Simulator"
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
        trace!(name, ?wires, "applying Gaussian gate");
        let local: Array2<f64> = match name {
            "Displacement" => DisplacementGate.heisenberg_tr(params, wires.len(), false),
            "PhaseRotation" => PhaseRotationGate.heisenberg_tr(params, wires.len(), false),
            "Squeezing" => SqueezingGate.heisenberg_tr(params, wires.len(), false),
            other => unreachable!("check_validity should have rejected unsupported operation '{other}'"),
        };
        let embedded = self.embed(&local, wires);
        self.state = embedded.dot(&self.state);
    }

    fn expval(&self, name: &str, wires: &[usize], params: &[f64]) -> f64 {
        match name {
            "QuadX" => self.embed_row(&quad_x_row(), wires).dot(&self.state),
            "QuadP" => self.embed_row(&quad_p_row(), wires).dot(&self.state),
            "QuadX2" => {
                let q = self.embed(&quad_x2_matrix(), wires);
                self.state.dot(&q.dot(&self.state))
            }
            "__heisenberg_linear__" => {
                let row = Array1::from(params.to_vec());
                row.dot(&self.state)
            }
            "__heisenberg_quadratic__" => {
                let dim = self.full_dim();
                let matrix = Array2::from_shape_vec((dim, dim), params.to_vec())
                    .expect("heisenberg_quadratic coefficient payload must be full_dim^2 long");
                self.state.dot(&matrix.dot(&self.state))
            }
            other => unreachable!("check_validity should have rejected unsupported observable '{other}'"),
        }
    }

    fn var(&self, name: &str, wires: &[usize], params: &[f64]) -> QgradResult<f64> {
        match name {
            "QuadX" => {
                let mean = self.expval("QuadX", wires, params);
                let mean_sq = self.expval("QuadX2", wires, params);
                Ok(mean_sq - mean * mean)
            }
            other => Err(DeviceError::VarianceNotImplemented(other.to_string()).into()),
        }
    }
}
