// =============================================================================
// qgrad-core - Tape
// =============================================================================
// Table of Contents:
//   1. OutputShape, TapeFamily
//   2. Tape
//   3. JacobianMatrix
// =============================================================================
// Purpose: The result of tracing — an ordered list of operations followed
//          by an ordered list of returned observables, plus a reverse
//          index from free-parameter slot to the (op_index, param_index)
//          sites where it appears.
// =============================================================================

use std::collections::{HashMap, HashSet};

use ndarray::Array2;

use crate::descriptor::{Family, GradMethod};
use crate::operation::Operation;
use crate::param::ArgTree;

// =============================================================================
// 1. OutputShape, TapeFamily
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Scalar,
    Vector,
}

pub type TapeFamily = Family;

/// `(op_idx, param_idx)`: `op_idx` indexes the *combined* tape (gates then
/// observables); `param_idx` indexes that operation's `params` vector.
pub type UseSite = (usize, usize);

// =============================================================================
// 2. Tape
// =============================================================================

#[derive(Debug, Clone)]
pub struct Tape {
    pub gates: Vec<Operation>,
    pub observables: Vec<Operation>,
    pub var_ops: HashMap<usize, Vec<UseSite>>,
    pub family: TapeFamily,
    pub output_dim: usize,
    pub output_shape: OutputShape,
    pub arg_template: ArgTree,
    pub default_kwargs: HashMap<String, Vec<f64>>,
    pub grad_method_for_par: HashMap<usize, GradMethod>,
    /// Per-op (combined-tape index), per-tape flag: this CV op's
    /// contribution should use the order-2 Heisenberg rule rather than
    /// plain parameter-shift. Computed by `gradient::compute_grad_methods`
    /// alongside `grad_method_for_par`; deliberately not part of the
    /// `OperationDescriptor` itself (§4.7: "does not mutate the descriptor").
    pub heisenberg_order2_ops: HashSet<usize>,
}

impl Tape {
    /// The combined tape: all gates/state-prep operations followed by all
    /// returned observables, matching invariant "all state-preparation and
    /// gate operations precede all returned observables".
    pub fn combined(&self) -> impl Iterator<Item = &Operation> {
        self.gates.iter().chain(self.observables.iter())
    }

    pub fn combined_op(&self, op_idx: usize) -> &Operation {
        if op_idx < self.gates.len() {
            &self.gates[op_idx]
        } else {
            &self.observables[op_idx - self.gates.len()]
        }
    }

    pub fn combined_op_mut(&mut self, op_idx: usize) -> &mut Operation {
        let num_gates = self.gates.len();
        if op_idx < num_gates {
            &mut self.gates[op_idx]
        } else {
            &mut self.observables[op_idx - num_gates]
        }
    }

    /// Non-observable operations strictly after `op_idx` in tape order —
    /// a plain slice, not a causal DAG successor set. This conservative
    /// choice (walk everything downstream regardless of wire overlap) is
    /// a deliberate decision documented in DESIGN.md.
    pub fn successors(&self, op_idx: usize) -> &[Operation] {
        if op_idx + 1 >= self.gates.len() {
            &[]
        } else {
            &self.gates[op_idx + 1..]
        }
    }

    pub fn num_wires_used(&self) -> usize {
        self.combined()
            .flat_map(|op| op.wires.iter().copied())
            .max()
            .map(|w| w + 1)
            .unwrap_or(0)
    }
}

// =============================================================================
// 3. JacobianMatrix
// =============================================================================

#[derive(Debug, Clone)]
pub struct JacobianMatrix {
    pub data: Array2<f64>,
}

impl JacobianMatrix {
    pub fn zeros(output_dim: usize, num_params: usize) -> Self {
        Self { data: Array2::zeros((output_dim, num_params)) }
    }

    pub fn set_column(&mut self, col: usize, values: &[f64]) {
        for (row, value) in values.iter().enumerate() {
            self.data[[row, col]] = *value;
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}
