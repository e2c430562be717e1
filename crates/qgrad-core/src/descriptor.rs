// =============================================================================
// qgrad-core - Operation descriptor (consumed from the external op library)
// =============================================================================
// Table of Contents:
//   1. GradMethod, ReturnType - tagged dispatch replacing runtime type tests
//   2. GradRecipe - per-parameter shift-rule coefficients
//   3. OperationDescriptor - capability contract for gates/state-prep
//   4. ObservableDescriptor - capability contract for measured observables
// =============================================================================
// Purpose: The core never inspects a gate's concrete matrix or a device's
//          internals; it only asks each operation/observable descriptor
//          for its differentiability capabilities. Concrete gates live in
//          the qgrad-ops crate and implement these traits.
// =============================================================================

use ndarray::Array2;

// =============================================================================
// 1. GradMethod, ReturnType
// =============================================================================

/// Replaces dispatch on Python-style `isinstance` checks with a tagged
/// variant: every descriptor declares its own differentiability up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMethod {
    Analytic,
    Finite,
    None,
}

/// How a returned observable should be interpreted by the device adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Expectation,
    Variance,
    Sample(usize),
}

/// Which physical family an operation belongs to. A tape is either
/// entirely `Qubit` or entirely `Cv`; `Identity`-named operations are
/// ignored by the classifier (see tracer.rs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Qubit,
    Cv,
}

// =============================================================================
// 2. GradRecipe
// =============================================================================

/// Per-parameter shift-rule coefficients `(multiplier, shift)`. Defaults
/// to `(0.5, pi/2)`, the standard two-term parameter-shift recipe for
/// gates generated by an involutory Hermitian generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradRecipe {
    pub multiplier: f64,
    pub shift: f64,
}

impl Default for GradRecipe {
    fn default() -> Self {
        Self { multiplier: 0.5, shift: std::f64::consts::FRAC_PI_2 }
    }
}

// =============================================================================
// 3. OperationDescriptor
// =============================================================================

/// Capability contract for a gate or state-preparation operation.
/// Concrete device support is keyed by `name()`.
pub trait OperationDescriptor: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn family(&self) -> Family;
    fn num_params(&self) -> usize;
    fn grad_method(&self) -> GradMethod;

    /// Per-parameter shift-rule recipe; `None` means use the default
    /// `(0.5, pi/2)` recipe.
    fn grad_recipe(&self, _param_idx: usize) -> Option<GradRecipe> {
        None
    }

    /// True for Gaussian continuous-variable operations that expose a
    /// symplectic transformation. Only meaningful when `family() == Cv`.
    fn supports_heisenberg(&self) -> bool {
        false
    }

    /// `(1+2w) x (1+2w)` symplectic matrix in the homogeneous basis
    /// `[1, x_1, p_1, ..., x_w, p_w]`, where `w` is the number of wires
    /// this operation acts on (not the device's total wire count).
    /// `params` are this operation's own resolved parameter values (the
    /// transform depends on them, e.g. a displacement amplitude).
    /// Required when `supports_heisenberg()` is true.
    fn heisenberg_tr(&self, _params: &[f64], _num_wires: usize, _inverse: bool) -> Array2<f64> {
        panic!("heisenberg_tr called on an operation that does not support_heisenberg")
    }
}

// =============================================================================
// 4. ObservableDescriptor
// =============================================================================

/// Capability contract for a measured observable.
pub trait ObservableDescriptor: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn family(&self) -> Family;
    fn num_params(&self) -> usize;

    /// `1` for a first-order (linear) CV observable, `2` for a
    /// second-order (quadratic) one, `None` for observables the
    /// Heisenberg rule cannot transform analytically (forces `finite`).
    fn ev_order(&self) -> Option<u8> {
        None
    }

    /// First-/second-order real representation in the homogeneous basis,
    /// required when `ev_order()` is `Some`. A first-order observable
    /// returns a `(1+2w)`-length vector reshaped as a `1 x (1+2w)` row;
    /// a second-order one a full `(1+2w) x (1+2w)` symmetric matrix.
    fn heisenberg_obs(&self, _num_wires: usize) -> Array2<f64> {
        panic!("heisenberg_obs called on an observable with ev_order = none")
    }

    /// The squared observable used by the variance shift rule
    /// (`∂Var(A)/∂θ = ∂⟨A²⟩/∂θ − 2⟨A⟩∂⟨A⟩/∂θ`). For an involutory qubit
    /// observable (`A² = I`) this is `None`, signalling the derivative
    /// term is exactly zero. Hermitian observables provide the matrix
    /// square; first-order CV observables provide the outer product of
    /// their Heisenberg vector.
    fn squared(&self) -> Option<Box<dyn ObservableDescriptor>> {
        None
    }
}
