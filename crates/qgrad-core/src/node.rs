// =============================================================================
// qgrad-core - QuantumNode
// =============================================================================
// Table of Contents:
//   1. NodeOutput - evaluate()'s shaped result
//   2. QuantumNode - builder + device + retrace cache
//   3. evaluate / jacobian / vjp
// =============================================================================
// Purpose: The external-facing entry point binding a traceable builder
//          function to a concrete device. Owns the retrace cache (a tape
//          is reused across calls unless the flattened argument count
//          changes or caching is disabled) and assembles device output
//          and Jacobians back into caller-shaped values.
// =============================================================================

use std::collections::HashMap;

use ndarray::Array1;
use tracing::debug;

use crate::device::{Device, DeviceOutput, QueryOutput};
use crate::error::{QgradResult, TraceError};
use crate::gradient::{self, JacobianMethod, JacobianRequest};
use crate::operation::Operation;
use crate::param::{flatten, ArgTree, Param, ParameterBinding};
use crate::tape::{JacobianMatrix, Tape};
use crate::tracer;

// =============================================================================
// 1. NodeOutput
// =============================================================================

/// `evaluate`'s result, shaped per `Tape::output_shape`. A scalar tape
/// whose single observable is not a sample collapses to `Scalar`;
/// everything else (including any tape that mixes sample and non-sample
/// observables) stays as an ordered list of per-observable query results.
#[derive(Debug, Clone)]
pub enum NodeOutput {
    Scalar(f64),
    Array(Vec<QueryOutput>),
}

impl NodeOutput {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            NodeOutput::Scalar(v) => Some(*v),
            NodeOutput::Array(_) => None,
        }
    }
}

// =============================================================================
// 2. QuantumNode
// =============================================================================

/// Binds a traceable builder function to a device. `F` constructs the
/// tape's operations by calling into `tracer::append_gate`/
/// `tracer::append_observable` (directly, or indirectly through op-library
/// constructors) and returns the ordered list of measured observables.
pub struct QuantumNode<F>
where
    F: Fn(&[Param]) -> QgradResult<Vec<Operation>>,
{
    builder: F,
    device: Box<dyn Device>,
    cache: bool,
    default_kwargs: HashMap<String, Vec<f64>>,
    tape: Option<Tape>,
}

impl<F> QuantumNode<F>
where
    F: Fn(&[Param]) -> QgradResult<Vec<Operation>>,
{
    pub fn new(builder: F, device: Box<dyn Device>) -> Self {
        Self { builder, device, cache: true, default_kwargs: HashMap::new(), tape: None }
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_default_kwargs(mut self, default_kwargs: HashMap<String, Vec<f64>>) -> Self {
        self.default_kwargs = default_kwargs;
        self
    }

    pub fn tape(&self) -> Option<&Tape> {
        self.tape.as_ref()
    }

    /// Retrace iff caching is disabled, no tape is cached yet, or the
    /// flattened positional argument count has changed since the cached
    /// trace — the sole condition under which a cached tape goes stale.
    fn ensure_tape(&mut self, args: &ArgTree) -> QgradResult<()> {
        let flat_len = flatten(args).len();
        let needs_retrace = !self.cache
            || match &self.tape {
                None => true,
                Some(tape) => flatten(&tape.arg_template).len() != flat_len,
            };

        if needs_retrace {
            debug!(flat_len, cache = self.cache, "tracing circuit");
            let builder = &self.builder;
            let tape = tracer::trace(args.clone(), self.default_kwargs.clone(), |params| builder(params))?;
            self.check_wires(&tape)?;
            self.tape = Some(tape);
        }
        Ok(())
    }

    fn check_wires(&self, tape: &Tape) -> QgradResult<()> {
        let num_wires = self.device.num_wires();
        for op in tape.combined() {
            for &wire in &op.wires {
                if wire >= num_wires {
                    return Err(TraceError::WireOutOfRange { wire, num_wires }.into());
                }
            }
        }
        Ok(())
    }

    fn binding_for(&self, args: &ArgTree, kwargs: &HashMap<String, Vec<f64>>) -> ParameterBinding {
        let mut merged = self.default_kwargs.clone();
        merged.extend(kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
        ParameterBinding::new(flatten(args)).with_kwargs(merged)
    }

    // =========================================================================
    // 3. evaluate / jacobian / vjp
    // =========================================================================

    /// Equivalent to calling the node directly: trace (if needed), bind
    /// the given positional/keyword arguments, and execute on the device.
    pub fn evaluate(&mut self, args: &ArgTree, kwargs: &HashMap<String, Vec<f64>>) -> QgradResult<NodeOutput> {
        self.ensure_tape(args)?;
        let binding = self.binding_for(args, kwargs);
        let tape = self.tape.as_ref().expect("ensure_tape just installed a tape");
        let output: DeviceOutput = self.device.execute(tape, &binding)?;

        if tape.output_shape == crate::tape::OutputShape::Scalar {
            if let Some(scalars) = output.as_scalars() {
                if scalars.len() == 1 {
                    return Ok(NodeOutput::Scalar(scalars[0]));
                }
            }
        }
        Ok(NodeOutput::Array(output.values))
    }

    /// Jacobian of the traced tape's returned observables with respect to
    /// the positional arguments in `args`. `method` is one of
    /// `"analytic"`, `"finite"`, `"best"`.
    pub fn jacobian(
        &mut self,
        args: &ArgTree,
        which: Option<&[usize]>,
        method: &str,
        h: f64,
        order: u8,
    ) -> QgradResult<JacobianMatrix> {
        self.ensure_tape(args)?;
        let method: JacobianMethod = method.parse()?;
        let flat = flatten(args);
        let request = JacobianRequest { which, method, h, order };
        let tape = self.tape.as_mut().expect("ensure_tape just installed a tape");
        gradient::jacobian(self.device.as_mut(), tape, &flat, &request)
    }

    /// Vector-Jacobian product: `cotangent^T . J`, the shape an AD
    /// framework's backward pass needs to propagate a gradient through
    /// this node. `cotangent` must have one entry per returned observable.
    pub fn vjp(
        &mut self,
        args: &ArgTree,
        cotangent: &[f64],
        which: Option<&[usize]>,
        method: &str,
        h: f64,
        order: u8,
    ) -> QgradResult<Vec<f64>> {
        let jac = self.jacobian(args, which, method, h, order)?;
        let (rows, _cols) = jac.shape();
        if cotangent.len() != rows {
            return Err(crate::error::QgradError::Internal(format!(
                "vjp cotangent has {} entries, expected {}",
                cotangent.len(),
                rows
            )));
        }
        let cotangent = Array1::from(cotangent.to_vec());
        let result = jac.data.t().dot(&cotangent);
        Ok(result.to_vec())
    }
}
