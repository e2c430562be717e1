// =============================================================================
// qgrad-core - Device executor adapter
// =============================================================================
// Table of Contents:
//   1. ExecutionContext - scoped acquisition hook (default: no-op)
//   2. QueryOutput, DeviceOutput - shaped measurement results
//   3. Device - the contract concrete backends implement
// =============================================================================
// Purpose: Thin boundary handing the tape and the current parameter
//          binding to a device and returning a numeric array. The adapter
//          never retains device-internal state across calls; `execute`
//          always resets the device first.
// =============================================================================

use crate::descriptor::ReturnType;
use crate::error::{DeviceError, QgradResult};
use crate::operation::Operation;
use crate::param::ParameterBinding;
use crate::tape::Tape;

// =============================================================================
// 1. ExecutionContext
// =============================================================================

/// A scoped acquisition around one `execute` cycle. The default
/// `MockExecutionContext` does nothing on drop; a device backed by real
/// hardware or an external resource overrides `Device::execution_context`
/// to return a guard that releases that resource when dropped.
pub trait ExecutionContext {}

pub struct MockExecutionContext;

impl ExecutionContext for MockExecutionContext {}

// =============================================================================
// 2. QueryOutput, DeviceOutput
// =============================================================================

/// The result of measuring one returned observable. Kept heterogeneous
/// (rather than flattened into one dense array) so that a tape mixing
/// sample and non-sample observables can shape its output correctly —
/// the device adapter never silently truncates a sample into a scalar.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Scalar(f64),
    Sample(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct DeviceOutput {
    pub values: Vec<QueryOutput>,
}

impl DeviceOutput {
    /// True when every observable returned a scalar (no `Sample`); the
    /// node can then shape the output as a plain dense vector/scalar.
    pub fn all_scalar(&self) -> bool {
        self.values.iter().all(|v| matches!(v, QueryOutput::Scalar(_)))
    }

    pub fn as_scalars(&self) -> Option<Vec<f64>> {
        self.values
            .iter()
            .map(|v| match v {
                QueryOutput::Scalar(x) => Some(*x),
                QueryOutput::Sample(_) => None,
            })
            .collect()
    }
}

// =============================================================================
// 3. Device
// =============================================================================

/// The contract a concrete backend implements. `execute` has a default
/// implementation identical in structure to the reference device
/// adapter: check validity, reset, run the pre/apply/post-apply hooks,
/// then the pre/measure/post-measure hooks, shaping the output from each
/// observable's `return_type`. A backend only needs to implement
/// `apply`/`expval`/`reset` and the identity methods; `var`/`sample` have
/// default "unsupported" implementations.
pub trait Device: Send + Sync {
    fn reset(&mut self);
    fn num_wires(&self) -> usize;
    fn shots(&self) -> usize {
        0
    }
    fn short_name(&self) -> &str;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn author(&self) -> &str;
    fn requires_version(&self) -> &str;

    fn operations(&self) -> &[String];
    fn observables(&self) -> &[String];

    fn supports_operation(&self, name: &str) -> bool {
        self.operations().iter().any(|op| op == name)
    }

    fn supports_observable(&self, name: &str) -> bool {
        self.observables().iter().any(|obs| obs == name)
    }

    fn check_validity(&self, gates: &[Operation], observables: &[Operation]) -> QgradResult<()> {
        for op in gates {
            if !self.supports_operation(&op.name) {
                return Err(DeviceError::UnsupportedOperation(op.name.clone()).into());
            }
        }
        for obs in observables {
            if !self.supports_observable(&obs.name) {
                return Err(DeviceError::UnsupportedObservable(obs.name.clone()).into());
            }
        }
        Ok(())
    }

    fn apply(&mut self, name: &str, wires: &[usize], params: &[f64]);
    fn expval(&self, name: &str, wires: &[usize], params: &[f64]) -> f64;

    fn var(&self, name: &str, wires: &[usize], _params: &[f64]) -> QgradResult<f64> {
        Err(DeviceError::VarianceNotImplemented(name.to_string()).into())
    }

    fn sample(&self, name: &str, _wires: &[usize], _params: &[f64], _n: Option<usize>) -> QgradResult<Vec<f64>> {
        Err(DeviceError::SampleNotImplemented(name.to_string()).into())
    }

    fn pre_apply(&mut self) {}
    fn post_apply(&mut self) {}
    fn pre_measure(&mut self) {}
    fn post_measure(&mut self) {}

    fn execution_context(&self) -> Box<dyn ExecutionContext> {
        Box::new(MockExecutionContext)
    }

    fn execute(&mut self, tape: &Tape, binding: &ParameterBinding) -> QgradResult<DeviceOutput> {
        self.check_validity(&tape.gates, &tape.observables)?;
        self.reset();
        let _ctx = self.execution_context();

        self.pre_apply();
        for op in &tape.gates {
            let params: Vec<f64> = op.params.iter().map(|p| p.resolve(binding)).collect();
            self.apply(&op.name, &op.wires, &params);
        }
        self.post_apply();

        self.pre_measure();
        let mut values = Vec::with_capacity(tape.observables.len());
        for obs in &tape.observables {
            let params: Vec<f64> = obs.params.iter().map(|p| p.resolve(binding)).collect();
            let return_type = obs
                .return_type
                .ok_or_else(|| DeviceError::ExecutionFailed(format!("observable '{}' has no return_type", obs.name)))?;
            let value = match return_type {
                ReturnType::Expectation => QueryOutput::Scalar(self.expval(&obs.name, &obs.wires, &params)),
                ReturnType::Variance => QueryOutput::Scalar(self.var(&obs.name, &obs.wires, &params)?),
                ReturnType::Sample(n) => QueryOutput::Sample(self.sample(&obs.name, &obs.wires, &params, Some(n))?),
            };
            values.push(value);
        }
        self.post_measure();

        Ok(DeviceOutput { values })
    }
}
