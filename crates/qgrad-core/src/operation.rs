// =============================================================================
// qgrad-core - Operation
// =============================================================================
// Table of Contents:
//   1. OpKind - gate / state_prep / observable discriminator
//   2. Descriptor - either side of the OperationDescriptor/ObservableDescriptor split
//   3. Operation - the traced, mutable-by-substitution-only record
// =============================================================================
// Purpose: Replaces runtime type tests ("isinstance(op, Observable)") with a
//          tagged variant: every traced operation carries its own kind and
//          family explicitly, decided once at tracing time.
// =============================================================================

use std::sync::Arc;

use crate::descriptor::{Family, ObservableDescriptor, OperationDescriptor, ReturnType};
use crate::param::Param;

// =============================================================================
// 1. OpKind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Gate,
    StatePrep,
    Observable,
}

// =============================================================================
// 2. Descriptor
// =============================================================================

/// An operation's descriptor is either the gate/state-prep contract or the
/// observable contract; which one applies is determined by `OpKind`.
#[derive(Clone)]
pub enum Descriptor {
    Op(Arc<dyn OperationDescriptor>),
    Obs(Arc<dyn ObservableDescriptor>),
}

impl Descriptor {
    pub fn name(&self) -> &str {
        match self {
            Descriptor::Op(d) => d.name(),
            Descriptor::Obs(d) => d.name(),
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Descriptor::Op(d) => d.family(),
            Descriptor::Obs(d) => d.family(),
        }
    }

    pub fn as_op(&self) -> Option<&Arc<dyn OperationDescriptor>> {
        match self {
            Descriptor::Op(d) => Some(d),
            Descriptor::Obs(_) => None,
        }
    }

    pub fn as_obs(&self) -> Option<&Arc<dyn ObservableDescriptor>> {
        match self {
            Descriptor::Obs(d) => Some(d),
            Descriptor::Op(_) => None,
        }
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Descriptor({})", self.name())
    }
}

// =============================================================================
// 3. Operation
// =============================================================================

/// A single traced operation. Created by the tracer; mutated only by the
/// gradient engine through the scoped parameter substitution protocol
/// (substitution.rs), never directly.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub kind: OpKind,
    pub wires: Vec<usize>,
    pub params: Vec<Param>,
    pub descriptor: Descriptor,
    pub return_type: Option<ReturnType>,
}

impl Operation {
    pub fn gate(descriptor: Arc<dyn OperationDescriptor>, wires: Vec<usize>, params: Vec<Param>) -> Self {
        Self {
            name: descriptor.name().to_string(),
            kind: OpKind::Gate,
            wires,
            params,
            descriptor: Descriptor::Op(descriptor),
            return_type: None,
        }
    }

    pub fn state_prep(descriptor: Arc<dyn OperationDescriptor>, wires: Vec<usize>, params: Vec<Param>) -> Self {
        Self {
            name: descriptor.name().to_string(),
            kind: OpKind::StatePrep,
            wires,
            params,
            descriptor: Descriptor::Op(descriptor),
            return_type: None,
        }
    }

    pub fn observable(
        descriptor: Arc<dyn ObservableDescriptor>,
        wires: Vec<usize>,
        params: Vec<Param>,
        return_type: Option<ReturnType>,
    ) -> Self {
        Self {
            name: descriptor.name().to_string(),
            kind: OpKind::Observable,
            wires,
            params,
            descriptor: Descriptor::Obs(descriptor),
            return_type,
        }
    }

    pub fn family(&self) -> Family {
        self.descriptor.family()
    }

    pub fn is_identity(&self) -> bool {
        self.name == "Identity"
    }
}
