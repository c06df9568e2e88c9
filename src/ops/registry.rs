//! Explicit operator registry: name -> factory, populated at startup.
//!
//! Host frameworks dispatch reduction nodes by operator name. Keeping the
//! mapping in a plain value the embedder builds (instead of link-time
//! registration magic) means the engine carries no dependency on any
//! framework's dispatch machinery, and tests can register fakes.

use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;

use crate::error::{AdasumError, Result};
use crate::staging::TensorRegion;
use crate::topology::DistributedContext;
use crate::types::{DataType, GroupType, ReduceAlgo, ReduceOp};

use super::{ReductionRequest, fused_allreduce};

/// Attribute bag parsed from the host graph for one reduction node.
#[derive(Debug, Clone, Copy)]
pub struct OpAttributes {
    pub op: ReduceOp,
    pub algo: ReduceAlgo,
    pub group: GroupType,
}

impl Default for OpAttributes {
    fn default() -> Self {
        Self {
            op: ReduceOp::Sum,
            algo: ReduceAlgo::None,
            group: GroupType::Global,
        }
    }
}

/// A constructed reduction operator, ready to execute against a context.
pub trait ReductionOp: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the collective for one tensor set.
    ///
    /// # Safety
    /// Same contract as [`fused_allreduce`]: all regions must stay valid
    /// for the duration of the returned future.
    unsafe fn execute<'a>(
        &'a self,
        ctx: &'a DistributedContext,
        inputs: &'a [TensorRegion],
        outputs: &'a [TensorRegion],
        dtype: DataType,
    ) -> BoxFuture<'a, Result<()>>;
}

impl fmt::Debug for dyn ReductionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReductionOp").field("name", &self.name()).finish()
    }
}

/// Plain all-reduce: sum or average per the attributes, adaptive only if
/// the attributes say so.
struct AllReduce {
    attrs: OpAttributes,
}

impl ReductionOp for AllReduce {
    fn name(&self) -> &'static str {
        "allreduce"
    }

    unsafe fn execute<'a>(
        &'a self,
        ctx: &'a DistributedContext,
        inputs: &'a [TensorRegion],
        outputs: &'a [TensorRegion],
        dtype: DataType,
    ) -> BoxFuture<'a, Result<()>> {
        let request = ReductionRequest {
            inputs,
            outputs,
            dtype,
            op: self.attrs.op,
            algo: self.attrs.algo,
            group: self.attrs.group,
            start_level: None,
        };
        Box::pin(async move { unsafe { fused_allreduce(ctx, request).await } })
    }
}

/// Adaptive-summation all-reduce: always the Adasum combination rule,
/// hierarchical if the attributes ask for it.
struct AdasumAllReduce {
    attrs: OpAttributes,
}

impl ReductionOp for AdasumAllReduce {
    fn name(&self) -> &'static str {
        "adasum_allreduce"
    }

    unsafe fn execute<'a>(
        &'a self,
        ctx: &'a DistributedContext,
        inputs: &'a [TensorRegion],
        outputs: &'a [TensorRegion],
        dtype: DataType,
    ) -> BoxFuture<'a, Result<()>> {
        let request = ReductionRequest {
            inputs,
            outputs,
            dtype,
            op: ReduceOp::Adasum,
            algo: self.attrs.algo,
            group: self.attrs.group,
            start_level: None,
        };
        Box::pin(async move { unsafe { fused_allreduce(ctx, request).await } })
    }
}

type OpFactory = fn(OpAttributes) -> Box<dyn ReductionOp>;

/// Name -> factory map for reduction operators.
#[derive(Default)]
pub struct OpRegistry {
    factories: HashMap<&'static str, OpFactory>,
}

impl OpRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in operators registered.
    pub fn with_builtin_ops() -> Self {
        let mut registry = Self::new();
        registry.register("allreduce", |attrs| Box::new(AllReduce { attrs }));
        registry.register("adasum_allreduce", |attrs| {
            Box::new(AdasumAllReduce { attrs })
        });
        registry
    }

    /// Register (or replace) a factory under `name`.
    pub fn register(&mut self, name: &'static str, factory: OpFactory) {
        self.factories.insert(name, factory);
    }

    /// Instantiate the operator registered under `name`.
    pub fn create(&self, name: &str, attrs: OpAttributes) -> Result<Box<dyn ReductionOp>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AdasumError::OpNotRegistered { name: name.into() })?;
        Ok(factory(attrs))
    }

    /// Registered operator names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
