//! Collective gradient synchronization for data-parallel training, built
//! around the Adasum adaptive summation algorithm.
//!
//! Workers form a full TCP mesh once at startup, build a
//! [`DistributedContext`] describing the job's node layout, and then call
//! [`fused_allreduce`] per gradient batch. The engine fuses the batch
//! into one staging buffer, exchanges it with distance-doubling partners
//! in `O(log n)` rounds, and combines each pair of vectors either by
//! plain summation or by the disagreement-weighted Adasum rule. On
//! multi-node topologies the hierarchical mode collapses each node with a
//! cheap local sum before running Adasum across nodes only.

pub mod communicator;
pub mod config;
pub mod device;
mod engine;
pub mod error;
mod numeric;
pub mod ops;
pub mod staging;
pub mod topology;
pub mod transport;
pub mod types;

pub use communicator::Communicator;
pub use config::AdasumConfig;
pub use device::{DeviceTransfer, HostTransfer};
pub use error::{AdasumError, ErrorKind, Result};
pub use numeric::F16;
pub use ops::registry::{OpAttributes, OpRegistry, ReductionOp};
pub use ops::{ReductionRequest, fused_allreduce};
pub use staging::{BufferStager, StagingBuffer, TensorDescriptor, TensorRegion};
pub use topology::{DistributedConfig, DistributedContext, WorkerGroup};
pub use transport::{Mesh, PeerConnection};
pub use types::{DataType, GroupType, Rank, ReduceAlgo, ReduceOp};
