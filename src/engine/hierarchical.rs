//! Two-level reduction for hierarchical network topologies.
//!
//! Interconnect bandwidth within a node dwarfs the network between nodes,
//! so the node-local group first collapses to a single combined gradient
//! with a cheap plain sum, and only then does Adasum run across nodes.
//! Every node-local worker redundantly holds the node sum and drives its
//! own inter-node exchanges, so no separate result broadcast is needed.

use super::{adasum_allreduce, sum_allreduce};
use crate::error::Result;
use crate::staging::TensorDescriptor;
use crate::topology::DistributedContext;
use crate::types::{DataType, GroupType};

/// Node-local sum, then Adasum across nodes starting at the node span.
///
/// `start_level` overrides the inter-node starting distance; `None`
/// derives it from the node-local group size.
pub(crate) async fn hierarchical_allreduce(
    ctx: &DistributedContext,
    buf: &mut [u8],
    descs: &[TensorDescriptor],
    dtype: DataType,
    start_level: Option<usize>,
) -> Result<()> {
    let local = ctx.communicator(GroupType::NodeLocal)?;
    let global = ctx.communicator(GroupType::Global)?;
    let start_level = start_level.unwrap_or(local.size() as usize);

    // Intra-node pass. Blocking, so its completion on every node-local
    // worker is the barrier before any inter-node exchange begins.
    sum_allreduce(local, buf, dtype, false, 1).await?;

    // Inter-node pass: pairing distances below the node span are skipped,
    // so every VHDD partner sits on a different node and the node sums
    // are never re-reduced locally.
    adasum_allreduce(global, buf, descs, start_level).await
}
