//! The operator contract: one fused all-reduce call over a tensor list.
//!
//! This is the layer a host framework talks to. It validates the request
//! against the rest of the group before any tensor data moves, stages the
//! tensors through a per-call host buffer, runs the selected reduction,
//! and writes the combined result back out. A failed call never touches
//! the outputs.

pub mod registry;

use futures::future::try_join_all;

use crate::communicator::Communicator;
use crate::engine;
use crate::error::{AdasumError, Result};
use crate::numeric;
use crate::staging::{BufferStager, TensorDescriptor, TensorRegion};
use crate::topology::DistributedContext;
use crate::types::{DataType, GroupType, Rank, ReduceAlgo, ReduceOp};

const OPERATION: &str = "fused_allreduce";

/// One reduction call: the tensor set, the target group, and the
/// algorithm selectors. Constructed fresh per call, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct ReductionRequest<'a> {
    /// Input tensors; every group member must present the same count,
    /// element counts, and dtype.
    pub inputs: &'a [TensorRegion],
    /// Output tensors, shape-matched 1:1 with the inputs. An output may
    /// alias its input for an in-place update.
    pub outputs: &'a [TensorRegion],
    pub dtype: DataType,
    pub op: ReduceOp,
    pub algo: ReduceAlgo,
    /// Group scoping the call. Ignored by `GpuHierarchical`, which always
    /// spans the node-local and global groups.
    pub group: GroupType,
    /// Smallest VHDD pairing distance to exchange. `None` derives 1, or
    /// the node-local group size in hierarchical mode.
    pub start_level: Option<usize>,
}

/// Blocking collective all-reduce of a fused tensor set.
///
/// Every worker in the target group must call this with an agreeing
/// request; the call resolves once this worker has finished all of its
/// exchange rounds. Errors are never retried internally and leave the
/// outputs unmodified.
///
/// # Safety
/// Every input region must be valid for reads and every output region
/// valid for writes of `elem_count` elements of `dtype`, in the memory
/// space of the context's device transfer, for the duration of the call.
pub async unsafe fn fused_allreduce(
    ctx: &DistributedContext,
    request: ReductionRequest<'_>,
) -> Result<()> {
    let ReductionRequest {
        inputs,
        outputs,
        dtype,
        op,
        algo,
        group,
        start_level,
    } = request;

    numeric::ensure_reducible(dtype, OPERATION)?;

    if inputs.len() != outputs.len() {
        return Err(AdasumError::TensorCountMismatch {
            inputs: inputs.len(),
            outputs: outputs.len(),
        });
    }
    for (input, output) in inputs.iter().zip(outputs) {
        if input.elem_count != output.elem_count {
            return Err(AdasumError::BufferSizeMismatch {
                expected: input.elem_count * dtype.size_in_bytes(),
                actual: output.elem_count * dtype.size_in_bytes(),
            });
        }
    }
    let comm_group = match algo {
        ReduceAlgo::GpuHierarchical => GroupType::Global,
        _ => group,
    };
    let comm = ctx.communicator(comm_group)?;

    let descs = BufferStager::describe(inputs, dtype);
    validate_descriptors(comm, &descs, dtype).await?;

    if inputs.is_empty() {
        return Ok(());
    }

    let stager = BufferStager::new(ctx.transfer());
    let mut staged = unsafe { stager.pack(inputs, dtype)? };

    let adaptive = op == ReduceOp::Adasum || algo != ReduceAlgo::None;
    if adaptive {
        match algo {
            ReduceAlgo::GpuHierarchical => {
                engine::hierarchical_allreduce(ctx, staged.bytes_mut(), &descs, dtype, start_level)
                    .await?;
            }
            _ => {
                engine::adasum_allreduce(
                    comm,
                    staged.bytes_mut(),
                    &descs,
                    start_level.unwrap_or(1),
                )
                .await?;
            }
        }
    } else {
        engine::sum_allreduce(
            comm,
            staged.bytes_mut(),
            dtype,
            op == ReduceOp::Average,
            start_level.unwrap_or(1),
        )
        .await?;
    }

    unsafe { stager.unpack(&staged, outputs) }
}

/// Compact wire form of a descriptor list:
/// `[dtype: u8][count: u32 LE][elem_count: u64 LE]*`.
fn encode_digest(descs: &[TensorDescriptor], dtype: DataType) -> Vec<u8> {
    let mut digest = Vec::with_capacity(5 + descs.len() * 8);
    digest.push(dtype.as_u8());
    digest.extend_from_slice(&(descs.len() as u32).to_le_bytes());
    for desc in descs {
        digest.extend_from_slice(&(desc.elem_count as u64).to_le_bytes());
    }
    digest
}

fn digest_mismatch_reason(ours: &[u8], theirs: &[u8]) -> String {
    let decode = |digest: &[u8]| -> Option<(u8, u32, Vec<u64>)> {
        let dtype = *digest.first()?;
        let count = u32::from_le_bytes(digest.get(1..5)?.try_into().ok()?);
        let mut counts = Vec::with_capacity(count as usize);
        for chunk in digest.get(5..)?.chunks_exact(8) {
            counts.push(u64::from_le_bytes(chunk.try_into().ok()?));
        }
        Some((dtype, count, counts))
    };

    match (decode(ours), decode(theirs)) {
        (Some((our_dt, our_n, our_counts)), Some((their_dt, their_n, their_counts))) => {
            if our_dt != their_dt {
                let name = |t| DataType::from_u8(t).map(|d| d.name()).unwrap_or("unknown");
                format!("dtype {} vs {}", name(our_dt), name(their_dt))
            } else if our_n != their_n {
                format!("tensor count {our_n} vs {their_n}")
            } else {
                format!("element counts {our_counts:?} vs {their_counts:?}")
            }
        }
        _ => "malformed descriptor digest".into(),
    }
}

/// Exchange descriptor digests with every group member and fail if any
/// disagree.
///
/// Runs before the staging buffer is even allocated, so a mismatched call
/// dies on every rank with a protocol error and no tensor data on the
/// wire.
async fn validate_descriptors(
    comm: &Communicator,
    descs: &[TensorDescriptor],
    dtype: DataType,
) -> Result<()> {
    let size = comm.size();
    if size <= 1 {
        return Ok(());
    }
    let rank = comm.rank();
    let digest = encode_digest(descs, dtype);
    let tag = comm.next_call();

    let peers: Vec<Rank> = (0..size).filter(|&r| r != rank).collect();
    let sends = try_join_all(
        peers
            .iter()
            .map(|&peer| comm.send(peer, tag, 0, &digest, OPERATION)),
    );
    let recvs = try_join_all(peers.iter().map(|&peer| async move {
        let theirs = comm.recv(peer, tag, 0, OPERATION).await?;
        Ok::<_, AdasumError>((peer, theirs))
    }));
    let (_, received) = tokio::try_join!(sends, recvs)?;

    for (peer, theirs) in received {
        if theirs != digest {
            return Err(AdasumError::DescriptorMismatch {
                rank: peer,
                reason: digest_mismatch_reason(&digest, &theirs),
            });
        }
    }
    Ok(())
}
