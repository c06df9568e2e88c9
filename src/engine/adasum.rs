//! Adaptive summation over the distance-doubling skeleton.
//!
//! Each round exchanges the full fused buffer with the round partner and
//! combines per tensor: the two copies of a tensor are weighted by how
//! much they disagree, so conflicting update directions are damped while
//! agreeing (near-orthogonal) components pass through as a plain sum.

use super::{Combine, vhdd_allreduce};
use crate::communicator::Communicator;
use crate::error::Result;
use crate::numeric;
use crate::staging::TensorDescriptor;
use crate::types::DataType;

struct AdasumCombine<'a> {
    descs: &'a [TensorDescriptor],
    dtype: DataType,
    epsilon: f64,
}

impl Combine for AdasumCombine<'_> {
    const OPERATION: &'static str = "adasum_allreduce";

    fn dtype(&self) -> DataType {
        self.dtype
    }

    fn combine(&self, local: &mut [u8], received: &[u8]) -> Result<()> {
        // One buffer exchange per round, but coefficients are computed per
        // tensor region: fusing the dot products across tensors would let
        // one large gradient dominate the weighting of every other.
        for desc in self.descs {
            let range = desc.range();
            let (dot, norm_a, norm_b) =
                numeric::dot_and_norms(&local[range.clone()], &received[range.clone()], desc.dtype)?;

            if norm_a < self.epsilon && norm_b < self.epsilon {
                // Both vectors are numerically zero; keep ours untouched.
                continue;
            }

            // Orthogonal vectors (dot ~ 0) give alpha = beta = 1: a plain
            // sum, matching the non-adaptive path. A vanishing norm also
            // degrades that side's coefficient to 1 instead of dividing
            // by ~0.
            let alpha = if norm_a >= self.epsilon {
                1.0 - dot / (2.0 * norm_a)
            } else {
                1.0
            };
            let beta = if norm_b >= self.epsilon {
                1.0 - dot / (2.0 * norm_b)
            } else {
                1.0
            };

            numeric::scaled_add(&mut local[range], &received[desc.range()], alpha, beta, desc.dtype)?;
        }
        Ok(())
    }
}

/// In-place Adasum all-reduce of the fused buffer described by `descs`.
///
/// `start_level` is the smallest pairing distance exchanged; 1 runs the
/// full protocol, while the hierarchical path passes the node-local group
/// size so rounds only pair ranks on different nodes.
pub(crate) async fn adasum_allreduce(
    comm: &Communicator,
    buf: &mut [u8],
    descs: &[TensorDescriptor],
    start_level: usize,
) -> Result<()> {
    let Some(first) = descs.first() else {
        return Ok(());
    };
    let dtype = first.dtype;
    numeric::ensure_reducible(dtype, AdasumCombine::OPERATION)?;

    let combiner = AdasumCombine {
        descs,
        dtype,
        epsilon: comm.config().adasum_epsilon,
    };
    vhdd_allreduce(comm, buf, start_level, &combiner).await
}
