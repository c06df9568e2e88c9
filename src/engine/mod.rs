//! The collective reduction engine: recursive distance-doubling exchange
//! rounds with a pluggable pairwise combination rule.
//!
//! Every algorithm here is a blocking collective: all group members must
//! enter the same call, and nobody's call resolves until every round it
//! participates in has completed. There are no internal retries: a failed
//! exchange leaves the group in an unrecoverable mid-round state, so the
//! error surfaces to the caller and the whole group must start a fresh
//! call.

mod adasum;
mod hierarchical;
mod sum;

pub(crate) use adasum::adasum_allreduce;
pub(crate) use hierarchical::hierarchical_allreduce;
pub(crate) use sum::sum_allreduce;

use crate::communicator::Communicator;
use crate::error::{AdasumError, Result};
use crate::numeric;
use crate::types::{DataType, Rank};

/// Phase bytes within one collective call's tag space.
mod phase {
    pub(super) const FOLD_IN: u8 = 1;
    pub(super) const FOLD_OUT: u8 = 2;
    pub(super) const ROUND_BASE: u8 = 8;
}

/// Largest power of two <= n. n must be >= 1.
fn prev_power_of_two(n: usize) -> usize {
    n.next_power_of_two() >> if n.is_power_of_two() { 0 } else { 1 }
}

/// Pairwise merge rule applied to each round's received buffer.
trait Combine {
    const OPERATION: &'static str;

    fn dtype(&self) -> DataType;

    /// Merge `received` into `local` in place. Both buffers hold the full
    /// fused tensor set; every group member applies the same rule, so the
    /// pair ends the round with identical contents.
    fn combine(&self, local: &mut [u8], received: &[u8]) -> Result<()>;
}

/// Distance-doubling all-reduce skeleton shared by the sum and Adasum
/// paths.
///
/// Pairing rule: at round `r`, each rank exchanges its full buffer with
/// `rank XOR 2^r`. Rounds whose distance is below `start_level` are
/// skipped; the hierarchical path uses this to restrict pairing to
/// partners on other nodes.
///
/// Non-power-of-two groups: the ranks beyond the largest power of two are
/// first folded pairwise into their lower counterparts with a plain sum,
/// sit out the rounds, and receive the finished result back at the end.
async fn vhdd_allreduce<C: Combine>(
    comm: &Communicator,
    buf: &mut [u8],
    start_level: usize,
    combiner: &C,
) -> Result<()> {
    let size = comm.size() as usize;
    if size <= 1 {
        return Ok(());
    }

    let rank = comm.rank() as usize;
    let total = buf.len();
    let tag = comm.next_call();
    let op = C::OPERATION;

    let p2 = prev_power_of_two(size);
    let excess = size - p2;
    if excess > 0 {
        tracing::debug!(size, p2, "folding excess ranks for non-power-of-two group");
    }

    if rank >= p2 {
        // Folded-out rank: contribute the input, sit out the rounds, and
        // take the finished result back from the counterpart.
        let partner = (rank - p2) as Rank;
        comm.send(partner, tag, phase::FOLD_IN, buf, op).await?;
        let received = comm.recv(partner, tag, phase::FOLD_OUT, op).await?;
        if received.len() != total {
            return Err(AdasumError::BufferSizeMismatch {
                expected: total,
                actual: received.len(),
            });
        }
        buf.copy_from_slice(&received);
        return Ok(());
    }

    if rank < excess {
        // Absorb the folded counterpart's input with a plain sum before
        // the rounds begin.
        let partner = (rank + p2) as Rank;
        let received = comm.recv(partner, tag, phase::FOLD_IN, op).await?;
        if received.len() != total {
            return Err(AdasumError::BufferSizeMismatch {
                expected: total,
                actual: received.len(),
            });
        }
        numeric::add_assign(buf, &received, combiner.dtype())?;
    }

    let mut round: u8 = 0;
    let mut distance: usize = 1;
    while distance < p2 {
        if distance >= start_level {
            let partner = (rank ^ distance) as Rank;
            let received = comm
                .exchange(partner, tag, phase::ROUND_BASE + round, buf, op)
                .await?;
            if received.len() != total {
                return Err(AdasumError::BufferSizeMismatch {
                    expected: total,
                    actual: received.len(),
                });
            }
            combiner.combine(buf, &received)?;
        }
        round += 1;
        distance <<= 1;
    }

    if rank < excess {
        comm.send((rank + p2) as Rank, tag, phase::FOLD_OUT, buf, op)
            .await?;
    }

    Ok(())
}
