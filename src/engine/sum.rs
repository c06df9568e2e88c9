//! Plain sum / average all-reduce over the distance-doubling skeleton.
//!
//! This is the baseline correctness path for the transport and staging
//! layers: no orthogonality weighting, just element-wise addition per
//! round, with an optional division by group size at the end.

use super::{Combine, vhdd_allreduce};
use crate::communicator::Communicator;
use crate::error::Result;
use crate::numeric;
use crate::types::DataType;

struct SumCombine {
    dtype: DataType,
}

impl Combine for SumCombine {
    const OPERATION: &'static str = "sum_allreduce";

    fn dtype(&self) -> DataType {
        self.dtype
    }

    fn combine(&self, local: &mut [u8], received: &[u8]) -> Result<()> {
        numeric::add_assign(local, received, self.dtype)
    }
}

/// In-place element-wise sum across the group; `average` divides the
/// result by group size afterwards.
pub(crate) async fn sum_allreduce(
    comm: &Communicator,
    buf: &mut [u8],
    dtype: DataType,
    average: bool,
    start_level: usize,
) -> Result<()> {
    numeric::ensure_reducible(dtype, SumCombine::OPERATION)?;

    vhdd_allreduce(comm, buf, start_level, &SumCombine { dtype }).await?;

    if average {
        numeric::scale(buf, 1.0 / comm.size() as f64, dtype)?;
    }
    Ok(())
}
