//! Adasum all-reduce across 2 ranks.
//!
//! Each rank starts with its own gradient. After the reduce, every rank
//! holds the disagreement-weighted combination of both inputs.
//!
//! ```bash
//! cargo run --example adasum
//! ```

use std::sync::Arc;

use adasum::{
    AdasumConfig, DataType, DistributedConfig, DistributedContext, GroupType, Mesh, ReduceAlgo,
    ReduceOp, ReductionRequest, TensorRegion, fused_allreduce,
};

#[tokio::main]
async fn main() -> adasum::Result<()> {
    let world_size = 2u32;
    let meshes = Mesh::bootstrap_local(world_size).await?;

    let mut handles = Vec::new();
    for mesh in meshes {
        handles.push(tokio::spawn(async move {
            let rank = mesh.rank();
            let dist = DistributedConfig {
                world_rank: rank,
                world_size,
                local_rank: rank,
                local_size: 1,
            };
            let ctx = Arc::new(DistributedContext::new(
                dist,
                &mesh,
                AdasumConfig::default(),
            )?);

            let input: Vec<f32> = if rank == 0 {
                vec![4.0, 5.0, 6.0]
            } else {
                vec![7.0, 8.0, 9.0]
            };
            let mut output = vec![0f32; input.len()];

            let inputs = [TensorRegion::new(input.as_ptr() as u64, input.len())];
            let outputs = [TensorRegion::new(output.as_mut_ptr() as u64, output.len())];
            let request = ReductionRequest {
                inputs: &inputs,
                outputs: &outputs,
                dtype: DataType::F32,
                op: ReduceOp::Adasum,
                algo: ReduceAlgo::None,
                group: GroupType::Global,
                start_level: None,
            };
            unsafe { fused_allreduce(&ctx, request).await? };

            adasum::Result::Ok((rank, input, output))
        }));
    }

    for handle in handles {
        let (rank, input, output) = handle.await.expect("rank task panicked")?;
        println!("rank {rank}: {input:?} -> {output:?}");
    }
    // Output (both ranks identical):
    // rank 0: [4.0, 5.0, 6.0] -> [5.6301, 6.5235, 7.4169]
    // rank 1: [7.0, 8.0, 9.0] -> [5.6301, 6.5235, 7.4169]

    Ok(())
}
