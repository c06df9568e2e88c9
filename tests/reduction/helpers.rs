use std::sync::Arc;

use adasum::{
    AdasumConfig, DataType, DistributedConfig, DistributedContext, GroupType, Mesh,
    ReduceAlgo, ReduceOp, ReductionRequest, TensorRegion, fused_allreduce,
};

/// Run one closure per rank over a freshly bootstrapped loopback cluster.
///
/// `local_size` partitions the world into equal "nodes": ranks 0..local_size
/// form node 0, the next local_size ranks node 1, and so on. Keeps every
/// context alive until all per-rank tasks complete.
pub async fn run_cluster<F, Fut>(world_size: u32, local_size: u32, f: F)
where
    F: Fn(Arc<DistributedContext>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let meshes = Mesh::bootstrap_local(world_size).await.unwrap();
    let contexts: Vec<Arc<DistributedContext>> = meshes
        .iter()
        .map(|mesh| {
            let dist = DistributedConfig {
                world_rank: mesh.rank(),
                world_size,
                local_rank: mesh.rank() % local_size,
                local_size,
            };
            Arc::new(DistributedContext::new(dist, mesh, AdasumConfig::default()).unwrap())
        })
        .collect();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for ctx in &contexts {
        let ctx = Arc::clone(ctx);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(ctx).await }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

/// All-reduce a single f32 tensor and return the combined result.
pub async fn reduce_vec_f32(
    ctx: &DistributedContext,
    input: &[f32],
    op: ReduceOp,
    algo: ReduceAlgo,
) -> Vec<f32> {
    let mut output = vec![0f32; input.len()];
    let inputs = [TensorRegion::new(input.as_ptr() as u64, input.len())];
    let outputs = [TensorRegion::new(output.as_mut_ptr() as u64, output.len())];
    let request = ReductionRequest {
        inputs: &inputs,
        outputs: &outputs,
        dtype: DataType::F32,
        op,
        algo,
        group: GroupType::Global,
        start_level: None,
    };
    unsafe { fused_allreduce(ctx, request).await.unwrap() };
    output
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {i}: {a} vs {e} (tolerance {tolerance})"
        );
    }
}

/// Reference Adasum combination of two equal-length vectors, mirroring the
/// engine's arithmetic (f64 dot/norm accumulation, f32 scaled add).
pub fn adasum_pair(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += *x as f64 * *y as f64;
        norm_a += *x as f64 * *x as f64;
        norm_b += *y as f64 * *y as f64;
    }
    if norm_a < 1e-8 && norm_b < 1e-8 {
        return a.to_vec();
    }
    let alpha = if norm_a >= 1e-8 { 1.0 - dot / (2.0 * norm_a) } else { 1.0 };
    let beta = if norm_b >= 1e-8 { 1.0 - dot / (2.0 * norm_b) } else { 1.0 };
    a.iter()
        .zip(b)
        .map(|(x, y)| alpha as f32 * x + beta as f32 * y)
        .collect()
}

pub fn add(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}
