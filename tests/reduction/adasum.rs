use adasum::{
    DataType, F16, GroupType, ReduceAlgo, ReduceOp, ReductionRequest, TensorRegion,
    fused_allreduce,
};

use super::helpers::{add, adasum_pair, assert_close, reduce_vec_f32, run_cluster};

// Reference output for adasum([4,5,6], [7,8,9]), from the combination
// rule: alpha = 1 - 122/154, beta = 1 - 122/388.
const REFERENCE: [f32; 3] = [5.6301, 6.5235, 7.4169];

#[tokio::test]
async fn test_adasum_two_ranks_reference() {
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let input: Vec<f32> = if rank == 0 {
            vec![4.0, 5.0, 6.0]
        } else {
            vec![7.0, 8.0, 9.0]
        };
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Adasum, ReduceAlgo::None).await;
        assert_close(&output, &REFERENCE, 1e-3);
    })
    .await;
}

#[tokio::test]
async fn test_adasum_two_tensors_swapped_inputs() {
    // Worker 0 presents (G1, G2) and worker 1 presents (G2, G1); the
    // combination is symmetric, so both fused outputs converge to the
    // same vector on both workers.
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let grad_1: Vec<f32> = vec![4.0, 5.0, 6.0];
        let grad_2: Vec<f32> = vec![7.0, 8.0, 9.0];
        let (first, second) = if rank == 0 {
            (&grad_1, &grad_2)
        } else {
            (&grad_2, &grad_1)
        };

        let mut out_1 = vec![0f32; 3];
        let mut out_2 = vec![0f32; 3];
        let inputs = [
            TensorRegion::new(first.as_ptr() as u64, first.len()),
            TensorRegion::new(second.as_ptr() as u64, second.len()),
        ];
        let outputs = [
            TensorRegion::new(out_1.as_mut_ptr() as u64, out_1.len()),
            TensorRegion::new(out_2.as_mut_ptr() as u64, out_2.len()),
        ];
        let request = ReductionRequest {
            inputs: &inputs,
            outputs: &outputs,
            dtype: DataType::F32,
            op: ReduceOp::Adasum,
            algo: ReduceAlgo::None,
            group: GroupType::Global,
            start_level: None,
        };
        unsafe { fused_allreduce(&ctx, request).await.unwrap() };

        assert_close(&out_1, &REFERENCE, 1e-3);
        assert_close(&out_2, &REFERENCE, 1e-3);
    })
    .await;
}

#[tokio::test]
async fn test_adasum_swap_is_symmetric() {
    // Running the same pair with operands swapped between the workers
    // must produce identical results on each worker.
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let a: Vec<f32> = vec![0.3, -1.7, 2.9, 0.01];
        let b: Vec<f32> = vec![-2.2, 0.4, 1.1, 5.0];
        let (mine, theirs) = if rank == 0 { (&a, &b) } else { (&b, &a) };

        let first = reduce_vec_f32(&ctx, mine, ReduceOp::Adasum, ReduceAlgo::None).await;
        let second = reduce_vec_f32(&ctx, theirs, ReduceOp::Adasum, ReduceAlgo::None).await;
        assert_close(&first, &second, 1e-5);
    })
    .await;
}

#[tokio::test]
async fn test_adasum_orthogonal_falls_back_to_sum() {
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let input: Vec<f32> = if rank == 0 {
            vec![1.0, 0.0, 3.0, 0.0]
        } else {
            vec![0.0, 2.0, 0.0, 4.0]
        };
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Adasum, ReduceAlgo::None).await;
        // dot(a, b) == 0, so alpha = beta = 1 and the result is a + b.
        assert_close(&output, &[1.0, 2.0, 3.0, 4.0], 1e-6);
    })
    .await;
}

#[tokio::test]
async fn test_adasum_zero_vectors_stay_zero() {
    run_cluster(2, 1, |ctx| async move {
        let input = vec![0f32; 6];
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Adasum, ReduceAlgo::None).await;
        assert_close(&output, &vec![0.0; 6], 0.0);
    })
    .await;
}

#[tokio::test]
async fn test_adasum_four_ranks_matches_pairwise_reference() {
    let vectors: [Vec<f32>; 4] = [
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
        vec![1.0, 2.0, 3.0],
        vec![10.0, 11.0, 12.0],
    ];
    // Round 1 pairs (0,1) and (2,3); round 2 combines the pair results.
    let expected = adasum_pair(
        &adasum_pair(&vectors[0], &vectors[1]),
        &adasum_pair(&vectors[2], &vectors[3]),
    );

    run_cluster(4, 1, move |ctx| {
        let vectors = vectors.clone();
        let expected = expected.clone();
        async move {
            let rank = ctx.rank(GroupType::Global).unwrap() as usize;
            let output =
                reduce_vec_f32(&ctx, &vectors[rank], ReduceOp::Adasum, ReduceAlgo::None).await;
            assert_close(&output, &expected, 1e-4);
        }
    })
    .await;
}

#[tokio::test]
async fn test_adasum_three_ranks_folds_excess() {
    let vectors: [Vec<f32>; 3] = [
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
        vec![1.0, 1.0, 1.0],
    ];
    // Rank 2 folds into rank 0 with a plain sum before the single
    // power-of-two round.
    let expected = adasum_pair(&add(&vectors[0], &vectors[2]), &vectors[1]);

    run_cluster(3, 1, move |ctx| {
        let vectors = vectors.clone();
        let expected = expected.clone();
        async move {
            let rank = ctx.rank(GroupType::Global).unwrap() as usize;
            let output =
                reduce_vec_f32(&ctx, &vectors[rank], ReduceOp::Adasum, ReduceAlgo::None).await;
            assert_close(&output, &expected, 1e-4);
        }
    })
    .await;
}

#[tokio::test]
async fn test_adasum_f16_reference() {
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let grad: Vec<f32> = if rank == 0 {
            vec![5.6301, 6.5235, 7.4169]
        } else {
            vec![7.0, 8.0, 9.0]
        };
        let encoded: Vec<u16> = grad.iter().map(|v| F16::from_f32(*v).0).collect();
        let mut out = vec![0u16; encoded.len()];

        let inputs = [TensorRegion::new(encoded.as_ptr() as u64, encoded.len())];
        let outputs = [TensorRegion::new(out.as_mut_ptr() as u64, out.len())];
        let request = ReductionRequest {
            inputs: &inputs,
            outputs: &outputs,
            dtype: DataType::F16,
            op: ReduceOp::Adasum,
            algo: ReduceAlgo::None,
            group: GroupType::Global,
            start_level: None,
        };
        unsafe { fused_allreduce(&ctx, request).await.unwrap() };

        let decoded: Vec<f32> = out.iter().map(|bits| F16(*bits).to_f32()).collect();
        // Half precision bounds the error at roughly one part in 1024 of
        // the largest element.
        assert_close(&decoded, &[6.32478, 7.2628, 8.2009], 0.01);
    })
    .await;
}
