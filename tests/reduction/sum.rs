use adasum::{
    DataType, GroupType, ReduceAlgo, ReduceOp, ReductionRequest, TensorRegion, fused_allreduce,
};

use super::helpers::{assert_close, reduce_vec_f32, run_cluster};

#[tokio::test]
async fn test_sum_two_ranks() {
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let input: Vec<f32> = if rank == 0 {
            vec![4.0, 5.0, 6.0]
        } else {
            vec![7.0, 8.0, 9.0]
        };
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Sum, ReduceAlgo::None).await;
        assert_close(&output, &[11.0, 13.0, 15.0], 1e-6);
    })
    .await;
}

#[tokio::test]
async fn test_sum_three_ranks_non_power_of_two() {
    run_cluster(3, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let input: Vec<f32> = (0..5).map(|i| (i as f32) * ((rank + 1) as f32)).collect();
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Sum, ReduceAlgo::None).await;
        let expected: Vec<f32> = (0..5).map(|i| (i as f32) * 6.0).collect();
        assert_close(&output, &expected, 1e-6);
    })
    .await;
}

#[tokio::test]
async fn test_sum_four_ranks() {
    run_cluster(4, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let input = vec![(rank + 1) as f32; 8];
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Sum, ReduceAlgo::None).await;
        assert_close(&output, &vec![10.0; 8], 1e-6);
    })
    .await;
}

#[tokio::test]
async fn test_average_two_ranks() {
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let input: Vec<f32> = if rank == 0 {
            vec![4.0, 5.0, 6.0]
        } else {
            vec![7.0, 8.0, 9.0]
        };
        let output = reduce_vec_f32(&ctx, &input, ReduceOp::Average, ReduceAlgo::None).await;
        assert_close(&output, &[5.5, 6.5, 7.5], 1e-6);
    })
    .await;
}

#[tokio::test]
async fn test_sum_in_place_aliasing() {
    run_cluster(2, 1, |ctx| async move {
        let rank = ctx.rank(GroupType::Global).unwrap();
        let mut data: Vec<f32> = if rank == 0 {
            vec![1.0, 2.0]
        } else {
            vec![10.0, 20.0]
        };
        let region = [TensorRegion::new(data.as_mut_ptr() as u64, data.len())];
        let request = ReductionRequest {
            inputs: &region,
            outputs: &region,
            dtype: DataType::F32,
            op: ReduceOp::Sum,
            algo: ReduceAlgo::None,
            group: GroupType::Global,
            start_level: None,
        };
        unsafe { fused_allreduce(&ctx, request).await.unwrap() };
        assert_close(&data, &[11.0, 22.0], 1e-6);
    })
    .await;
}

#[tokio::test]
async fn test_sum_node_local_group_only() {
    // Two nodes of two ranks: a NodeLocal sum must combine only the
    // ranks sharing a node.
    run_cluster(4, 2, |ctx| async move {
        let world_rank = ctx.rank(GroupType::Global).unwrap();
        let input = vec![(world_rank + 1) as f32; 4];

        let mut output = vec![0f32; 4];
        let inputs = [TensorRegion::new(input.as_ptr() as u64, input.len())];
        let outputs = [TensorRegion::new(output.as_mut_ptr() as u64, output.len())];
        let request = ReductionRequest {
            inputs: &inputs,
            outputs: &outputs,
            dtype: DataType::F32,
            op: ReduceOp::Sum,
            algo: ReduceAlgo::None,
            group: GroupType::NodeLocal,
            start_level: None,
        };
        unsafe { fused_allreduce(&ctx, request).await.unwrap() };

        // Node 0 holds ranks {0, 1} -> 3.0; node 1 holds {2, 3} -> 7.0.
        let expected = if world_rank < 2 { 3.0 } else { 7.0 };
        assert_close(&output, &vec![expected; 4], 1e-6);
    })
    .await;
}
