use adasum::{
    DataType, GroupType, OpAttributes, OpRegistry, ReduceAlgo, ReduceOp, TensorRegion,
};

use super::helpers::{assert_close, run_cluster};

#[tokio::test]
async fn test_registry_dispatched_adasum() {
    run_cluster(2, 1, |ctx| async move {
        let registry = OpRegistry::with_builtin_ops();
        let op = registry
            .create(
                "adasum_allreduce",
                OpAttributes {
                    op: ReduceOp::Adasum,
                    algo: ReduceAlgo::None,
                    group: GroupType::Global,
                },
            )
            .unwrap();

        let rank = ctx.rank(GroupType::Global).unwrap();
        let input: Vec<f32> = if rank == 0 {
            vec![4.0, 5.0, 6.0]
        } else {
            vec![7.0, 8.0, 9.0]
        };
        let mut output = vec![0f32; 3];
        let inputs = [TensorRegion::new(input.as_ptr() as u64, input.len())];
        let outputs = [TensorRegion::new(output.as_mut_ptr() as u64, output.len())];

        unsafe {
            op.execute(&ctx, &inputs, &outputs, DataType::F32)
                .await
                .unwrap();
        }
        assert_close(&output, &[5.6301, 6.5235, 7.4169], 1e-3);
    })
    .await;
}

#[tokio::test]
async fn test_registry_dispatched_sum() {
    run_cluster(2, 1, |ctx| async move {
        let registry = OpRegistry::with_builtin_ops();
        let op = registry.create("allreduce", OpAttributes::default()).unwrap();

        let rank = ctx.rank(GroupType::Global).unwrap();
        let input = vec![(rank + 1) as f32; 4];
        let mut output = vec![0f32; 4];
        let inputs = [TensorRegion::new(input.as_ptr() as u64, input.len())];
        let outputs = [TensorRegion::new(output.as_mut_ptr() as u64, output.len())];

        unsafe {
            op.execute(&ctx, &inputs, &outputs, DataType::F32)
                .await
                .unwrap();
        }
        assert_close(&output, &[3.0, 3.0, 3.0, 3.0], 1e-6);
    })
    .await;
}
