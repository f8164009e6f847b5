
use std::{
    sync::{Arc, Barrier},
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use num::complex::Complex32;
use regex::Regex;

use crate::prelude::*;

use harness::*;

// Evaluation tests against a recording backend

fn sum_of(dims: Dim4, ptr_a: u64, ptr_b: u64) -> NodeRef {
    let a = buffer(dims, ptr_a);
    let b = buffer(dims, ptr_b);
    Node::binary(BinaryOp::Add, &a, &b).unwrap()
}

fn kernel_names(source: &str) -> Vec<String> {
    let re = Regex::new(r"void\n(KER\d+)\(").unwrap();
    re.captures_iter(source).map(|c| c[1].to_string()).collect()
}

#[test]
fn test_shared_subexpression_is_computed_once() {
    // (a + b) * (a + b), built from one shared node
    let sum = sum_of([16, 1, 1, 1], 0x10, 0x20);
    let sq = Node::binary(BinaryOp::Mul, &sum, &sum).unwrap();
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_node(&output([16, 1, 1, 1], 0x30), &sq).unwrap();

    let source = &jit.backend().sources()[0].source;
    let defs = Regex::new(r"(?m)^\s+float val\d+ = ").unwrap();
    assert_eq!(defs.find_iter(source).count(), 4);
    assert_eq!(source.matches("Param<float> in").count(), 2);
    assert!(source.contains("float val3 = jit_mul(val2, val2);"));
    // 2 inputs, 1 output, 4 grid values
    assert_eq!(jit.backend().last_launch().args.len(), 7);
}

#[test]
fn test_same_structure_reuses_kernel() {
    let jit = recording_jit(RecordingBackend::default());
    let dims = [64, 1, 1, 1];
    for (i, value) in [1.0f32, -2.5, 7.0].into_iter().enumerate() {
        let base = 0x1000 * (i as u64 + 1);
        let scaled = Node::binary(
            BinaryOp::Mul,
            &sum_of(dims, base, base + 0x100),
            &Node::scalar(value),
        )
        .unwrap();
        jit.eval_node(&output(dims, base + 0x200), &scaled).unwrap();
    }
    assert_eq!(jit.backend().compiles(), 1);
    assert_eq!(jit.cache().len(), 1);

    let launches = jit.backend().launches();
    assert_eq!(launches.len(), 3);
    assert!(launches.iter().all(|l| l.function == launches[0].function));
    assert_eq!(param_arg(&launches[1], 0).ptr, 0x2000);
    assert_eq!(launches[2].args[2], KernelArg::Scalar(Scalar::F32(7.0)));
}

#[test]
fn test_different_structure_compiles_again() {
    let jit = recording_jit(RecordingBackend::default());
    let dims = [8, 1, 1, 1];
    let a = buffer(dims, 1);
    let b = buffer(dims, 2);
    jit.eval_node(&output(dims, 3), &Node::binary(BinaryOp::Add, &a, &b).unwrap())
        .unwrap();
    jit.eval_node(&output(dims, 3), &Node::binary(BinaryOp::Sub, &a, &b).unwrap())
        .unwrap();
    // Swapping operands only changes which buffer each parameter points at
    jit.eval_node(&output(dims, 3), &Node::binary(BinaryOp::Sub, &b, &a).unwrap())
        .unwrap();
    assert_eq!(jit.backend().compiles(), 2);
}

#[test]
fn test_concurrent_evals_compile_once() {
    let jit = Arc::new(recording_jit(RecordingBackend::with_compile_delay(
        Duration::from_millis(20),
    )));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles = (0..threads as u64)
        .map(|t| {
            let (jit, barrier) = (jit.clone(), barrier.clone());
            std::thread::spawn(move || {
                let dims = [300, 1, 1, 1];
                let node = sum_of(dims, t * 0x100, t * 0x100 + 0x10);
                barrier.wait();
                jit.eval_node(&output(dims, t * 0x100 + 0x20), &node)
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(jit.backend().compiles(), 1);
    assert_eq!(jit.backend().launches().len(), threads);
}

#[test]
fn test_contiguous_operands_use_flat_index() {
    let out = [4, 4, 1, 1];
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_node(&output(out, 0x30), &sum_of(out, 0x10, 0x20)).unwrap();

    let source = &jit.backend().sources()[0].source;
    assert!(source.contains("long long idx1 = idx;"));
    assert!(!source.contains("num_odims > 2"));
    let plan = jit.backend().last_launch().plan;
    assert_eq!(plan.threads, (256, 1, 1));
    assert_eq!(plan.blocks_x_total, 1);
}

#[test]
fn test_strided_operand_uses_general_index() {
    let out = [4, 4, 1, 1];
    let a = buffer(out, 0x10);
    // Every other row of a [4, 8] allocation
    let b = Node::buffer(Param::new(out, [1, 8, 32, 32], DevicePtr(0x20)), DType::F32);
    let sum = Node::binary(BinaryOp::Add, &a, &b).unwrap();
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_node(&output(out, 0x30), &sum).unwrap();

    let source = &jit.backend().sources()[0].source;
    assert!(source.contains("(id1 < in1.dims[1]) * in1.strides[1] * id1"));
    let launch = jit.backend().last_launch();
    assert_eq!(launch.plan.threads, (32, 8, 1));
    assert_eq!(param_arg(&launch, 1).strides, [1, 8, 32, 32]);
}

#[test]
fn test_strided_output_uses_general_index() {
    let out = [4, 4, 1, 1];
    let jit = recording_jit(RecordingBackend::default());
    let strided_out = Param::new(out, [1, 8, 32, 32], DevicePtr(0x30));
    jit.eval_node(&strided_out, &sum_of(out, 0x10, 0x20)).unwrap();
    assert_eq!(jit.backend().last_launch().plan.threads, (32, 8, 1));
}

#[test]
fn test_broadcast_operand() {
    let out = [4, 3, 1, 1];
    let matrix = buffer(out, 0x10);
    let column = buffer([4, 1, 1, 1], 0x20);
    let sum = Node::binary(BinaryOp::Add, &matrix, &column).unwrap();
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_node(&output(out, 0x30), &sum).unwrap();

    let launch = jit.backend().last_launch();
    assert_eq!(launch.plan.threads, (32, 8, 1));
    assert_eq!(launch.plan.num_odims, 2);
    assert_eq!(param_arg(&launch, 1).dims, [4, 1, 1, 1]);
}

#[test]
fn test_reshape_leaves_caller_graph_alone() {
    let a = buffer([8, 1, 1, 1], 0x10);
    let reshaped = Node::moddims(&a, [2, 4, 1, 1]).unwrap();
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_node(&output([2, 4, 1, 1], 0x20), &reshaped).unwrap();

    let folded = param_arg(&jit.backend().last_launch(), 0);
    assert_eq!(folded.dims, [2, 4, 1, 1]);
    assert_eq!(folded.strides, [1, 2, 8, 8]);
    assert_eq!(folded.ptr, 0x10);
    // Reshaped buffers are contiguous in the output's shape
    assert_eq!(jit.backend().last_launch().plan.threads, (256, 1, 1));

    let original = a.param().unwrap();
    assert_eq!(original.dims, [8, 1, 1, 1]);
    assert_eq!(original.strides, [1, 8, 8, 8]);

    // The same node can still be evaluated unreshaped
    jit.eval_node(&output([8, 1, 1, 1], 0x30), &a).unwrap();
    assert_eq!(param_arg(&jit.backend().last_launch(), 0).dims, [8, 1, 1, 1]);
}

#[test]
fn test_multiple_outputs_share_one_kernel() {
    let dims = [32, 2, 1, 1];
    let a = buffer(dims, 0x10);
    let b = buffer(dims, 0x20);
    let sum = Node::binary(BinaryOp::Add, &a, &b).unwrap();
    let exp = Node::unary(UnaryOp::Exp, &sum).unwrap();
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_nodes(&[output(dims, 0x30), output(dims, 0x40)], &[sum, exp])
        .unwrap();

    let source = &jit.backend().sources()[0].source;
    assert!(source.contains("out0.ptr[idx] = val2;"));
    assert!(source.contains("out1.ptr[idx] = val3;"));
    let launch = jit.backend().last_launch();
    assert_eq!(launch.args.len(), 2 + 2 + 4);
    assert_eq!(param_arg(&launch, 2).ptr, 0x30);
    assert_eq!(param_arg(&launch, 3).ptr, 0x40);
}

#[test]
fn test_nothing_to_do() {
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_nodes(&[], &[]).unwrap();
    jit.eval_node(&output([0, 4, 1, 1], 0x20), &buffer([0, 4, 1, 1], 0x10))
        .unwrap();
    assert_eq!(jit.backend().compiles(), 0);
    assert!(jit.backend().launches().is_empty());
}

#[test]
fn test_output_validation() {
    let jit = recording_jit(RecordingBackend::default());
    let dims = [4, 1, 1, 1];
    let node = sum_of(dims, 1, 2);

    let err = jit
        .eval_nodes(&[output(dims, 3), output(dims, 4)], &[node.clone()])
        .unwrap_err();
    assert!(matches!(
        err,
        JitError::OutputCountMismatch {
            outputs: 2,
            nodes: 1
        }
    ));

    let err = jit
        .eval_nodes(
            &[output(dims, 3), output([2, 2, 1, 1], 4)],
            &[node.clone(), node.clone()],
        )
        .unwrap_err();
    assert!(matches!(err, JitError::OutputShapeMismatch { index: 1, .. }));

    let padded = Param::new([4, 2, 1, 1], [1, 8, 16, 16], DevicePtr(4));
    let err = jit
        .eval_nodes(
            &[output([4, 2, 1, 1], 3), padded],
            &[node.clone(), node],
        )
        .unwrap_err();
    assert!(matches!(err, JitError::OutputStrideMismatch { index: 1, .. }));
    assert_eq!(jit.backend().compiles(), 0);
}

#[test]
fn test_failed_compile_leaves_clean_state() {
    let jit = recording_jit(RecordingBackend::failing());
    let mut ws = Workspace::new();
    let dims = [4, 1, 1, 1];
    let err = jit
        .eval_nodes_with(&mut ws, &[output(dims, 3)], &[sum_of(dims, 1, 2)])
        .unwrap_err();
    assert!(matches!(err, JitError::Compile { .. }));
    assert!(ws.is_empty());
    assert!(jit.cache().is_empty());
    assert!(jit.backend().launches().is_empty());
}

#[test]
fn test_large_output_respects_grid_limits() {
    let limits = GridLimits {
        max_x: 65535,
        ..Default::default()
    };
    let jit = recording_jit(RecordingBackend::with_limits(limits));
    let dims = [10_000_000, 1, 1, 1];
    jit.eval_node(&output(dims, 3), &sum_of(dims, 1, 2)).unwrap();
    let plan = jit.backend().last_launch().plan;
    assert!(plan.blocks.0 as u64 <= limits.max_x);
    assert!(plan.blocks.0 as u64 * plan.repeat as u64 * 256 >= 10_000_000);
}

#[test]
fn test_kernel_dump() {
    let dir = std::env::temp_dir().join(format!("fusion_jit_eval_dump_{}", std::process::id()));
    let jit = Jit::new(
        RecordingBackend::default(),
        JitConfig {
            kernel_dump_dir: Some(dir.clone()),
            ..Default::default()
        },
    );
    let dims = [4, 1, 1, 1];
    jit.eval_node(&output(dims, 3), &sum_of(dims, 1, 2)).unwrap();
    jit.eval_node(&output(dims, 6), &sum_of(dims, 4, 5)).unwrap();

    let source = &jit.backend().sources()[0].source;
    let names = kernel_names(source);
    assert_eq!(names.len(), 1);
    let dumped = std::fs::read_dir(&dir).unwrap().count();
    assert_eq!(dumped, 1);
    let path = dir.join(format!("{}.cu", names[0]));
    assert_eq!(&std::fs::read_to_string(path).unwrap(), source);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_engine_keeps_given_config() {
    let config = JitConfig {
        kernel_dump_dir: Some("/nonexistent/kernels".into()),
        cuda_arch: Some("sm_90".into()),
        include_paths: vec![],
    };
    let jit = Jit::new(RecordingBackend::default(), config.clone());
    assert_eq!(jit.config(), &config);
}

#[test]
fn test_zero_grid_limits_fail_before_launch() {
    let jit = recording_jit(RecordingBackend::with_limits(GridLimits {
        max_y: 0,
        ..Default::default()
    }));
    let dims = [40, 3, 1, 1];
    let err = jit
        .eval_node(&output(dims, 3), &sum_of(dims, 1, 2))
        .unwrap_err();
    assert!(matches!(err, JitError::LaunchConfig(_)));
    assert!(jit.backend().launches().is_empty());
}

#[test]
fn test_complex_scale() {
    let dims = [32, 1, 1, 1];
    let z = Node::buffer_of::<Complex32>(output(dims, 0x10));
    let k = Complex32::new(0.0, 1.0);
    let rotated = Node::binary(BinaryOp::Mul, &z, &Node::scalar(k)).unwrap();
    let jit = recording_jit(RecordingBackend::default());
    jit.eval_node(&output(dims, 0x20), &rotated).unwrap();

    let source = &jit.backend().sources()[0].source;
    assert!(source.contains("Param<cfloat> in0,\n    cfloat scalar1,"));
    assert!(source.contains("cfloat val2 = jit_cmul(val0, val1);"));
    let launch = jit.backend().last_launch();
    assert_eq!(launch.args[1], KernelArg::Scalar(Scalar::C32(k)));
    assert_eq!(param_arg(&launch, 2).ptr, 0x20);
}

/// A random expression over `leaves`, built bottom-up.
fn random_expr(rng: &mut StdRng, leaves: &[NodeRef], ops: usize) -> NodeRef {
    let mut pool = leaves.to_vec();
    for _ in 0..ops {
        let a = pool[rng.gen_range(0..pool.len())].clone();
        let node = match rng.gen_range(0..4) {
            0 => Node::unary(UnaryOp::Exp, &a).unwrap(),
            1 => Node::binary(BinaryOp::Max, &a, &Node::scalar(rng.gen::<f32>())).unwrap(),
            _ => {
                let b = pool[rng.gen_range(0..pool.len())].clone();
                let op = if rng.gen() { BinaryOp::Add } else { BinaryOp::Mul };
                Node::binary(op, &a, &b).unwrap()
            }
        };
        pool.push(node);
    }
    pool.pop().unwrap()
}

#[test]
fn test_random_graphs_are_deterministic() {
    let dims = [128, 1, 1, 1];
    for seed in 0..10 {
        let jit = recording_jit(RecordingBackend::default());
        for copy in 0..2u64 {
            // Same seed, so the same structure over different allocations
            let mut rng = StdRng::seed_from_u64(seed);
            let leaves = (0..3)
                .map(|i| buffer(dims, 0x1000 * (copy + 1) + i))
                .collect::<Vec<_>>();
            let expr = random_expr(&mut rng, &leaves, 12);
            jit.eval_node(&output(dims, 0x9000 + copy), &expr).unwrap();
        }
        assert_eq!(jit.backend().compiles(), 1, "seed {seed}");

        let source = &jit.backend().sources()[0].source;
        // Every value is defined exactly once, before it's written out
        let defs = Regex::new(r"val(\d+) = ").unwrap();
        let mut ids = defs
            .captures_iter(source)
            .map(|c| c[1].parse::<usize>().unwrap())
            .collect::<Vec<_>>();
        let count = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), count, "seed {seed}");
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "seed {seed}");
    }
}
