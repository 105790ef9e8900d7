use tensorforge::autodiff::{ops, Context, Variable};
use tensorforge::tensor::NdArray;

fn train() -> Context {
    Context::train()
}

/// Scenario 1: shape and broadcast.
#[test]
fn broadcast_add_and_sum_to_gradient() {
    let ctx = train();
    let a = Variable::new_with_grad(NdArray::ones(&[2, 3]));
    let b = Variable::new_with_grad(NdArray::of(vec![1.0, 2.0, 3.0], Some(&[1, 3])).unwrap());

    let sum = ops::add(&a, &b, &ctx).unwrap();
    assert_eq!(sum.value().as_slice().unwrap(), &[2.0, 3.0, 4.0, 2.0, 3.0, 4.0]);

    let loss = ops::sum(&ops::sum(&sum, 0, &ctx).unwrap(), 1, &ctx).unwrap();
    loss.backward().unwrap();

    let b_grad = b.grad().unwrap();
    assert_eq!(b_grad.as_slice().unwrap(), &[2.0, 2.0, 2.0]);
}

/// Scenario 2: softmax stability.
#[test]
fn softmax_is_stable_for_large_magnitude_logits() {
    let x = NdArray::of(vec![1000.0, 1001.0, 999.0], Some(&[1, 3])).unwrap();
    let probs = x.softmax(-1).unwrap();
    let expected = [0.2447, 0.6652, 0.0900];
    for (got, want) in probs.as_slice().unwrap().iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        assert!(got.is_finite());
    }
    let row_sum: f32 = probs.as_slice().unwrap().iter().sum();
    assert!((row_sum - 1.0).abs() < 1e-6);
}

/// Scenario 3: autodiff chain x^3.
#[test]
fn cubic_chain_backward_matches_3x_squared() {
    let ctx = train();
    let x = Variable::new_with_grad(NdArray::of(vec![2.0], Some(&[1])).unwrap());
    let y = ops::square(&x, &ctx).unwrap();
    let z = ops::mul(&y, &x, &ctx).unwrap();
    assert_eq!(z.value().get(&[0]).unwrap(), 8.0);

    z.backward().unwrap();
    assert_eq!(x.grad().unwrap().get(&[0]).unwrap(), 12.0);
}

/// Scenario 4: matmul gradient.
#[test]
fn matmul_gradient_distributes_ones_correctly() {
    let ctx = train();
    let a = Variable::new_with_grad(NdArray::ones(&[2, 3]));
    let b = Variable::new_with_grad(NdArray::ones(&[3, 4]));
    let c = ops::matmul(&a, &b, &ctx).unwrap();
    assert_eq!(c.shape().dims(), &[2, 4]);
    assert!(c.value().as_slice().unwrap().iter().all(|&v| v == 3.0));

    let loss = ops::sum(&ops::sum(&c, 0, &ctx).unwrap(), 1, &ctx).unwrap();
    loss.backward().unwrap();

    assert!(a.grad().unwrap().as_slice().unwrap().iter().all(|&v| v == 4.0));
    assert!(b.grad().unwrap().as_slice().unwrap().iter().all(|&v| v == 2.0));
}

/// Generation invariant: a Variable's generation is one more than the max
/// of its inputs' generations.
#[test]
fn generation_is_one_plus_max_input_generation() {
    let ctx = train();
    let a = Variable::new_with_grad(NdArray::zeros(&[2]));
    let b = ops::relu(&a, &ctx).unwrap();
    let c = ops::exp(&b, &ctx).unwrap();
    let d = ops::add(&a, &c, &ctx).unwrap();
    assert_eq!(b.generation(), a.generation() + 1);
    assert_eq!(c.generation(), b.generation() + 1);
    assert_eq!(d.generation(), a.generation().max(c.generation()) + 1);
}

/// Transpose and reshape are mutual inverses.
#[test]
fn transpose_twice_and_reshape_round_trip() {
    let x = NdArray::of((0..12).map(|v| v as f32).collect(), Some(&[3, 4])).unwrap();
    let back = x.transpose().unwrap().transpose().unwrap();
    assert_eq!(x.as_slice().unwrap(), back.as_slice().unwrap());

    let reshaped = x.reshape(&[2, 6]).unwrap().reshape(&[3, 4]).unwrap();
    assert_eq!(x.as_slice().unwrap(), reshaped.as_slice().unwrap());
}

/// Clone preserves gradient flow; detach zeroes it.
#[test]
fn clone_propagates_gradient_detach_does_not() {
    let ctx = train();
    let x = Variable::new_with_grad(NdArray::of(vec![3.0], Some(&[1])).unwrap());

    let cloned = ops::clone_var(&x, &ctx).unwrap();
    assert_eq!(cloned.value().get(&[0]).unwrap(), 3.0);
    let loss = ops::mul_scalar(&cloned, 2.0, &ctx).unwrap();
    loss.backward().unwrap();
    assert_eq!(x.grad().unwrap().get(&[0]).unwrap(), 2.0);

    let x2 = Variable::new_with_grad(NdArray::of(vec![3.0], Some(&[1])).unwrap());
    let detached = ops::detach(&x2, &ctx).unwrap();
    assert!(!detached.requires_grad());
    assert_eq!(detached.value().get(&[0]).unwrap(), 3.0);
}

/// Gather / ScatterAdd round trip through a zero buffer.
#[test]
fn scatter_then_gather_round_trips() {
    let ctx = train();
    let rows = Variable::new_with_grad(NdArray::of(vec![1.0, 2.0, 3.0, 4.0], Some(&[2, 2])).unwrap());
    let scattered = ops::scatter_add(&rows, &[3, 1], 5, &ctx).unwrap();
    assert_eq!(scattered.shape().dims(), &[5, 2]);

    let gathered = ops::gather(&scattered, &[3, 1], &[2], &ctx).unwrap();
    assert_eq!(gathered.value().as_slice().unwrap(), rows.value().as_slice().unwrap());
}

/// Broadcasting to an incompatible shape is a reported error, not a panic.
#[test]
fn broadcast_to_incompatible_shape_errors() {
    let x = NdArray::ones(&[1, 3]);
    assert!(x.broadcast_to(&[2, 4]).is_err());
}
