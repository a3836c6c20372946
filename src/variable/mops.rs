use crate::{
  internal::*,
  shape::Shape,
  tensor::{ Tensor, Gemm, conv },
  variable::{ Variable, BinaryOp, UnaryOp },
  scalar::Real,
  ops::{ BaseOps, NumericOps, RealOps },
};


impl<T: Real> BaseOps<T> for Variable<T> {
  fn scalar(item: T) -> Self {
    Self::from_tensor(Tensor::scalar(item), false)
  }

  fn shape(&self) -> &Shape {
    self.tensor().shape()
  }

  fn broadcast(&self, shape: &Shape) -> Self {
    if self.shape().broadcast(shape).dims == self.shape().dims { return self.clone() }
    self.unary_op(Broadcast { dims: shape.dims.clone() })
  }

  fn reshape(&self, dims: &[usize]) -> Self {
    self.unary_op(Reshape { dims: dims.to_vec() })
  }

  fn unsqueeze(&self, dim: isize) -> Self {
    let shape = self.shape().unsqueeze(dim);
    self.reshape(&shape.dims)
  }
}

impl<T: Real> NumericOps<T> for Variable<T> {
  fn sum(&self, dim: isize) -> Self {
    self.unary_op(Sum { dim })
  }

  fn max(&self, dim: isize) -> Self {
    self.unary_op(Max { dim })
  }
}

impl<T: Real> RealOps<T> for Variable<T> {
  fn pow(&self, rhs: &Self) -> Self {
    let (lhs, rhs) = aligned(self, rhs);
    lhs.binary_op(Pow, &rhs)
  }

  fn log(&self) -> Self {
    self.unary_op(Log)
  }

  fn relu(&self) -> Self {
    self.unary_op(ReLU)
  }
}

// Broadcast both operands to their common shape, so that each
// derive sees operands whose dimensions already agree

fn aligned<T: Real>(lhs: &Variable<T>, rhs: &Variable<T>) -> (Variable<T>, Variable<T>) {
  if lhs.shape().dims == rhs.shape().dims {
    (lhs.clone(), rhs.clone())
  } else {
    (lhs.broadcast(rhs.shape()), rhs.broadcast(lhs.shape()))
  }
}

impl<T: Real> Variable<T> {
  pub fn max_pool2d(&self, size: usize) -> Self {
    self.unary_op(MaxPool2d { size })
  }

  /// Per-row cross entropy between raw scores and target
  /// distributions, with the softmax folded in for numerical
  /// stability of the gradient.

  pub fn softmax_cross_entropy(&self, labels: &Self) -> Self {
    self.binary_op(SoftmaxCrossEntropy, labels)
  }

  /// Randomly silence components with probability `1 - keep`,
  /// scaling the survivors to preserve the expected activation.
  /// Passes the input through unchanged unless `training` is set.

  pub fn dropout(&self, keep: T, training: bool) -> Self {
    if !training { return self.clone() }
    let mask = Tensor::fill(&self.shape().dims, keep).bernoulli::<T>() / keep;
    self * &mask.tracked()
  }
}

impl<T: Gemm> Variable<T> {
  pub fn mm(&self, rhs: &Self) -> Self {
    self.binary_op(MatMul, rhs)
  }

  /// Slide `kernels` across the two inner dimensions of a batch
  /// of channeled images. Zero-pads the input to preserve its
  /// spatial size when `same` is set.

  pub fn convolve2d(&self, kernels: &Self, same: bool) -> Self {
    self.binary_op(Convolve2d { same }, kernels)
  }
}

impl<T: Real> std::ops::Neg for &Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    self * -T::one()
  }
}

impl<T: Real> std::ops::Neg for Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

// Every combination of owned, borrowed and scalar operands records
// the same graph node, with plain scalars lifted into constant
// Variables first

macro_rules! variable_operator {
  ($op:ident, $meth:ident, $symbol:tt) => {
    impl<T: Real> std::ops::$op for &Variable<T> {
      type Output = Variable<T>;

      fn $meth(self, rhs: Self) -> Variable<T> {
        let (lhs, rhs) = aligned(self, rhs);
        lhs.binary_op($op, &rhs)
      }
    }

    impl<T: Real> std::ops::$op for Variable<T> {
      type Output = Variable<T>;

      fn $meth(self, rhs: Self) -> Variable<T> {
        &self $symbol &rhs
      }
    }

    impl<T: Real> std::ops::$op<Variable<T>> for &Variable<T> {
      type Output = Variable<T>;

      fn $meth(self, rhs: Variable<T>) -> Variable<T> {
        self $symbol &rhs
      }
    }

    impl<T: Real> std::ops::$op<&Variable<T>> for Variable<T> {
      type Output = Variable<T>;

      fn $meth(self, rhs: &Variable<T>) -> Variable<T> {
        &self $symbol rhs
      }
    }

    impl<T: Real> std::ops::$op<T> for &Variable<T> {
      type Output = Variable<T>;

      fn $meth(self, rhs: T) -> Variable<T> {
        self $symbol &Tensor::scalar(rhs).tracked()
      }
    }

    impl<T: Real> std::ops::$op<T> for Variable<T> {
      type Output = Variable<T>;

      fn $meth(self, rhs: T) -> Variable<T> {
        &self $symbol &Tensor::scalar(rhs).tracked()
      }
    }

    impl std::ops::$op<&Variable<f32>> for f32 {
      type Output = Variable<f32>;

      fn $meth(self, rhs: &Variable<f32>) -> Variable<f32> {
        Tensor::scalar(self).tracked() $symbol rhs
      }
    }

    impl std::ops::$op<Variable<f32>> for f32 {
      type Output = Variable<f32>;

      fn $meth(self, rhs: Variable<f32>) -> Variable<f32> {
        Tensor::scalar(self).tracked() $symbol &rhs
      }
    }
  };
}

variable_operator!(Add, add, +);
variable_operator!(Sub, sub, -);
variable_operator!(Mul, mul, *);
variable_operator!(Div, div, /);


#[derive(Debug, Clone)]
pub struct Add;

impl<T: Real> BinaryOp<T> for Add {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs + rhs
  }

  fn derive(&self, _lhs: &Tensor<T>, _rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad.clone(),
    grad.clone(),
  )}
}


#[derive(Debug, Clone)]
pub struct Sub;

impl<T: Real> BinaryOp<T> for Sub {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs - rhs
  }

  fn derive(&self, _lhs: &Tensor<T>, _rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad.clone(),
    -grad
  )}
}


#[derive(Debug, Clone)]
pub struct Mul;

impl<T: Real> BinaryOp<T> for Mul {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs * rhs
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad * rhs,
    grad * lhs,
  )}
}


#[derive(Debug, Clone)]
pub struct Div;

impl<T: Real> BinaryOp<T> for Div {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs / rhs
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad / rhs,
    -grad * lhs / rhs / rhs
  )}
}


#[derive(Debug, Clone)]
pub struct MatMul;

impl<T: Gemm> BinaryOp<T> for MatMul {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs.mm(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad.mm(&rhs.transpose(-1, -2)),
    lhs.transpose(-1, -2).mm(grad),
  )}
}


#[derive(Debug, Clone)]
pub struct Broadcast {
  dims: Vec<usize>,
}

impl<T: Real> UnaryOp<T> for Broadcast {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.broadcast(&Shape::new(&self.dims))
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    let shape = lhs.shape().broadcast(&Shape::new(&self.dims));
    let mut grad = grad.clone();
    // Dimensions the input was repeated along have their
    // gradient entries collapsed back into one
    for (d, &stride) in shape.strides.iter().enumerate().rev() {
      if stride == 0 {
        grad = grad.sum_over(d as isize);
      }
    }
    grad
  }
}


#[derive(Debug, Clone)]
pub struct Reshape {
  dims: Vec<usize>,
}

impl<T: Real> UnaryOp<T> for Reshape {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.reshape(&self.dims)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad.reshape(&lhs.shape().dims)
  }
}


#[derive(Debug, Clone)]
pub struct Pow;

impl<T: Real> BinaryOp<T> for Pow {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    lhs.pow(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>)
  {(
    grad * rhs * lhs.pow(&(rhs - T::one())),
    grad * lhs.pow(rhs) * lhs.log(),
  )}
}


#[derive(Debug, Clone)]
pub struct Log;

impl<T: Real> UnaryOp<T> for Log {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.log()
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad / lhs
  }
}


#[derive(Debug, Clone)]
pub struct Sum {
  dim: isize,
}

impl<T: Real> UnaryOp<T> for Sum {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.sum(self.dim)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    uncollapse(self.dim, lhs, grad)
  }
}

fn uncollapse<T: Real>(dim: isize, tensor: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
  let rank = tensor.shape().rank();
  let dim = negative_index(dim, rank, false);
  let removed = rank - dim;
  let mut grad = grad.clone();
  for _ in 0..removed {
    grad = grad.unsqueeze(-1);
  }
  grad
}


#[derive(Debug, Clone)]
pub struct Max {
  dim: isize,
}

impl<T: Real> UnaryOp<T> for Max {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.max(self.dim)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    // Route each collapsed gradient entry to the first
    // maximum of its group
    let dim = negative_index(self.dim, lhs.rank(), false);
    let span: usize = lhs.shape().dims[dim..].iter().product();
    let gvals: Vec<T> = grad.param_iter().collect();
    let mut out = vec![T::zero(); lhs.size()];
    let mut best = T::zero();
    let mut best_at = 0;
    for (i, value) in lhs.param_iter().enumerate() {
      let j = i % span;
      if j == 0 || value > best {
        best = value;
        best_at = i;
      }
      if j == span - 1 {
        out[best_at] += gvals[i / span];
      }
    }
    Tensor::new(&lhs.shape().dims, out)
  }
}


#[derive(Debug, Clone)]
pub struct ReLU;

impl<T: Real> UnaryOp<T> for ReLU {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    lhs.relu()
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    grad * lhs.gt(&Tensor::scalar(T::zero())).numeric()
  }
}


#[derive(Debug, Clone)]
pub struct Convolve2d {
  same: bool,
}

impl<T: Gemm> BinaryOp<T> for Convolve2d {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    conv::convolve2d(lhs, rhs, self.same)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    conv::convolve2d_backward(lhs, rhs, grad, self.same)
  }
}


#[derive(Debug, Clone)]
pub struct MaxPool2d {
  size: usize,
}

impl<T: Real> UnaryOp<T> for MaxPool2d {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T> {
    conv::max_pool2d(lhs, self.size)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T> {
    conv::max_pool2d_backward(lhs, grad, self.size)
  }
}


#[derive(Debug, Clone)]
pub struct SoftmaxCrossEntropy;

impl<T: Real> BinaryOp<T> for SoftmaxCrossEntropy {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T> {
    assert_eq!(lhs.rank(), 2,
      "Cross entropy expects batched scores, got {}", lhs.shape());
    assert_eq!(lhs.shape().dims, rhs.shape().dims,
      "Scores {} and targets {} differ in shape", lhs.shape(), rhs.shape());
    let classes = lhs.shape()[-1];
    let scores: Vec<T> = lhs.param_iter().collect();
    let targets: Vec<T> = rhs.param_iter().collect();
    let data = scores.chunks(classes)
      .zip(targets.chunks(classes))
      .map(|(row, want)| {
        let lse = log_sum_exp(row);
        row.iter().zip(want.iter())
          .map(|(&x, &l)| l * (lse - x) )
          .fold(T::zero(), |acc, v| acc + v )
      })
      .collect();
    Tensor::new(&lhs.shape().dims[..1], data)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>) {
    let classes = lhs.shape()[-1];
    let scores: Vec<T> = lhs.param_iter().collect();
    let targets: Vec<T> = rhs.param_iter().collect();
    let gvals: Vec<T> = grad.param_iter().collect();
    let mut grad_l = vec![T::zero(); scores.len()];
    let mut grad_r = vec![T::zero(); scores.len()];
    for (i, (row, want)) in scores.chunks(classes).zip(targets.chunks(classes)).enumerate() {
      let lse = log_sum_exp(row);
      let mass = want.iter().fold(T::zero(), |acc, &l| acc + l );
      let g = gvals[i];
      for j in 0..classes {
        let softmax = (row[j] - lse).exp();
        grad_l[i * classes + j] = g * (softmax * mass - want[j]);
        grad_r[i * classes + j] = g * (lse - row[j]);
      }
    }
    (Tensor::new(&lhs.shape().dims, grad_l), Tensor::new(&rhs.shape().dims, grad_r))
  }
}

fn log_sum_exp<T: Real>(row: &[T]) -> T {
  let max = row.iter().fold(row[0], |acc, &v| if v > acc { v } else { acc } );
  let sum = row.iter().fold(T::zero(), |acc, &v| acc + (v - max).exp() );
  max + sum.ln()
}
