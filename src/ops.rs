use std::ops::{ Add, Sub, Mul, Div };

use crate::internal::*;
use crate::Shape;
use crate::scalar::{ Element, Numeric, Real };


/// Shape changing operations, available for any [Element] type.

pub trait BaseOps<I: Element>: Clone {
  fn scalar(item: I) -> Self;
  fn shape(&self) -> &Shape;
  fn broadcast(&self, shape: &Shape) -> Self;
  fn reshape(&self, dims: &[usize]) -> Self;
  fn unsqueeze(&self, dim: isize) -> Self;
}


/// Arithmetic and reductions, available for any [Numeric] element
/// type.

pub trait NumericOps<I: Numeric>:
  Sized
  + Add<Output=Self> + Sub<Output=Self> + Mul<Output=Self> + Div<Output=Self>
  + Add<I, Output=Self> + Sub<I, Output=Self> + Mul<I, Output=Self> + Div<I, Output=Self>
{
  fn sum(&self, dim: isize) -> Self;
  fn max(&self, dim: isize) -> Self;
}


/// Operations restricted to [Real] element types.

pub trait RealOps<I: Real>: std::ops::Neg {
  fn pow(&self, rhs: &Self) -> Self;
  fn log(&self) -> Self;
  fn relu(&self) -> Self;
}


/// Compound operations, defined entirely in terms of the other
/// operation traits. Calling them on a [Variable](crate::Variable)
/// therefore yields gradients automatically.

pub trait Hops<I>: BaseOps<I> + NumericOps<I> + RealOps<I>
where
  I: Real,
  for<'a> &'a Self:
    Add<&'a Self, Output=Self> + Sub<&'a Self, Output=Self> +
    Mul<&'a Self, Output=Self> + Div<&'a Self, Output=Self> +
    Add<I, Output=Self> + Sub<I, Output=Self> +
    Mul<I, Output=Self> + Div<I, Output=Self>,
{
  fn powf(&self, exp: I) -> Self {
    self.pow(&Self::scalar(exp))
  }

  fn sqr(&self) -> Self {
    self * self
  }

  fn sqrt(&self) -> Self {
    self.powf(I::from(0.5).unwrap())
  }

  fn exp(&self) -> Self {
    let base = I::from(std::f64::consts::E).unwrap();
    Self::scalar(base).pow(self)
  }

  /// Mean over all dimensions from `dim` onwards.

  fn mean(&self, dim: isize) -> Self {
    let dim = negative_index(dim, self.shape().rank(), false);
    let count: usize = self.shape().dims[dim..].iter().product();
    self.sum(dim as isize) / I::from(count).unwrap()
  }

  /// Softmax along `dim`, shifted by the row maximum for stability.

  fn softmax(&self, dim: isize) -> Self {
    let shifted = (self - &self.max(dim).unsqueeze(-1)).exp();
    &shifted / &shifted.sum(dim).unsqueeze(-1)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::Tensor;

  #[test]
  fn mean_collapses_trailing_dimensions() {
    let a = Tensor::new(&[2,3], vec![1., 2., 3., 4., 5., 6.]).trained();
    assert_eq!(a.mean(0).tensor(), &Tensor::vec(&[3.5]));
    assert_eq!(a.mean(-1).tensor(), &Tensor::vec(&[2.0, 5.0]));
  }

  #[test]
  fn softmax_rows_are_distributions() {
    let a = Tensor::arrange(&[3,2], 1.0, 1.0).softmax(-1);
    for row in a.iter(0) {
      assert!((row.sum(0).item() - 1.0f32).abs() < 1e-6);
      assert!(row.at(&[0]).item() < row.at(&[1]).item());
    }
  }

  #[test]
  fn square_matches_product() {
    let a = Tensor::vec(&[1.5, -2.0, 0.0]);
    assert_eq!(a.sqr(), Tensor::vec(&[2.25, 4.0, 0.0]));
  }
}
