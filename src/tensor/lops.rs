use crate::{
  shape::Shape,
  tensor::Tensor,
  scalar::{ Element, Numeric, Signed, Real },
  ops::{ BaseOps, NumericOps, RealOps },
};


impl<T: Element> BaseOps<T> for Tensor<T> {
  fn scalar(item: T) -> Self {
    Self::new(&[], vec![item])
  }

  fn shape(&self) -> &Shape {
    &self.shape
  }

  fn broadcast(&self, shape: &Shape) -> Self {
    Self {
      shape: self.shape.broadcast(shape),
      data: self.data.clone(),
    }
  }

  fn reshape(&self, dims: &[usize]) -> Self {
    self.contiguous().view(dims)
  }

  fn unsqueeze(&self, dim: isize) -> Self {
    Self {
      shape: self.shape.unsqueeze(dim),
      data: self.data.clone(),
    }
  }
}

impl<T: Numeric> NumericOps<T> for Tensor<T> {
  fn sum(&self, dim: isize) -> Self {
    self.collapse(dim, |values| values.param_iter().sum() )
  }

  fn max(&self, dim: isize) -> Self {
    self.collapse(dim, |values| {
      values.param_iter()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal) )
        .unwrap()
    })
  }
}

impl<T: Real> RealOps<T> for Tensor<T> {
  fn pow(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a.powf(b) )
  }

  fn log(&self) -> Self {
    self.vectorize(|a| a.ln() )
  }

  fn relu(&self) -> Self {
    self.vectorize(|a| a.max(T::zero()) )
  }
}

impl<T: Signed> std::ops::Neg for &Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    self.vectorize(|a| -a )
  }
}

impl<T: Signed> std::ops::Neg for Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

// Every combination of owned, borrowed and scalar operands routes
// into the broadcasting methods on Tensor

macro_rules! binary_operator {
  ($trait:ident, $meth:ident, $symbol:tt) => {
    impl<T: Numeric> std::ops::$trait for &Tensor<T> {
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        self.$meth(rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait for Tensor<T> {
      type Output = Tensor<T>;

      fn $meth(self, rhs: Self) -> Tensor<T> {
        (&self).$meth(&rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait<Tensor<T>> for &Tensor<T> {
      type Output = Tensor<T>;

      fn $meth(self, rhs: Tensor<T>) -> Tensor<T> {
        self.$meth(&rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait<&Tensor<T>> for Tensor<T> {
      type Output = Tensor<T>;

      fn $meth(self, rhs: &Tensor<T>) -> Tensor<T> {
        (&self).$meth(rhs)
      }
    }

    impl<T: Numeric> std::ops::$trait<T> for &Tensor<T> {
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        self.vectorize(|a| a $symbol rhs )
      }
    }

    impl<T: Numeric> std::ops::$trait<T> for Tensor<T> {
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        (&self) $symbol rhs
      }
    }

    impl std::ops::$trait<&Tensor<f32>> for f32 {
      type Output = Tensor<f32>;

      fn $meth(self, tensor: &Tensor<f32>) -> Tensor<f32> {
        Tensor::scalar(self) $symbol tensor
      }
    }

    impl std::ops::$trait<Tensor<f32>> for f32 {
      type Output = Tensor<f32>;

      fn $meth(self, tensor: Tensor<f32>) -> Tensor<f32> {
        Tensor::scalar(self) $symbol &tensor
      }
    }

    impl std::ops::$trait<&Tensor<f64>> for f64 {
      type Output = Tensor<f64>;

      fn $meth(self, tensor: &Tensor<f64>) -> Tensor<f64> {
        Tensor::scalar(self) $symbol tensor
      }
    }

    impl std::ops::$trait<Tensor<f64>> for f64 {
      type Output = Tensor<f64>;

      fn $meth(self, tensor: Tensor<f64>) -> Tensor<f64> {
        Tensor::scalar(self) $symbol &tensor
      }
    }
  };
}

binary_operator!(Add, add, +);
binary_operator!(Sub, sub, -);
binary_operator!(Mul, mul, *);
binary_operator!(Div, div, /);


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sum_collapses_trailing_dimensions() {
    let a = Tensor::new(&[3,2], vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(a.sum(0), Tensor::new(&[], vec![21]));
    assert_eq!(a.sum(-1), Tensor::new(&[3], vec![3, 7, 11]));
  }

  #[test]
  fn max_collapses_trailing_dimensions() {
    let a = Tensor::new(&[2,3], vec![1., 5., 3., 4., 2., 6.]);
    assert_eq!(a.max(-1), Tensor::vec(&[5., 6.]));
    assert_eq!(a.max(0), Tensor::scalar(6.));
  }

  #[test]
  fn relu_clamps_negatives() {
    let a = Tensor::vec(&[-1.5, 0.0, 2.5]);
    assert_eq!(a.relu(), Tensor::vec(&[0.0, 0.0, 2.5]));
  }

  #[test]
  fn powers_and_logs() {
    let a = Tensor::vec(&[1.0, 4.0]);
    let b = Tensor::vec(&[2.0, 0.5]);
    assert_eq!(a.pow(&b), Tensor::vec(&[1.0f32.powf(2.0), 4.0f32.powf(0.5)]));
    assert_eq!(a.log(), Tensor::vec(&[0.0, 4.0f32.ln()]));
  }

  #[test]
  fn operators_combine_all_operand_forms() {
    let a = Tensor::vec(&[1., 2., 3.]);
    let b = Tensor::vec(&[4., 5., 6.]);
    assert_eq!(&a + &b, Tensor::vec(&[5., 7., 9.]));
    assert_eq!(&b - 1.0, Tensor::vec(&[3., 4., 5.]));
    assert_eq!(2.0 * &a, Tensor::vec(&[2., 4., 6.]));
    assert_eq!(&b / &a, Tensor::vec(&[4., 2.5, 2.]));
    assert_eq!(-&a, Tensor::vec(&[-1., -2., -3.]));
  }

  #[test]
  fn operands_broadcast_together() {
    let a = Tensor::new(&[2,2], vec![1., 2., 3., 4.]);
    let row = Tensor::vec(&[10., 20.]);
    assert_eq!(&a + &row, Tensor::new(&[2,2], vec![11., 22., 13., 24.]));
  }
}
