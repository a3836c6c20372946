use crate::{
  tensor::Tensor,
  scalar::Real,
  ops::BaseOps,
};


/// Scalar types backed by a fused multiply kernel.
///
/// Computes `C = alpha * A @ B + beta * C` on raw slices, with
/// arbitrary row and column strides per operand. Transposed
/// operands therefore multiply without being copied first.

pub trait Gemm: Real {
  fn gemm(
    m: usize, k: usize, n: usize,
    alpha: Self,
    a: &[Self], rsa: isize, csa: isize,
    b: &[Self], rsb: isize, csb: isize,
    beta: Self,
    c: &mut [Self], rsc: isize, csc: isize,
  );
}

impl Gemm for f32 {
  #[cfg(feature = "unsafe")]
  fn gemm(
    m: usize, k: usize, n: usize,
    alpha: Self,
    a: &[Self], rsa: isize, csa: isize,
    b: &[Self], rsb: isize, csb: isize,
    beta: Self,
    c: &mut [Self], rsc: isize, csc: isize,
  ) {
    unsafe {
      matrixmultiply::sgemm(
        m, k, n,
        alpha,
        a.as_ptr(), rsa, csa,
        b.as_ptr(), rsb, csb,
        beta,
        c.as_mut_ptr(), rsc, csc,
      )
    }
  }

  #[cfg(not(feature = "unsafe"))]
  fn gemm(
    m: usize, k: usize, n: usize,
    alpha: Self,
    a: &[Self], rsa: isize, csa: isize,
    b: &[Self], rsb: isize, csb: isize,
    beta: Self,
    c: &mut [Self], rsc: isize, csc: isize,
  ) {
    naive_gemm(m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc)
  }
}

impl Gemm for f64 {
  #[cfg(feature = "unsafe")]
  fn gemm(
    m: usize, k: usize, n: usize,
    alpha: Self,
    a: &[Self], rsa: isize, csa: isize,
    b: &[Self], rsb: isize, csb: isize,
    beta: Self,
    c: &mut [Self], rsc: isize, csc: isize,
  ) {
    unsafe {
      matrixmultiply::dgemm(
        m, k, n,
        alpha,
        a.as_ptr(), rsa, csa,
        b.as_ptr(), rsb, csb,
        beta,
        c.as_mut_ptr(), rsc, csc,
      )
    }
  }

  #[cfg(not(feature = "unsafe"))]
  fn gemm(
    m: usize, k: usize, n: usize,
    alpha: Self,
    a: &[Self], rsa: isize, csa: isize,
    b: &[Self], rsb: isize, csb: isize,
    beta: Self,
    c: &mut [Self], rsc: isize, csc: isize,
  ) {
    naive_gemm(m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc)
  }
}

#[cfg(not(feature = "unsafe"))]
fn naive_gemm<T: Real>(
  m: usize, k: usize, n: usize,
  alpha: T,
  a: &[T], rsa: isize, csa: isize,
  b: &[T], rsb: isize, csb: isize,
  beta: T,
  c: &mut [T], rsc: isize, csc: isize,
) {
  for i in 0..m {
    for j in 0..n {
      let mut acc = T::zero();
      for p in 0..k {
        let av = a[(i as isize * rsa + p as isize * csa) as usize];
        let bv = b[(p as isize * rsb + j as isize * csb) as usize];
        acc = acc + av * bv;
      }
      let ci = (i as isize * rsc + j as isize * csc) as usize;
      c[ci] = alpha * acc + beta * c[ci];
    }
  }
}

impl<T: Gemm> Tensor<T> {
  /// Matrix multiply for rank 2 tensors.

  pub fn mm(&self, rhs: &Self) -> Self {
    assert_eq!(self.rank(), 2, "Cannot multiply {} tensor as a matrix", self.shape());
    assert_eq!(rhs.rank(), 2, "Cannot multiply {} tensor as a matrix", rhs.shape());
    let m = self.shape()[0];
    let k = self.shape()[1];
    let n = rhs.shape()[1];
    assert_eq!(k, rhs.shape()[0], "Cannot multiply {} by {}", self.shape(), rhs.shape());
    let lhs_data = self.raw();
    let rhs_data = rhs.raw();
    let mut out = vec![T::zero(); m * n];
    T::gemm(
      m, k, n,
      T::one(),
      &lhs_data[self.shape().offset..], self.shape().strides[0], self.shape().strides[1],
      &rhs_data[rhs.shape().offset..], rhs.shape().strides[0], rhs.shape().strides[1],
      T::zero(),
      &mut out, n as isize, 1,
    );
    Self::new(&[m, n], out)
  }
}


#[cfg(test)]
mod tests {
  use crate::Tensor;

  #[test]
  fn matmul() {
    let a = Tensor::new(&[2,3], vec![1., 2., 3., 4., 5., 6.]);
    let b = Tensor::new(&[3,2], vec![7., 8., 9., 10., 11., 12.]);
    assert_eq!(a.mm(&b), Tensor::new(&[2,2], vec![58., 64., 139., 154.]));
  }

  #[test]
  fn matmul_transposed() {
    let a = Tensor::new(&[3,2], vec![1., 4., 2., 5., 3., 6.]).transpose(0,1);
    let b = Tensor::new(&[3,2], vec![7., 8., 9., 10., 11., 12.]);
    assert_eq!(a.mm(&b), Tensor::new(&[2,2], vec![58., 64., 139., 154.]));
  }

  #[test]
  fn matmul_f64() {
    let a = Tensor::<f64>::new(&[1,2], vec![0.5, 2.0]);
    let b = Tensor::<f64>::new(&[2,2], vec![2.0, 4.0, 1.0, 3.0]);
    assert_eq!(a.mm(&b), Tensor::new(&[1,2], vec![3.0, 8.0]));
  }
}
