use std::rc::Rc;
use std::cell::{ Ref, RefCell };
use std::fmt::Debug;

use rand::Rng;
use num_traits::NumCast;
use serde::{ Serialize, Deserialize };

mod cops;
mod lops;
pub(crate) mod conv;

pub use cops::Gemm;

use crate::{
  internal::*,
  shape::Shape,
  variable::Variable,
  scalar::{ Element, Numeric, Real, Integer, Signed, Unsigned },
  ops::{ BaseOps, NumericOps, Hops },
};


/// Multidimensional array.
///
/// Tensors may contain any [Element] type, with additional methods
/// available for [Numeric], [Real] and [boolean](bool) elements.
///
/// Storage is shared between clones and views. Shape changing
/// operations like [transpose](Tensor::transpose) or
/// [at](Tensor::at) therefore never copy data.
///
/// [Real] valued tensors can be wrapped in a [Variable] by calling
/// [tracked](Tensor::tracked) or [trained](Tensor::trained).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor<T: Element> {
  shape: Shape,
  data: Rc<RefCell<Vec<T>>>,
}

impl<T: Real> Hops<T> for Tensor<T> {}

impl<T: Element> PartialEq for Tensor<T> {
  fn eq(&self, rhs: &Self) -> bool {
    if self.shape.squeeze().dims != rhs.shape.squeeze().dims { return false }
    let lhs_data = self.data.borrow();
    let rhs_data = rhs.data.borrow();
    self.shape.iter()
      .zip(rhs.shape.iter())
      .all(|(i, j)| lhs_data[i] == rhs_data[j] )
  }
}

impl<T: Element> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Self {
    assert_eq!(shape.size(), data.len(),
      "{} doesn't match data length {}", shape, data.len());
    Self { shape, data: Rc::new(RefCell::new(data)) }
  }

  pub fn new(shape: &[usize], data: Vec<T>) -> Self {
    Self::from_shape(Shape::new(shape), data)
  }

  pub fn vec(vec: &[T]) -> Self {
    Self::new(&[vec.len()], vec.to_vec())
  }

  pub fn from_vec(vec: Vec<T>) -> Self {
    Self::new(&[vec.len()], vec)
  }

  pub fn fill(shape: &[usize], filler: T) -> Self {
    Self::new(shape, vec![filler; shape.iter().product()])
  }

  pub fn init(shape: &[usize], mut cb: impl FnMut() -> T) -> Self {
    let shape = Shape::new(shape);
    let data = (0..shape.size()).map(|_| cb() ).collect();
    Self::from_shape(shape, data)
  }

  /// Stack equally shaped tensors along a new leading dimension.

  pub fn rows(rows: &[Tensor<T>]) -> Self {
    let mut dims = rows[0].shape.dims.clone();
    dims.insert(0, rows.len());
    let data: Vec<T> = rows.iter()
      .flat_map(|row| row.detach().into_raw() )
      .collect();
    Self::new(&dims, data)
  }

  pub fn raw(&self) -> Ref<Vec<T>> {
    self.data.borrow()
  }

  pub fn into_raw(self) -> Vec<T> {
    Rc::unwrap_or_clone(self.data).into_inner()
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  pub fn assign(&self, other: &Self) {
    assert!(self.shape.squeeze().dims == other.shape.squeeze().dims,
      "Could not assign {} tensor to {} tensor", other.shape, self.shape);
    let other = self.unshared(other);
    let mut data = self.data.borrow_mut();
    let other_data = other.data.borrow();
    for (i, j) in self.shape.iter().zip(other.shape.iter()) {
      data[i] = other_data[j];
    }
  }

  pub(crate) fn refill(&self, filler: T) {
    let mut data = self.data.borrow_mut();
    for i in self.shape.iter() {
      data[i] = filler;
    }
  }

  // A borrow of other that's safe to read while self is mutably
  // borrowed

  fn unshared(&self, other: &Self) -> Self {
    if Rc::ptr_eq(&self.data, &other.data) {
      other.detach()
    } else {
      other.clone()
    }
  }

  pub fn contiguous(&self) -> Self {
    if self.shape.contiguous() {
      self.clone()
    } else {
      self.vectorize(|a| a )
    }
  }

  /// Copy into fresh, unshared storage.

  pub fn detach(&self) -> Self {
    self.vectorize(|a| a )
  }

  pub fn zip<O,F>(&self, rhs: &Self, cb: F) -> Tensor<O>
  where
    O: Element,
    F: Fn((T, T)) -> O,
  {
    let rhs = rhs.broadcast(&self.shape);
    let lhs = self.broadcast(&rhs.shape);
    let data: Vec<O> = lhs.param_iter()
      .zip(rhs.param_iter())
      .map(cb)
      .collect();
    Tensor::new(&lhs.shape.dims, data)
  }

  pub fn vectorize<O,F>(&self, cb: F) -> Tensor<O>
  where
    O: Element,
    F: FnMut(T) -> O,
  {
    let data = self.param_iter().map(cb).collect();
    Tensor::new(&self.shape.dims, data)
  }

  pub fn collapse<O,F>(&self, dim: isize, cb: F) -> Tensor<O>
  where
    O: Element,
    F: Fn(Self) -> O,
  {
    let dim = negative_index(dim, self.shape.rank(), false);
    let data = self.unsqueeze(0).iter(dim as isize)
      .map(cb)
      .collect();
    Tensor::new(&self.shape.dims[..dim], data)
  }

  pub fn collapse_only<F>(&self, dim: isize, cb: F) -> Self
  where
    F: Fn(Self) -> Self,
  {
    let dim = negative_index(dim, self.shape.rank(), false);
    let data = self.unsqueeze(0).iter(dim as isize)
      .flat_map(|t| cb(t).into_raw() )
      .collect();
    let mut dims = self.shape.dims.clone();
    dims[dim] = 1;
    Tensor::new(&dims, data)
  }

  pub fn expand<O,F>(&self, cb: F) -> Tensor<O>
  where
    O: Element,
    F: Fn(T) -> Vec<O>,
  {
    let mut width = None;
    let data: Vec<O> = self.param_iter()
      .flat_map(|a| {
        let vec = cb(a);
        match width {
          None => width = Some(vec.len()),
          Some(n) => assert_eq!(n, vec.len(), "Expansion must produce arrays of equal size"),
        }
        vec
      })
      .collect();
    let mut dims = self.shape.dims.clone();
    dims.push(width.unwrap_or(0));
    Tensor::new(&dims, data)
  }

  /// Iterate sub tensors along `dim`, with all leading dimensions
  /// collapsed.

  pub fn iter(&self, dim: isize) -> TensorSliceIterator<T> {
    TensorSliceIterator::new(self, dim)
  }

  /// Iterate all elements in logical order.

  pub fn param_iter(&self) -> TensorIterator<T> {
    TensorIterator::new(self)
  }

  /// View of the sub tensor at `indices`, which may address any
  /// prefix of the dimensions.

  pub fn at(&self, indices: &[usize]) -> Self {
    Self {
      shape: self.shape.take(indices),
      data: self.data.clone(),
    }
  }

  pub fn item(&self) -> T {
    assert!(self.shape.squeeze().rank() == 0,
      "Can't extract item from non-scalar {}", self.shape);
    self.raw()[self.shape.offset]
  }

  pub fn view(&self, shape: &[usize]) -> Self {
    Self {
      shape: self.shape.view(shape),
      data: self.data.clone(),
    }
  }

  pub fn squeeze(&self) -> Self {
    Self {
      shape: self.shape.squeeze(),
      data: self.data.clone(),
    }
  }

  pub fn squeeze_only(&self, dim: isize) -> Self {
    Self {
      shape: self.shape.squeeze_only(dim),
      data: self.data.clone(),
    }
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Self {
    Self {
      shape: self.shape.transpose(dim1, dim2),
      data: self.data.clone(),
    }
  }
}

impl<T: Numeric> std::iter::Sum for Tensor<T> {
  fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
    iter.fold(Self::zeros(&[1]), |acc, a| acc.add(&a) )
  }
}

impl<T: Numeric> Tensor<T> {
  pub fn ones(shape: &[usize]) -> Self {
    Self::fill(shape, T::one())
  }

  pub fn zeros(shape: &[usize]) -> Self {
    Self::fill(shape, T::zero())
  }

  pub fn arrange(shape: &[usize], start: T, step: T) -> Self {
    Self::new(shape, (0..shape.iter().product())
      .map(|i| T::from(i).unwrap() * step + start )
      .collect())
  }

  pub fn hot_encode(idx: usize, size: usize) -> Self {
    let mut hot = vec![T::zero(); size];
    hot[idx] = T::one();
    Self::from_vec(hot)
  }

  pub fn add(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a + b )
  }

  pub fn sub(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a - b )
  }

  pub fn mul(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a * b )
  }

  pub fn div(&self, rhs: &Self) -> Self {
    self.zip(rhs, |(a, b)| a / b )
  }

  /// Sum along `dim`, keeping it as a one sized dimension.

  pub fn sum_over(&self, dim: isize) -> Self {
    let dim = negative_index(dim, self.shape.rank(), false);
    if self.shape.contiguous() {
      // Raw accumulation. Gradient reduction hits this path with
      // activation-sized tensors, where slice arithmetic is not optional.
      let dims = &self.shape.dims;
      let outer: usize = dims[..dim].iter().product();
      let n = dims[dim];
      let inner: usize = dims[dim + 1..].iter().product();
      let data = self.raw();
      let base = self.shape.offset;
      let mut out = vec![T::zero(); outer * inner];
      for o in 0..outer {
        let acc = &mut out[o * inner .. (o + 1) * inner];
        for j in 0..n {
          let row = base + (o * n + j) * inner;
          for i in 0..inner {
            acc[i] += data[row + i];
          }
        }
      }
      let mut dims = dims.clone();
      dims[dim] = 1;
      Self::new(&dims, out)
    } else {
      self.collapse_only(dim as isize, |t| {
        t.iter(0).sum()
      })
    }
  }

  pub fn gt(&self, rhs: &Self) -> Tensor<bool> {
    self.zip(rhs, |(a, b)| a > b )
  }

  /// Combine `other` into this tensor in place, broadcasting it
  /// to the full shape when necessary.

  pub(crate) fn op_assign(&self, other: &Self, cb: impl Fn(&mut T, T)) {
    let other = self.unshared(other).broadcast(&self.shape);
    let mut data = self.data.borrow_mut();
    for (i, value) in self.shape.iter().zip(other.param_iter()) {
      cb(&mut data[i], value);
    }
  }
}

impl<T: Real> Tensor<T> {
  pub fn rand(shape: &[usize]) -> Self {
    let mut rng = rand::thread_rng();
    Self::init(shape, || rng.gen_range(T::zero()..T::one()) )
  }

  pub fn randn(shape: &[usize]) -> Self {
    let len = shape.iter().product();
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
      let (r1, r2): (T, T) = randn();
      data.push(r1);
      if data.len() < len { data.push(r2) }
    }
    Self::new(shape, data)
  }

  /// Sample a normal distribution with the given standard deviation,
  /// discarding draws further than two deviations from the mean.

  pub fn randn_truncated(shape: &[usize], dev: T) -> Self {
    let two = T::from(2.0).unwrap();
    let len = shape.iter().product();
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
      let (r1, r2): (T, T) = randn();
      if r1 >= -two && r1 <= two { data.push(r1 * dev) }
      if data.len() < len && r2 >= -two && r2 <= two { data.push(r2 * dev) }
    }
    Self::new(shape, data)
  }

  /// Draw ones with the probabilities given by this tensor's
  /// elements.

  pub fn bernoulli<O: Numeric>(&self) -> Tensor<O> {
    let mut rng = rand::thread_rng();
    self.vectorize(|a| if rng.gen_range(T::zero()..T::one()) < a {
      O::one()
    } else {
      O::zero()
    })
  }

  /// Wrap in a [Variable] without gradient storage.

  pub fn tracked(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), false)
  }

  /// Wrap in a [Variable] that accumulates gradients and gets
  /// listed by [parameters](Variable::parameters).

  pub fn trained(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), true)
  }
}

impl<T: Integer + Unsigned> Tensor<T> {
  pub fn one_hot<O: Numeric>(&self, size: usize) -> Tensor<O> {
    self.expand(|a| {
      let mut hot = vec![O::zero(); size];
      let i: usize = NumCast::from(a).unwrap();
      hot[i] = O::one();
      hot
    })
  }
}

impl<T: Signed> Tensor<T> {
  pub fn abs(&self) -> Self {
    self.vectorize(|a| a.abs() )
  }
}

impl Tensor<bool> {
  pub fn numeric<O: Numeric>(&self) -> Tensor<O> {
    self.vectorize(|a| if a { O::one() } else { O::zero() })
  }
}

impl<T: Element> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.shape.dims)?;
    print_chunks(0, &self.shape, &self.detach().raw(), f)
  }
}

fn print_chunks<T: Debug>(idx: usize, shape: &Shape, vec: &[T], f: &mut std::fmt::Formatter) -> std::fmt::Result {
  let indent = " ".repeat(idx * 2);
  if shape.rank() == 0 {
    write!(f, "{indent}{:?}", vec[0])?;
  } else if idx == shape.rank() - 1 {
    write!(f, "{indent}{:?}\n", vec)?;
  } else {
    write!(f, "{indent}[\n")?;
    for chunk in vec.chunks(vec.len() / shape.dims[idx]) {
      print_chunks(idx + 1, shape, chunk, f)?;
    }
    write!(f, "{indent}]\n")?;
  }
  Ok(())
}


pub struct TensorSliceIterator<T: Element> {
  tensor: Tensor<T>,
  index: usize,
}

impl<T: Element> TensorSliceIterator<T> {
  fn new(tensor: &Tensor<T>, dim: isize) -> Self {
    let dim = negative_index(dim, tensor.shape.rank(), false);
    // Collapse every dimension before dim, then slice along it
    let mut dims = tensor.shape.dims.clone();
    for i in 0..dim { dims[i] = 1 }
    dims[dim] = 0;
    let mut tensor = tensor.reshape(&dims);
    for _ in 0..dim {
      tensor = tensor.squeeze_only(0);
    }
    Self { tensor, index: 0 }
  }
}

impl<T: Element> Iterator for TensorSliceIterator<T> {
  type Item = Tensor<T>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.index == self.tensor.shape[0] { return None }
    let out = self.tensor.at(&[self.index]);
    self.index += 1;
    Some(out)
  }
}


pub struct TensorIterator<'a, T: Element> {
  data: Ref<'a, Vec<T>>,
  positions: Box<dyn Iterator<Item=usize> + 'a>,
}

impl<'a, T: Element> TensorIterator<'a, T> {
  fn new(tensor: &'a Tensor<T>) -> Self {
    Self {
      data: tensor.data.borrow(),
      positions: tensor.shape.iter(),
    }
  }
}

impl<T: Element> Iterator for TensorIterator<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    self.positions.next().map(|i| self.data[i] )
  }
}
