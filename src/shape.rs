use std::fmt::Debug;

use serde::{ Serialize, Deserialize };

use crate::internal::*;


/// Dimensions, strides and storage offset of a [Tensor](crate::Tensor).
///
/// A shape maps logical indices into a tensor's backing buffer.
/// Transposes, broadcasts and reshapes only rearrange the shape
/// and never touch the data itself.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
  pub dims: Vec<usize>,
  pub(crate) strides: Vec<isize>,
  pub(crate) offset: usize,
}

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self {
      dims: dims.to_vec(),
      strides: Self::contiguous_strides(dims),
      offset: 0,
    }
  }

  fn contiguous_strides(dims: &[usize]) -> Vec<isize> {
    let mut strides: Vec<isize> = dims.iter()
      .rev()
      .scan(1, |size, &n| {
        let stride = *size;
        *size *= n as isize;
        Some(stride)
      })
      .collect();
    strides.reverse();
    strides
  }

  pub fn size(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub(crate) fn index(&self, indices: &[usize]) -> usize {
    assert!(indices.len() <= self.rank());
    let mut position = self.offset as isize;
    // Unspecified trailing dimensions index at zero
    for (&i, &stride) in indices.iter().zip(&self.strides) {
      position += i as isize * stride;
    }
    position as usize
  }

  pub fn contiguous(&self) -> bool {
    self.strides == Self::contiguous_strides(&self.dims)
  }

  pub fn iter(&self) -> Box<dyn Iterator<Item=usize> + '_> {
    if self.contiguous() {
      Box::new(self.offset..self.offset + self.size())
    } else {
      Box::new(StridedIter::new(self))
    }
  }

  pub fn view(&self, shape: &[usize]) -> Self {
    assert!(self.contiguous());
    let mut dims = shape.to_vec();
    // A zero entry gets its size inferred from the remaining
    // dimensions
    if let Some(hole) = dims.iter().position(|&n| n == 0 ) {
      let known: usize = dims.iter().filter(|&&n| n != 0 ).product();
      dims[hole] = self.size() / known;
    }
    let strides = Self::contiguous_strides(&dims);
    Self { dims, strides, offset: self.offset }
  }

  pub fn take(&self, indices: &[usize]) -> Self {
    Self {
      dims: self.dims[indices.len()..].to_vec(),
      strides: self.strides[indices.len()..].to_vec(),
      offset: self.index(indices),
    }
  }

  pub fn squeeze(&self) -> Self {
    self.squeeze_where(|_| true )
  }

  pub fn squeeze_only(&self, dim: isize) -> Self {
    let dim = negative_index(dim, self.rank(), false);
    self.squeeze_where(move |d| d == dim )
  }

  fn squeeze_where(&self, drop: impl Fn(usize) -> bool) -> Self {
    let mut dims = vec![];
    let mut strides = vec![];
    for (d, &n) in self.dims.iter().enumerate() {
      if n == 1 && drop(d) { continue }
      dims.push(n);
      strides.push(self.strides[d]);
    }
    Self { dims, strides, offset: self.offset }
  }

  pub fn unsqueeze(&self, dim: isize) -> Self {
    let dim = negative_index(dim, self.rank(), true);
    let mut dims = self.dims.clone();
    let mut strides = self.strides.clone();
    // The new dimension strides past everything to its right
    let stride = if dim < dims.len() {
      strides[dim].abs() * dims[dim] as isize
    } else { 1 };
    dims.insert(dim, 1);
    strides.insert(dim, stride);
    Self { dims, strides, offset: self.offset }
  }

  /// Union of both shapes, with stride zero on every dimension
  /// this shape needs to repeat along.

  pub fn broadcast(&self, other: &Self) -> Self {
    let rank = self.rank().max(other.rank());
    let mut dims = vec![0; rank];
    let mut strides = vec![0; rank];
    // Align from the right, missing dimensions count as one
    for i in 0..rank {
      let dl = if i < self.rank() { self.dims[self.rank() - 1 - i] } else { 1 };
      let dr = if i < other.rank() { other.dims[other.rank() - 1 - i] } else { 1 };
      assert!(dl == dr || dl == 1 || dr == 1, "Could not broadcast {self} & {other}");
      let stride = if i < self.rank() { self.strides[self.rank() - 1 - i] } else { 0 };
      dims[rank - 1 - i] = dl.max(dr);
      strides[rank - 1 - i] = if dl == 1 && dr != 1 { 0 } else { stride };
    }
    Self { dims, strides, offset: self.offset }
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Self {
    let dim1 = negative_index(dim1, self.rank(), false);
    let dim2 = negative_index(dim2, self.rank(), false);
    let mut shape = self.clone();
    shape.dims.swap(dim1, dim2);
    shape.strides.swap(dim1, dim2);
    shape
  }
}

impl std::ops::Index<isize> for Shape {
  type Output = usize;

  fn index(&self, i: isize) -> &usize {
    &self.dims[negative_index(i, self.rank(), false)]
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Shape{:?}", self.dims)
  }
}


/// Walks the buffer positions of a possibly strided [Shape] in
/// logical order.

pub struct StridedIter<'a> {
  shape: &'a Shape,
  counter: Vec<usize>,
  position: isize,
  done: bool,
}

impl<'a> StridedIter<'a> {
  fn new(shape: &'a Shape) -> Self {
    Self {
      counter: vec![0; shape.rank()],
      position: shape.offset as isize,
      shape,
      done: false,
    }
  }

  fn advance(&mut self) {
    for d in (0..self.counter.len()).rev() {
      self.counter[d] += 1;
      self.position += self.shape.strides[d];
      if self.counter[d] < self.shape.dims[d] { return }
      // Roll this dimension over and carry into the next
      self.counter[d] = 0;
      self.position -= self.shape.dims[d] as isize * self.shape.strides[d];
    }
    self.done = true;
  }
}

impl Iterator for StridedIter<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done { return None }
    let position = self.position as usize;
    self.advance();
    Some(position)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strides_pack_row_major() {
    let shape = Shape::new(&[4,3,2]);
    assert_eq!(shape.strides, vec![6,2,1]);

    let shape = Shape::new(&[2,3]);
    assert_eq!(shape.strides, vec![3,1]);
  }

  #[test]
  fn partial_indices_address_leading_dimensions() {
    let shape = Shape::new(&[2,3]);
    assert_eq!(shape.index(&[0]), 0);
    assert_eq!(shape.index(&[1,0]), 3);
    assert_eq!(shape.index(&[1,2]), 5);
  }

  #[test]
  fn iteration_follows_strides() {
    let shape = Shape::new(&[2,3]).transpose(0,1);
    let indices: Vec<_> = shape.iter().collect();
    assert_eq!(indices, vec![0, 3, 1, 4, 2, 5]);
  }

  #[test]
  fn unsqueeze_strides_past_the_right_hand_side() {
    let shape = Shape::new(&[3,2,2]).unsqueeze(-1);
    assert_eq!(shape.dims, vec![3,2,2,1]);
    assert_eq!(shape.strides, vec![4,2,1,1]);

    let shape = Shape::new(&[2,3,2]).unsqueeze(-3);
    assert_eq!(shape.dims, vec![2,1,3,2]);
    assert_eq!(shape.strides, vec![6,6,2,1]);

    let shape = Shape::new(&[2,3,2]).unsqueeze(0);
    assert_eq!(shape.dims, vec![1,2,3,2]);
    assert_eq!(shape.strides, vec![12,6,2,1]);
  }

  #[test]
  fn squeeze_drops_unit_dimensions() {
    let shape = Shape::new(&[3,2,1]).squeeze();
    assert_eq!(shape.dims, vec![3,2]);
    assert_eq!(shape.strides, vec![2,1]);

    let shape = Shape::new(&[1,2,3,2]).squeeze();
    assert_eq!(shape.dims, vec![2,3,2]);
    assert_eq!(shape.strides, vec![6,2,1]);

    let shape = Shape::new(&[2,1,3,1,2]).squeeze_only(-2);
    assert_eq!(shape.dims, vec![2,1,3,2]);
    assert_eq!(shape.strides, vec![6,6,2,1]);
  }

  #[test]
  fn broadcast_repeats_with_zero_strides() {
    let shape = Shape::new(&[2,3,2]).broadcast(&Shape::new(&[2,1,2]));
    assert_eq!(shape.dims, vec![2,3,2]);
    assert_eq!(shape.strides, vec![6,2,1]);

    let shape = Shape::new(&[2,1,2]).broadcast(&Shape::new(&[2,3,1]));
    assert_eq!(shape.dims, vec![2,3,2]);
    assert_eq!(shape.strides, vec![2,0,1]);

    let indices: Vec<_> = shape.iter().collect();
    assert_eq!(indices, vec![0, 1, 0, 1, 0, 1, 2, 3, 2, 3, 2, 3]);
  }

  #[test]
  #[should_panic]
  fn broadcast_rejects_mismatched_dimensions() {
    Shape::new(&[2,3]).broadcast(&Shape::new(&[4]));
  }

  #[test]
  fn transpose_swaps_strides() {
    let shape = Shape::new(&[2,3]).transpose(0,1);
    assert_eq!(shape.dims, vec![3,2]);
    assert_eq!(shape.strides, vec![1,3]);
    assert_eq!(shape.index(&[1,0]), 1);
    assert_eq!(shape.index(&[1,1]), 4);
  }
}
