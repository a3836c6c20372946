use crate::{
  shape::Shape,
  tensor::Tensor,
  tensor::cops::Gemm,
  scalar::Real,
  ops::BaseOps,
};

#[cfg(feature = "rayon")]
use rayon::prelude::*;


/// Resolved dimensions of one convolution, shared between the
/// forward pass and its derivatives.

#[derive(Debug, Clone, Copy)]
struct Geometry {
  batch: usize,
  height: usize,
  width: usize,
  channels: usize,
  kernel: usize,
  features: usize,
  out_height: usize,
  out_width: usize,
  pad_top: usize,
  pad_left: usize,
}

impl Geometry {
  fn resolve(input: &Shape, kernels: &Shape, same: bool) -> Self {
    assert_eq!(input.rank(), 4,
      "Convolution expects batched images, got {input}");
    assert_eq!(kernels.rank(), 4,
      "Kernels must be laid out as [size, size, channels, features], got {kernels}");
    assert_eq!(kernels[0], kernels[1],
      "Kernels must be square, got {kernels}");
    assert_eq!(input[3], kernels[2],
      "Image channels {input} don't match kernel channels {kernels}");
    let (height, width, kernel) = (input[1], input[2], kernels[0]);
    let (out_height, out_width, pad) = if same {
      (height, width, (kernel - 1) / 2)
    } else {
      assert!(kernel <= height && kernel <= width,
        "Kernels {kernels} too large for unpadded input {input}");
      (height - kernel + 1, width - kernel + 1, 0)
    };
    Self {
      batch: input[0],
      height, width,
      channels: input[3],
      kernel,
      features: kernels[3],
      out_height, out_width,
      pad_top: pad,
      pad_left: pad,
    }
  }

  fn image_len(&self) -> usize {
    self.height * self.width * self.channels
  }

  fn patch_len(&self) -> usize {
    self.kernel * self.kernel * self.channels
  }

  fn patch_count(&self) -> usize {
    self.out_height * self.out_width
  }
}

/// Unfold one image into a matrix holding the receptive field of
/// every output position as a row. Out of bounds positions stay
/// zero, which realizes the padding.

fn unfold<T: Real>(image: &[T], geo: &Geometry) -> Vec<T> {
  let Geometry { height, width, channels, kernel, out_height, out_width, .. } = *geo;
  let mut patches = vec![T::zero(); geo.patch_count() * geo.patch_len()];
  for oy in 0..out_height {
    for ox in 0..out_width {
      let patch = (oy * out_width + ox) * geo.patch_len();
      for ky in 0..kernel {
        // Out of bounds positions wrap around to huge indices
        let y = (oy + ky).wrapping_sub(geo.pad_top);
        if y >= height { continue }
        for kx in 0..kernel {
          let x = (ox + kx).wrapping_sub(geo.pad_left);
          if x >= width { continue }
          let src = (y * width + x) * channels;
          let dst = patch + (ky * kernel + kx) * channels;
          patches[dst..dst + channels].copy_from_slice(&image[src..src + channels]);
        }
      }
    }
  }
  patches
}

/// Scatter a patch matrix back onto the image it was unfolded
/// from, accumulating where receptive fields overlap.

fn fold<T: Real>(patches: &[T], image: &mut [T], geo: &Geometry) {
  let Geometry { height, width, channels, kernel, out_height, out_width, .. } = *geo;
  for oy in 0..out_height {
    for ox in 0..out_width {
      let patch = (oy * out_width + ox) * geo.patch_len();
      for ky in 0..kernel {
        let y = (oy + ky).wrapping_sub(geo.pad_top);
        if y >= height { continue }
        for kx in 0..kernel {
          let x = (ox + kx).wrapping_sub(geo.pad_left);
          if x >= width { continue }
          let src = patch + (ky * kernel + kx) * channels;
          let dst = (y * width + x) * channels;
          for c in 0..channels {
            image[dst + c] += patches[src + c];
          }
        }
      }
    }
  }
}

pub(crate) fn convolve2d<T: Gemm>(input: &Tensor<T>, kernels: &Tensor<T>, same: bool) -> Tensor<T> {
  let geo = Geometry::resolve(input.shape(), kernels.shape(), same);
  let input = input.contiguous();
  let kernels = kernels.contiguous();
  let input_raw = input.raw();
  let kernel_raw = kernels.raw();
  let offset = input.shape().offset;
  let images = &input_raw[offset..offset + geo.batch * geo.image_len()];
  let weights = &kernel_raw[kernels.shape().offset..];
  let mut out = vec![T::zero(); geo.batch * geo.patch_count() * geo.features];

  let run = |(image, dst): (&[T], &mut [T])| {
    let patches = unfold(image, &geo);
    T::gemm(geo.patch_count(), geo.patch_len(), geo.features, T::one(),
      &patches, geo.patch_len() as isize, 1,
      weights, geo.features as isize, 1,
      T::zero(),
      dst, geo.features as isize, 1);
  };

  #[cfg(feature = "rayon")]
  images.par_chunks(geo.image_len())
    .zip(out.par_chunks_mut(geo.patch_count() * geo.features))
    .for_each(run);

  #[cfg(not(feature = "rayon"))]
  images.chunks(geo.image_len())
    .zip(out.chunks_mut(geo.patch_count() * geo.features))
    .for_each(run);

  Tensor::new(&[geo.batch, geo.out_height, geo.out_width, geo.features], out)
}

pub(crate) fn convolve2d_backward<T: Gemm>(
  input: &Tensor<T>, kernels: &Tensor<T>, grad: &Tensor<T>, same: bool,
) -> (Tensor<T>, Tensor<T>) {
  let geo = Geometry::resolve(input.shape(), kernels.shape(), same);
  let input = input.contiguous();
  let kernels = kernels.contiguous();
  let grad = grad.contiguous();
  let input_raw = input.raw();
  let kernel_raw = kernels.raw();
  let grad_raw = grad.raw();
  let offset = input.shape().offset;
  let images = &input_raw[offset..offset + geo.batch * geo.image_len()];
  let weights = &kernel_raw[kernels.shape().offset..];
  let gradients = &grad_raw[grad.shape().offset..];

  let mut grad_in = vec![T::zero(); geo.batch * geo.image_len()];
  let mut grad_w = vec![T::zero(); geo.patch_len() * geo.features];
  let span = geo.patch_count() * geo.features;

  for i in 0..geo.batch {
    let image = &images[i * geo.image_len()..(i + 1) * geo.image_len()];
    let grad_i = &gradients[i * span..(i + 1) * span];
    let patches = unfold(image, &geo);
    // Kernel gradient accumulates over the batch
    T::gemm(geo.patch_len(), geo.patch_count(), geo.features, T::one(),
      &patches, 1, geo.patch_len() as isize,
      grad_i, geo.features as isize, 1,
      T::one(),
      &mut grad_w, geo.features as isize, 1);
    let mut grad_patches = vec![T::zero(); geo.patch_count() * geo.patch_len()];
    T::gemm(geo.patch_count(), geo.features, geo.patch_len(), T::one(),
      grad_i, geo.features as isize, 1,
      weights, 1, geo.features as isize,
      T::zero(),
      &mut grad_patches, geo.patch_len() as isize, 1);
    fold(&grad_patches, &mut grad_in[i * geo.image_len()..(i + 1) * geo.image_len()], &geo);
  }

  (
    Tensor::new(&input.shape().dims, grad_in),
    Tensor::new(&kernels.shape().dims, grad_w),
  )
}

pub(crate) fn max_pool2d<T: Real>(input: &Tensor<T>, size: usize) -> Tensor<T> {
  let shape = input.shape();
  assert_eq!(shape.rank(), 4,
    "Pooling expects batched images, got {shape}");
  let (batch, height, width, channels) = (shape[0], shape[1], shape[2], shape[3]);
  let out_height = (height + size - 1) / size;
  let out_width = (width + size - 1) / size;
  let input = input.contiguous();
  let raw = input.raw();
  let offset = input.shape().offset;
  let image_len = height * width * channels;
  let images = &raw[offset..offset + batch * image_len];
  let mut out = vec![T::zero(); batch * out_height * out_width * channels];

  for i in 0..batch {
    let image = &images[i * image_len..(i + 1) * image_len];
    let dst = &mut out[i * out_height * out_width * channels..];
    for oy in 0..out_height {
      let y_end = ((oy + 1) * size).min(height);
      for ox in 0..out_width {
        let x_end = ((ox + 1) * size).min(width);
        for c in 0..channels {
          let mut best = image[(oy * size * width + ox * size) * channels + c];
          for y in oy * size..y_end {
            for x in ox * size..x_end {
              let value = image[(y * width + x) * channels + c];
              if value > best { best = value }
            }
          }
          dst[(oy * out_width + ox) * channels + c] = best;
        }
      }
    }
  }

  Tensor::new(&[batch, out_height, out_width, channels], out)
}

pub(crate) fn max_pool2d_backward<T: Real>(input: &Tensor<T>, grad: &Tensor<T>, size: usize) -> Tensor<T> {
  let shape = input.shape();
  let (batch, height, width, channels) = (shape[0], shape[1], shape[2], shape[3]);
  let out_height = (height + size - 1) / size;
  let out_width = (width + size - 1) / size;
  let input = input.contiguous();
  let grad = grad.contiguous();
  let raw = input.raw();
  let grad_raw = grad.raw();
  let offset = input.shape().offset;
  let image_len = height * width * channels;
  let images = &raw[offset..offset + batch * image_len];
  let gradients = &grad_raw[grad.shape().offset..];
  let mut out = vec![T::zero(); batch * image_len];

  for i in 0..batch {
    let image = &images[i * image_len..(i + 1) * image_len];
    let grad_i = &gradients[i * out_height * out_width * channels..];
    let dst = &mut out[i * image_len..(i + 1) * image_len];
    for oy in 0..out_height {
      let y_end = ((oy + 1) * size).min(height);
      for ox in 0..out_width {
        let x_end = ((ox + 1) * size).min(width);
        for c in 0..channels {
          // Ties resolve to the first maximum, matching the
          // forward pass scan order
          let mut best = oy * size * width + ox * size;
          for y in oy * size..y_end {
            for x in ox * size..x_end {
              let at = y * width + x;
              if image[at * channels + c] > image[best * channels + c] { best = at }
            }
          }
          dst[best * channels + c] += grad_i[(oy * out_width + ox) * channels + c];
        }
      }
    }
  }

  Tensor::new(&shape.dims, out)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn convolve_same() {
    let input = Tensor::<f32>::arrange(&[1,3,3,1], 1.0, 1.0);
    let kernels = Tensor::ones(&[3,3,1,1]);
    let out = convolve2d(&input, &kernels, true);
    assert_eq!(out, Tensor::new(&[1,3,3,1], vec![
      12.0, 21.0, 16.0,
      27.0, 45.0, 33.0,
      24.0, 39.0, 28.0,
    ]));
  }

  #[test]
  fn convolve_valid() {
    let input = Tensor::<f32>::arrange(&[1,3,3,1], 1.0, 1.0);
    let kernels = Tensor::ones(&[3,3,1,1]);
    let out = convolve2d(&input, &kernels, false);
    assert_eq!(out, Tensor::new(&[1,1,1,1], vec![45.0]));
  }

  #[test]
  fn convolve_channels() {
    let input = Tensor::<f32>::rand(&[2,4,4,3]);
    let kernels = Tensor::rand(&[3,3,3,8]);
    let out = convolve2d(&input, &kernels, true);
    assert_eq!(out.shape().dims, vec![2,4,4,8]);
    // A one hot kernel at the center picks out a single input channel
    let mut point = vec![0.0; 9 * 3];
    point[4 * 3 + 1] = 1.0;
    let picked = convolve2d(&input, &Tensor::new(&[3,3,3,1], point), true);
    for (index, value) in picked.param_iter().enumerate() {
      assert_eq!(value, input.detach().raw()[index * 3 + 1]);
    }
  }

  #[test]
  fn pool() {
    let input = Tensor::<f32>::arrange(&[1,4,4,1], 0.0, 1.0);
    let out = max_pool2d(&input, 2);
    assert_eq!(out, Tensor::new(&[1,2,2,1], vec![5.0, 7.0, 13.0, 15.0]));
  }

  #[test]
  fn pool_uneven() {
    let input = Tensor::<f32>::arrange(&[1,3,3,1], 1.0, 1.0);
    let out = max_pool2d(&input, 2);
    assert_eq!(out, Tensor::new(&[1,2,2,1], vec![5.0, 6.0, 8.0, 9.0]));
  }

  #[test]
  fn pool_channels() {
    let input = Tensor::<f32>::new(&[1,2,2,2], vec![
      1.0, 8.0,
      3.0, 2.0,
      5.0, 4.0,
      7.0, 6.0,
    ]);
    let out = max_pool2d(&input, 2);
    assert_eq!(out, Tensor::new(&[1,1,1,2], vec![7.0, 8.0]));
  }

  #[test]
  fn pool_backward_routes_to_maximum() {
    let input = Tensor::<f32>::new(&[1,2,2,1], vec![1.0, 4.0, 2.0, 3.0]);
    let grad = Tensor::new(&[1,1,1,1], vec![2.5]);
    let routed = max_pool2d_backward(&input, &grad, 2);
    assert_eq!(routed, Tensor::new(&[1,2,2,1], vec![0.0, 2.5, 0.0, 0.0]));
  }
}
