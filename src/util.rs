use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use itertools::Itertools;

use crate::{
  arch::{ IMAGE_CHANNELS, IMAGE_SIZE },
  error::Result,
  tensor::Tensor,
};


/// Reads an image from disk, center-crops it square and scales it
/// to the network's input size. Intensities stay in 0 to 255.

pub fn load_image(path: impl AsRef<Path>) -> Result<Tensor<f32>> {
  let image = image::open(path)?.to_rgb8();
  let (width, height) = image.dimensions();
  let edge = width.min(height);
  let cropped = image::imageops::crop_imm(
    &image, (width - edge) / 2, (height - edge) / 2, edge, edge,
  ).to_image();
  let scaled = image::imageops::resize(
    &cropped, IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle,
  );
  let data = scaled.pixels()
    .flat_map(|pixel| pixel.0.iter().map(|&v| v as f32 ) )
    .collect();
  Ok(Tensor::new(&[IMAGE_SIZE, IMAGE_SIZE, IMAGE_CHANNELS], data))
}

/// Stacks equally shaped images into one batch.

pub fn batch_images(images: &[Tensor<f32>]) -> Tensor<f32> {
  Tensor::rows(images)
}

/// Reads class descriptions, one per line in class order.

pub fn read_classes(path: impl AsRef<Path>) -> Result<Vec<String>> {
  Ok(fs::read_to_string(path)?.lines().map(|line| line.trim().to_string() ).collect())
}

/// The `k` highest scoring entries of one probability row, best first.

pub fn top_k(probs: &Tensor<f32>, k: usize) -> Vec<(usize, f32)> {
  probs.param_iter()
    .enumerate()
    .sorted_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal) )
    .take(k)
    .collect()
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::BaseOps;

  #[test]
  fn top_k_orders_scores() {
    let probs = Tensor::vec(&[0.1, 0.4, 0.2, 0.3]);
    assert_eq!(top_k(&probs, 2), vec![(1, 0.4), (3, 0.3)]);
    assert_eq!(top_k(&probs, 9).len(), 4);
  }

  #[test]
  fn classes_parse_per_line() {
    let path = std::env::temp_dir().join("vgg19_classes_test.txt");
    fs::write(&path, "tench\ngoldfish\nwhite shark\n").unwrap();
    let classes = read_classes(&path).unwrap();
    fs::remove_file(&path).ok();
    assert_eq!(classes, vec!["tench", "goldfish", "white shark"]);
  }

  #[test]
  fn image_loads_at_network_size() {
    let path = std::env::temp_dir().join("vgg19_image_test.png");
    let mut img = image::RgbImage::new(64, 48);
    for pixel in img.pixels_mut() { *pixel = image::Rgb([255, 128, 0]) }
    img.save(&path).unwrap();
    let tensor = load_image(&path).unwrap();
    fs::remove_file(&path).ok();
    assert_eq!(tensor.shape().dims, vec![IMAGE_SIZE, IMAGE_SIZE, IMAGE_CHANNELS]);
    let first: Vec<f32> = tensor.at(&[0,0]).param_iter().collect();
    assert_eq!(first, vec![255.0, 128.0, 0.0]);
  }

  #[test]
  fn batching_stacks_rows() {
    let batch = batch_images(&[Tensor::zeros(&[2,2,3]), Tensor::ones(&[2,2,3])]);
    assert_eq!(batch.shape().dims, vec![2,2,2,3]);
  }
}
