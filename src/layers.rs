use crate::{
  arch::{ LayerId, LayerKind, POOL_SIZE },
  error::{ Error, Result },
  ops::{ BaseOps, RealOps },
  params::ParamStore,
  snapshot::Snapshot,
  variable::Variable,
};


/// Appends one convolution layer. Kernel size and feature count
/// come from the architecture table, input channels follow from
/// the incoming activations. Spatial size is preserved and ReLU
/// applied.

pub fn conv_layer(
  store: &ParamStore,
  input: &Variable<f32>,
  layer: LayerId,
  snapshot: Option<&Snapshot>,
) -> Result<Variable<f32>> {
  let (kernel, features) = match layer.kind() {
    LayerKind::Conv { kernel, features } => (kernel, features),
    LayerKind::Dense { .. } => return Err(Error::UnknownLayer(layer.to_string())),
  };
  let channels = input.shape()[-1];
  let param = store.get_or_create(layer, &[kernel, kernel, channels, features], &[features], snapshot)?;
  Ok((input.convolve2d(&param.weight, true) + &param.bias).relu())
}

/// Appends one fully connected layer, flattening the incoming
/// activations per image. ReLU is optional so the final scoring
/// layer can expose raw logits.

pub fn dense_layer(
  store: &ParamStore,
  input: &Variable<f32>,
  layer: LayerId,
  activate: bool,
  snapshot: Option<&Snapshot>,
) -> Result<Variable<f32>> {
  let features = match layer.kind() {
    LayerKind::Dense { features } => features,
    LayerKind::Conv { .. } => return Err(Error::UnknownLayer(layer.to_string())),
  };
  let batch = input.shape()[0];
  let fan: usize = input.shape().dims[1..].iter().product();
  let param = store.get_or_create(layer, &[fan, features], &[features], snapshot)?;
  let scores = input.reshape(&[batch, fan]).mm(&param.weight) + &param.bias;
  Ok(if activate { scores.relu() } else { scores })
}

/// Downsamples spatially by taking the maximum over non
/// overlapping windows. Odd trailing rows and columns pool over
/// clipped windows.

pub fn max_pool(input: &Variable<f32>) -> Variable<f32> {
  input.max_pool2d(POOL_SIZE)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::LayerId::*;
  use crate::tensor::Tensor;

  #[test]
  fn conv_keeps_spatial_size() {
    let store = ParamStore::new(0.0);
    let input = Tensor::rand(&[2,8,8,3]).tracked();
    let out = conv_layer(&store, &input, Conv1_1, None).unwrap();
    assert_eq!(out.shape().dims, vec![2,8,8,64]);
    assert!(out.tensor().param_iter().all(|v| v >= 0.0 ));
  }

  #[test]
  fn conv_channels_follow_input() {
    let store = ParamStore::new(0.0);
    let input = Tensor::rand(&[1,4,4,64]).tracked();
    conv_layer(&store, &input, Conv2_1, None).unwrap();
    let param = store.get_or_create(Conv2_1, &[3,3,64,128], &[128], None).unwrap();
    assert_eq!(param.weight.shape().dims, vec![3,3,64,128]);
  }

  #[test]
  fn dense_flattens_input() {
    let store = ParamStore::new(0.0);
    let input = Tensor::rand(&[2,2,2,4]).tracked();
    let out = dense_layer(&store, &input, Fc6, true, None).unwrap();
    assert_eq!(out.shape().dims, vec![2,4096]);
    let param = store.get_or_create(Fc6, &[16,4096], &[4096], None).unwrap();
    assert_eq!(param.weight.shape().dims, vec![16,4096]);
  }

  #[test]
  fn raw_scores_skip_activation() {
    let store = ParamStore::new(0.0);
    let input = Tensor::rand(&[4,16]).tracked();
    let out = dense_layer(&store, &input, Fc8, false, None).unwrap();
    assert_eq!(out.shape().dims, vec![4,1000]);
    assert!(out.tensor().param_iter().any(|v| v < 0.0 ));
  }

  #[test]
  fn mismatched_kind_is_rejected() {
    let store = ParamStore::new(0.0);
    let image = Tensor::rand(&[1,4,4,3]).tracked();
    let flat = Tensor::rand(&[1,16]).tracked();
    assert!(matches!(conv_layer(&store, &image, Fc6, None), Err(Error::UnknownLayer(_))));
    assert!(matches!(dense_layer(&store, &flat, Conv2_1, true, None), Err(Error::UnknownLayer(_))));
    // Rejected lookups must not create parameters
    assert!(store.is_empty());
  }

  #[test]
  fn pooling_halves_odd_sizes() {
    let input = Tensor::rand(&[1,5,5,2]).tracked();
    assert_eq!(max_pool(&input).shape().dims, vec![1,3,3,2]);
  }

  #[test]
  fn repeated_layers_share_parameters() {
    let store = ParamStore::new(0.0);
    let input = Tensor::rand(&[1,4,4,3]).tracked();
    let a = conv_layer(&store, &input, Conv1_1, None).unwrap();
    let b = conv_layer(&store, &input, Conv1_1, None).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(a.tensor(), b.tensor());
  }
}
