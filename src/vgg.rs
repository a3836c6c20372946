use log::{ info, trace };

use crate::{
  arch::{ LayerId, LayerKind, ARCHITECTURE, CLASS_COUNT, IMAGE_CHANNELS, IMAGE_SIZE, POOL_SIZE },
  error::{ Error, Result },
  layers::{ conv_layer, dense_layer, max_pool },
  ops::{ BaseOps, Hops },
  optimize::{ Adam, Optimizer },
  params::ParamStore,
  snapshot::Snapshot,
  tensor::Tensor,
  variable::Variable,
};

/// Mean channel intensities of the training corpus, in BGR order.
pub const BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// Probability of keeping a component during dropout.
pub const DROPOUT_KEEP: f32 = 0.5;

/// Default Adam learning rate.
pub const LEARNING_RATE: f32 = 1e-4;

/// Default L2 penalty coefficient.
pub const WEIGHT_DECAY: f32 = 1e-4;


/// Construction options for [Vgg19].

#[derive(Debug, Clone)]
pub struct Vgg19Config {
  /// Saved parameters to restore. Layers without an entry
  /// initialize randomly.
  pub snapshot: Option<Snapshot>,
  /// Step size of the Adam optimizer.
  pub learning_rate: f32,
  /// L2 penalty coefficient. With `None` the penalty stays out of
  /// the training objective.
  pub weight_decay: Option<f32>,
}

impl Default for Vgg19Config {
  fn default() -> Self {
    Self {
      snapshot: None,
      learning_rate: LEARNING_RATE,
      weight_decay: None,
    }
  }
}


/// The nineteen layer VGG classifier over 224x224 RGB images.
///
/// Construction materializes all parameters. [predict](Vgg19::predict)
/// turns image batches into class probabilities, [train_step](Vgg19::train_step)
/// fits the parameters to labeled batches, and [export](Vgg19::export)
/// captures them for later sessions.

pub struct Vgg19 {
  store: ParamStore,
  optimizer: Optimizer<f32, Adam<f32>>,
  regularize: bool,
}

impl Vgg19 {
  /// Builds the full network, creating or restoring every parameter
  /// up front so mismatched snapshots surface here instead of during
  /// a later forward pass.
  pub fn new(config: Vgg19Config) -> Result<Self> {
    let snapshot = config.snapshot.as_ref();
    if let Some(snapshot) = snapshot {
      for name in snapshot.names() {
        if name.parse::<LayerId>().is_err() {
          info!("snapshot entry '{name}' matches no layer, ignoring");
        }
      }
    }
    let store = ParamStore::new(config.weight_decay.unwrap_or(WEIGHT_DECAY));
    let (mut height, mut width, mut channels) = (IMAGE_SIZE, IMAGE_SIZE, IMAGE_CHANNELS);
    let mut fan = 0;
    for (layer, kind) in ARCHITECTURE {
      match kind {
        LayerKind::Conv { kernel, features } => {
          store.get_or_create(layer, &[kernel, kernel, channels, features], &[features], snapshot)?;
          channels = features;
          if layer.pooled_after() {
            height = (height + POOL_SIZE - 1) / POOL_SIZE;
            width = (width + POOL_SIZE - 1) / POOL_SIZE;
          }
        },
        LayerKind::Dense { features } => {
          if fan == 0 { fan = height * width * channels }
          store.get_or_create(layer, &[fan, features], &[features], snapshot)?;
          fan = features;
        },
      }
    }
    info!("network holds {} scalars in {} layers", store.scalar_count(), store.len());
    Ok(Self {
      store,
      optimizer: Optimizer::new(config.learning_rate, Adam::default()),
      regularize: config.weight_decay.is_some(),
    })
  }

  /// Reorders channels to BGR and subtracts the corpus means.
  /// Expects `[batch, 224, 224, 3]` intensities scaled 0 to 255.
  pub fn whiten(images: &Tensor<f32>) -> Result<Tensor<f32>> {
    let dims = &images.shape().dims;
    if dims.len() != 4 || dims[1] != IMAGE_SIZE || dims[2] != IMAGE_SIZE || dims[3] != IMAGE_CHANNELS {
      return Err(Error::ShapeMismatch {
        what: "input images".into(),
        expected: vec![dims.first().copied().unwrap_or(1), IMAGE_SIZE, IMAGE_SIZE, IMAGE_CHANNELS],
        got: dims.clone(),
      })
    }
    let input = images.contiguous();
    let raw = input.raw();
    let data = &raw[input.shape().offset..];
    let mut out = Vec::with_capacity(input.size());
    for pixel in data[..input.size()].chunks(IMAGE_CHANNELS) {
      out.push(pixel[2] - BGR_MEAN[0]);
      out.push(pixel[1] - BGR_MEAN[1]);
      out.push(pixel[0] - BGR_MEAN[2]);
    }
    Ok(Tensor::new(dims, out))
  }

  fn logits(&self, images: &Tensor<f32>, training: bool) -> Result<Variable<f32>> {
    let mut out = Self::whiten(images)?.tracked();
    for (layer, kind) in ARCHITECTURE {
      out = match kind {
        LayerKind::Conv { .. } => {
          let out = conv_layer(&self.store, &out, layer, None)?;
          if layer.pooled_after() { max_pool(&out) } else { out }
        },
        LayerKind::Dense { .. } => {
          let scores = dense_layer(&self.store, &out, layer, layer != LayerId::Fc8, None)?;
          if layer == LayerId::Fc8 { scores } else { scores.dropout(DROPOUT_KEEP, training) }
        },
      };
      trace!("{layer}: {:?}", out.shape().dims);
    }
    Ok(out)
  }

  /// Class probabilities for a batch of images. Rows sum to one.
  /// `training` enables dropout.
  pub fn predict(&self, images: &Tensor<f32>, training: bool) -> Result<Tensor<f32>> {
    let scores = self.logits(images, training)?;
    Ok(scores.tensor().softmax(-1))
  }

  /// Mean cross entropy of a labeled batch under the current
  /// parameters, including the L2 penalty when configured.
  pub fn loss(&self, images: &Tensor<f32>, labels: &Tensor<f32>) -> Result<f32> {
    Ok(self.objective(images, labels, false)?.item())
  }

  /// Runs one optimization step over a labeled batch and returns
  /// the loss before the update. Dropout is active.
  pub fn train_step(&mut self, images: &Tensor<f32>, labels: &Tensor<f32>) -> Result<f32> {
    let loss = self.objective(images, labels, true)?;
    self.optimizer.minimize(&loss, &self.store.parameters());
    Ok(loss.item())
  }

  fn objective(&self, images: &Tensor<f32>, labels: &Tensor<f32>, training: bool) -> Result<Variable<f32>> {
    let batch = images.shape()[0];
    if labels.shape().dims != [batch, CLASS_COUNT] {
      return Err(Error::ShapeMismatch {
        what: "labels".into(),
        expected: vec![batch, CLASS_COUNT],
        got: labels.shape().dims.clone(),
      })
    }
    let scores = self.logits(images, training)?;
    let mut loss = scores.softmax_cross_entropy(&labels.tracked()).mean(0);
    if self.regularize {
      loss = loss + self.store.l2_penalty();
    }
    Ok(loss)
  }

  /// Copies current parameter values into a [Snapshot].
  pub fn export(&self) -> Snapshot {
    self.store.export()
  }

  pub fn store(&self) -> &ParamStore {
    &self.store
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn whitening_reorders_channels() {
    let mut data = vec![0.0; IMAGE_SIZE * IMAGE_SIZE * 3];
    data[0] = 255.0;
    data[1] = 128.0;
    data[2] = 64.0;
    let images = Tensor::new(&[1, IMAGE_SIZE, IMAGE_SIZE, 3], data);
    let white = Vgg19::whiten(&images).unwrap();
    assert_eq!(white.at(&[0,0,0]), Tensor::vec(&[
      64.0 - BGR_MEAN[0],
      128.0 - BGR_MEAN[1],
      255.0 - BGR_MEAN[2],
    ]));
    // Black pixels whiten to the negated means
    assert_eq!(white.at(&[0,10,10]), Tensor::vec(&[-BGR_MEAN[0], -BGR_MEAN[1], -BGR_MEAN[2]]));
  }

  #[test]
  fn whitening_rejects_other_sizes() {
    assert!(matches!(
      Vgg19::whiten(&Tensor::rand(&[1,32,32,3])),
      Err(Error::ShapeMismatch { .. })
    ));
  }

  #[test]
  fn rejects_foreign_snapshot() {
    let mut snapshot = Snapshot::new();
    snapshot.insert("conv1_1", Tensor::rand(&[5,5,3,64]), Tensor::zeros(&[64]));
    let result = Vgg19::new(Vgg19Config { snapshot: Some(snapshot), ..Vgg19Config::default() });
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
  }

  #[test]
  fn full_network() {
    let images = Tensor::rand(&[2,224,224,3]) * 255.0;
    let labels = Tensor::new(&[2], vec![3u32, 7]).one_hot::<f32>(CLASS_COUNT);

    let mut network = Vgg19::new(Vgg19Config::default()).unwrap();
    assert_eq!(network.store().len(), 19);

    let eval = network.predict(&images, false).unwrap();
    assert_eq!(eval.shape().dims, vec![2, CLASS_COUNT]);
    assert!(eval.param_iter().all(|p| p >= 0.0 ));
    for i in 0..2 {
      let total: f32 = eval.at(&[i]).param_iter().sum();
      assert!((total - 1.0).abs() < 1e-4);
    }
    // Identical inputs and parameters give identical scores
    assert_eq!(network.predict(&images, false).unwrap(), eval);

    let sampled = network.predict(&images, true).unwrap();
    for i in 0..2 {
      let total: f32 = sampled.at(&[i]).param_iter().sum();
      assert!((total - 1.0).abs() < 1e-4);
    }

    // Fresh parameters score every class evenly
    let loss = network.loss(&images, &labels).unwrap();
    assert!((loss - (CLASS_COUNT as f32).ln()).abs() < 0.01);

    let first = network.train_step(&images, &labels).unwrap();
    let second = network.train_step(&images, &labels).unwrap();
    assert!(first.is_finite() && second.is_finite());
    assert!(first > 0.0 && second > 0.0);

    let snapshot = network.export();
    assert_eq!(snapshot.len(), 19);
    let trained = network.predict(&images, false).unwrap();
    drop(network);

    // A restored network reproduces the exported state exactly
    let restored = Vgg19::new(Vgg19Config {
      snapshot: Some(snapshot.clone()),
      ..Vgg19Config::default()
    }).unwrap();
    assert_eq!(restored.predict(&images, false).unwrap(), trained);
    assert_eq!(restored.export().names(), snapshot.names());

    // Weight decay adds the penalty on top of the plain objective
    let plain = restored.loss(&images, &labels).unwrap();
    let decayed = Vgg19::new(Vgg19Config {
      snapshot: Some(snapshot.clone()),
      weight_decay: Some(1e-4),
      ..Vgg19Config::default()
    }).unwrap();
    let with_penalty = decayed.loss(&images, &labels).unwrap();
    assert!(with_penalty > plain);
    assert!(with_penalty - plain < 10.0);
    drop(decayed);
    drop(restored);

    // Layers absent from a snapshot initialize randomly
    let mut partial = Snapshot::new();
    for name in ["conv1_1", "fc6"] {
      let (weight, bias) = snapshot.get(name).unwrap();
      partial.insert(name, weight.clone(), bias.clone());
    }
    let mixed = Vgg19::new(Vgg19Config { snapshot: Some(partial), ..Vgg19Config::default() }).unwrap();
    assert_eq!(mixed.store().len(), 19);
    let fresh = mixed.predict(&images, false).unwrap();
    assert_eq!(fresh.shape().dims, vec![2, CLASS_COUNT]);
  }
}
