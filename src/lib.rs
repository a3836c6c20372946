//! VGG19 image classification with training support, built on a
//! compact reverse mode autograd engine. CPU only.
//!
//! # Features
//!
//! - **Inference** — Batched classification of 224x224 RGB images
//! into 1000 classes, with input whitening matching the original
//! training corpus.
//!
//! - **Training** — Softmax cross entropy objective minimized with
//! Adam, dropout on the fully connected layers and optional weight
//! decay.
//!
//! - **Snapshots** — Parameters can be captured, persisted and
//! restored across sessions. Layers missing from a snapshot fall
//! back to random initialization.
//!
//! - **Broadcasting** — Operations accept tensors of differing but
//! compatible shapes, repeating dimensions as needed.
//!
//! - **Gradient checking** — Every differentiable operation can be
//! verified against a numerical derivative.
//!
//! # Examples
//!
//! Classifying an image with saved parameters:
//! ```no_run
//! use vgg19::{ util, Snapshot, Vgg19, Vgg19Config };
//!
//! fn main() -> vgg19::Result<()> {
//!   let snapshot = Snapshot::load("vgg19.snapshot")?;
//!   let network = Vgg19::new(Vgg19Config { snapshot: Some(snapshot), ..Default::default() })?;
//!
//!   let images = util::batch_images(&[util::load_image("tabby.jpg")?]);
//!   let probs = network.predict(&images, false)?;
//!
//!   for (class, p) in util::top_k(&probs.at(&[0]), 5) {
//!     println!("{class}: {p:.4}");
//!   }
//!   Ok(())
//! }
//! ```
//!
//! Training an arbitrary function with the underlying engine:
//! ```
//! use vgg19::{ ops::*, Tensor, optimize::{ Optimizer, Adam } };
//!
//! let x = Tensor::new(&[1,2], vec![1.0, 2.0]).tracked();
//! let w = Tensor::randn(&[2,8]).trained();
//! let b = Tensor::zeros(&[8]).trained();
//!
//! let mut optimizer = Optimizer::new(0.001, Adam::default());
//!
//! for _ in 0..100 {
//!   let loss = ((x.mm(&w) + &b).relu() - 0.5).sqr().mean(0);
//!   optimizer.minimize(&loss, &loss.parameters());
//! }
//! ```
//!
//! # Optional features
//!
//! Parts of the crate can be switched on and off in your `Cargo.toml`.
//!
//! - `unsafe` *(default)* — Matrix products go through the [matrixmultiply]
//! crate instead of a naive loop.
//! - `rayon` — Convolutions process the images of a batch in parallel.

mod internal;
mod shape;
mod tensor;
mod variable;
mod error;
mod arch;
mod snapshot;
mod params;
mod layers;
mod vgg;

pub mod ops;
pub mod scalar;
pub mod optimize;
pub mod util;

pub use shape::Shape;
pub use tensor::{ Tensor, Gemm };
pub use variable::{ Variable, UnaryOp, BinaryOp };
pub use error::{ Error, Result };
pub use arch::{
  LayerId, LayerKind, ARCHITECTURE, POOL_AFTER,
  CLASS_COUNT, IMAGE_CHANNELS, IMAGE_SIZE, POOL_SIZE,
};
pub use snapshot::Snapshot;
pub use params::{ Parameter, ParamStore, INIT_STDDEV };
pub use layers::{ conv_layer, dense_layer, max_pool };
pub use vgg::{
  Vgg19, Vgg19Config,
  BGR_MEAN, DROPOUT_KEEP, LEARNING_RATE, WEIGHT_DECAY,
};
