use std::collections::HashMap;
use std::path::Path;

use serde::{ Serialize, Deserialize };
use itertools::Itertools;

use crate::{
  tensor::Tensor,
  error::{ Error, Result },
};


/// Saved parameter state, keyed by layer name. Each entry pairs a
/// kernel or weight matrix with its bias vector. Names without a
/// counterpart in the architecture table are carried along but
/// ignored on restore.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
  entries: HashMap<String, (Tensor<f32>, Tensor<f32>)>,
}

impl Snapshot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: &str, weight: Tensor<f32>, bias: Tensor<f32>) {
    self.entries.insert(name.into(), (weight, bias));
  }

  pub fn get(&self, name: &str) -> Option<&(Tensor<f32>, Tensor<f32>)> {
    self.entries.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entry names in alphabetical order.
  pub fn names(&self) -> Vec<&str> {
    self.entries.keys().map(|name| name.as_str() ).sorted().collect()
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    postcard::to_allocvec(self).map_err(|err| Error::SnapshotLoad(err.to_string()) )
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    postcard::from_bytes(bytes).map_err(|err| Error::SnapshotLoad(err.to_string()) )
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    Self::from_bytes(&std::fs::read(path)?)
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    Ok(std::fs::write(path, self.to_bytes()?)?)
  }
}
