use std::cell::RefCell;
use std::collections::BTreeMap;

use log::debug;

use crate::{
  arch::LayerId,
  error::{ Error, Result },
  ops::{ BaseOps, Hops, NumericOps },
  snapshot::Snapshot,
  tensor::Tensor,
  variable::Variable,
};

/// Standard deviation of freshly initialized weights.
pub const INIT_STDDEV: f32 = 1e-3;


/// Weight and bias handles of one layer. Clones share storage, so
/// optimizer updates are visible through every handle.

#[derive(Debug, Clone)]
pub struct Parameter {
  pub weight: Variable<f32>,
  pub bias: Variable<f32>,
}


/// Lazily created store of all trainable parameters, keyed by
/// layer. Creation order doesn't matter, iteration always follows
/// the architecture table.

#[derive(Debug)]
pub struct ParamStore {
  entries: RefCell<BTreeMap<LayerId, Parameter>>,
  decay: f32,
}

impl ParamStore {
  pub fn new(decay: f32) -> Self {
    Self {
      entries: RefCell::new(BTreeMap::new()),
      decay,
    }
  }

  /// Returns the stored handles for `layer`, creating them on first
  /// use. Creation restores values from `snapshot` when it has a
  /// matching entry and falls back to random initialization. The
  /// weights get drawn from a truncated normal distribution, biases
  /// start at zero.
  pub fn get_or_create(
    &self,
    layer: LayerId,
    weight_dims: &[usize],
    bias_dims: &[usize],
    snapshot: Option<&Snapshot>,
  ) -> Result<Parameter> {
    if let Some(param) = self.entries.borrow().get(&layer) {
      return Ok(param.clone())
    }
    let (weight, bias) = match snapshot.and_then(|s| s.get(layer.as_str()) ) {
      Some((weight, bias)) => {
        if weight.shape().dims != weight_dims {
          return Err(Error::ShapeMismatch {
            what: format!("{layer} weights"),
            expected: weight_dims.to_vec(),
            got: weight.shape().dims.clone(),
          })
        }
        if bias.shape().dims != bias_dims {
          return Err(Error::ShapeMismatch {
            what: format!("{layer} biases"),
            expected: bias_dims.to_vec(),
            got: bias.shape().dims.clone(),
          })
        }
        debug!("{layer}: restoring {} scalars from snapshot", weight.size() + bias.size());
        // Copies, so training never writes back into the snapshot
        (weight.detach(), bias.detach())
      },
      None => {
        debug!("{layer}: initializing {} scalars randomly",
          weight_dims.iter().product::<usize>() + bias_dims.iter().product::<usize>());
        (Tensor::randn_truncated(weight_dims, INIT_STDDEV), Tensor::zeros(bias_dims))
      },
    };
    let param = Parameter {
      weight: weight.trained(),
      bias: bias.trained(),
    };
    self.entries.borrow_mut().insert(layer, param.clone());
    Ok(param)
  }

  /// All handles in table order, weights before biases within a layer.
  pub fn parameters(&self) -> Vec<Variable<f32>> {
    self.entries.borrow().values()
      .flat_map(|param| [param.weight.clone(), param.bias.clone()] )
      .collect()
  }

  /// Sum of squared weights scaled by the decay coefficient.
  /// Biases are left out.
  pub fn l2_penalty(&self) -> Variable<f32> {
    let entries = self.entries.borrow();
    let mut penalty = Tensor::scalar(0.0).tracked();
    for param in entries.values() {
      penalty = penalty + param.weight.sqr().sum(0);
    }
    penalty * self.decay
  }

  /// Copies current parameter values into a fresh [Snapshot].
  pub fn export(&self) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for (layer, param) in self.entries.borrow().iter() {
      snapshot.insert(layer.as_str(), param.weight.tensor().detach(), param.bias.tensor().detach());
    }
    snapshot
  }

  pub fn decay(&self) -> f32 {
    self.decay
  }

  pub fn len(&self) -> usize {
    self.entries.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.borrow().is_empty()
  }

  /// Total number of stored scalars.
  pub fn scalar_count(&self) -> usize {
    self.entries.borrow().values()
      .map(|param| param.weight.size() + param.bias.size() )
      .sum()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::LayerId::*;

  #[test]
  fn creates_then_shares() {
    let store = ParamStore::new(1e-4);
    let first = store.get_or_create(Conv1_1, &[3,3,3,64], &[64], None).unwrap();
    let second = store.get_or_create(Conv1_1, &[3,3,3,64], &[64], None).unwrap();
    assert_eq!(first.weight.id(), second.weight.id());
    assert_eq!(store.len(), 1);
    // Updates through one handle are visible through the other
    first.weight.tensor().assign(&Tensor::zeros(&[3,3,3,64]));
    assert_eq!(second.weight.tensor(), &Tensor::zeros(&[3,3,3,64]));
  }

  #[test]
  fn random_initialization() {
    let store = ParamStore::new(0.0);
    let param = store.get_or_create(Fc8, &[64,10], &[10], None).unwrap();
    let values: Vec<f32> = param.weight.tensor().param_iter().collect();
    assert!(values.iter().any(|&v| v != values[0] ));
    assert!(values.iter().all(|&v| v.abs() <= 2.0 * INIT_STDDEV ));
    assert_eq!(param.bias.tensor(), &Tensor::zeros(&[10]));
  }

  #[test]
  fn restores_from_snapshot() {
    let mut snapshot = Snapshot::new();
    let weight = Tensor::rand(&[4,2]);
    snapshot.insert("fc8", weight.clone(), Tensor::vec(&[0.5, -0.5]));
    let store = ParamStore::new(0.0);
    let param = store.get_or_create(Fc8, &[4,2], &[2], Some(&snapshot)).unwrap();
    assert_eq!(param.weight.tensor(), &weight);
    assert_eq!(param.bias.tensor(), &Tensor::vec(&[0.5, -0.5]));
    // Training must never write back into the snapshot
    param.weight.tensor().assign(&Tensor::zeros(&[4,2]));
    assert_eq!(&snapshot.get("fc8").unwrap().0, &weight);
  }

  #[test]
  fn rejects_mismatched_snapshot() {
    let mut snapshot = Snapshot::new();
    snapshot.insert("fc8", Tensor::rand(&[4,3]), Tensor::zeros(&[3]));
    let store = ParamStore::new(0.0);
    let result = store.get_or_create(Fc8, &[4,2], &[2], Some(&snapshot));
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    assert!(store.is_empty());
  }

  #[test]
  fn export_round_trips() {
    let store = ParamStore::new(0.0);
    store.get_or_create(Conv1_1, &[3,3,3,8], &[8], None).unwrap();
    store.get_or_create(Fc8, &[32,10], &[10], None).unwrap();
    let snapshot = store.export();
    assert_eq!(snapshot.names(), vec!["conv1_1", "fc8"]);
    let restored = ParamStore::new(0.0);
    let param = restored.get_or_create(Conv1_1, &[3,3,3,8], &[8], Some(&snapshot)).unwrap();
    let original = store.get_or_create(Conv1_1, &[3,3,3,8], &[8], None).unwrap();
    assert_eq!(param.weight.tensor(), original.weight.tensor());
  }

  #[test]
  fn parameters_follow_table_order() {
    let store = ParamStore::new(0.0);
    store.get_or_create(Fc8, &[8,4], &[4], None).unwrap();
    store.get_or_create(Conv1_1, &[3,3,3,8], &[8], None).unwrap();
    let params = store.parameters();
    assert_eq!(params.len(), 4);
    assert_eq!(params[0].shape().dims, vec![3,3,3,8]);
    assert_eq!(params[3].shape().dims, vec![4]);
    assert_eq!(store.scalar_count(), 3 * 3 * 3 * 8 + 8 + 8 * 4 + 4);
  }

  #[test]
  fn penalty_tracks_weights() {
    let store = ParamStore::new(0.5);
    let param = store.get_or_create(Fc8, &[2,2], &[2], None).unwrap();
    param.weight.tensor().assign(&Tensor::vec(&[1.0, 2.0, 3.0, 4.0]).reshape(&[2,2]));
    let penalty = store.l2_penalty();
    assert!((penalty.item() - 15.0).abs() < 1e-5);
    penalty.backward();
    assert_eq!(param.weight.grad(), Some(&Tensor::vec(&[1.0, 2.0, 3.0, 4.0]).reshape(&[2,2])));
  }
}
