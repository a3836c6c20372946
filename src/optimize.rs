use std::collections::HashMap;

use crate::{
  scalar::Real,
  tensor::Tensor,
  variable::Variable,
  ops::{ BaseOps, Hops },
};


/// An update rule to be used with [Optimizer].
///
/// Produces the change to add onto a parameter, given its
/// accumulated gradient.

pub trait Strategy<R: Real> {
  fn update(&mut self, param: &Variable<R>, rate: R, step: usize) -> Tensor<R>;
}


/// Drives training by applying a [Strategy] to every parameter of
/// a loss after each backward pass.

#[derive(Debug)]
pub struct Optimizer<R: Real, S: Strategy<R>> {
  strategy: S,
  pub learning_rate: R,
  step: usize,
}

impl<R: Real, S: Strategy<R>> Optimizer<R, S> {
  pub fn new(learning_rate: R, strategy: S) -> Self {
    Self { strategy, learning_rate, step: 1 }
  }

  /// Backpropagate `loss`, update all `params` in place and reset
  /// the gradients again.

  pub fn minimize(&mut self, loss: &Variable<R>, params: &[Variable<R>]) {
    loss.backward();
    for param in params {
      param.grad().expect("Non-trainable parameters cannot be optimized");
      let change = self.strategy.update(param, self.learning_rate, self.step);
      let weights = param.tensor();
      weights.assign(&(weights + change));
    }
    loss.reset();
    self.step += 1;
  }
}


/// Stochastic Gradient Descent

#[derive(Debug, Clone, Default)]
pub struct SGD;

impl<R: Real> Strategy<R> for SGD {
  fn update(&mut self, param: &Variable<R>, rate: R, _step: usize) -> Tensor<R> {
    param.grad().unwrap() * -rate
  }
}


/// Adaptive Moment Estimation (Adam)
///
/// Keeps running estimates of the first and second gradient moment
/// per parameter, keyed by the parameter's id.

#[derive(Debug, Clone)]
pub struct Adam<R: Real> {
  pub beta1: R,
  pub beta2: R,
  m: HashMap<usize, Tensor<R>>,
  v: HashMap<usize, Tensor<R>>,
}

impl<R: Real> Adam<R> {
  pub fn new(beta1: R, beta2: R) -> Self {
    Self {
      beta1,
      beta2,
      m: HashMap::new(),
      v: HashMap::new(),
    }
  }
}

impl<R: Real> Default for Adam<R> {
  fn default() -> Self {
    Self::new(R::from(0.9).unwrap(), R::from(0.999).unwrap())
  }
}

impl<R: Real> Strategy<R> for Adam<R> {
  fn update(&mut self, param: &Variable<R>, rate: R, step: usize) -> Tensor<R> {
    let id = param.id();
    let dims = &param.tensor().shape().dims;
    let grad = param.grad().unwrap();
    // Clones share storage, so assigning below updates the entries
    let m = self.m.entry(id).or_insert_with(|| Tensor::zeros(dims) ).clone();
    let v = self.v.entry(id).or_insert_with(|| Tensor::zeros(dims) ).clone();
    m.assign(&(&m * self.beta1 + grad * (R::one() - self.beta1)));
    v.assign(&(&v * self.beta2 + grad.sqr() * (R::one() - self.beta2)));
    let step = R::from(step).unwrap();
    let mt = &m / (R::one() - self.beta1.powf(step));
    let vt = &v / (R::one() - self.beta2.powf(step));
    mt * -rate / (vt.sqrt() + R::from(1e-8).unwrap())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::ops::{ NumericOps, RealOps };

  #[test]
  fn sgd_converges() {
    let w = Tensor::<f64>::vec(&[0.0]).trained();
    let mut optimizer = Optimizer::new(0.1, SGD);
    for _ in 0..50 {
      let loss = (&w - 3.0).sqr().sum(0);
      optimizer.minimize(&loss, &[w.clone()]);
    }
    assert!((w.tensor().item() - 3.0).abs() < 1e-3);
  }

  #[test]
  fn adam_converges() {
    let w = Tensor::<f64>::vec(&[0.0, 0.0]).trained();
    let target = Tensor::vec(&[1.0, -2.0]).tracked();
    let mut optimizer = Optimizer::new(0.05, Adam::default());
    for _ in 0..500 {
      let loss = (&w - &target).sqr().sum(0);
      optimizer.minimize(&loss, &[w.clone()]);
    }
    for (got, want) in w.tensor().param_iter().zip(target.tensor().param_iter()) {
      assert!((got - want).abs() < 0.05, "{got} hasn't reached {want}");
    }
  }

  #[test]
  fn training_reduces_loss() {
    let x = Tensor::rand(&[8,4]).tracked();
    let labels = Tensor::new(&[8], vec![0u32, 1, 2, 0, 1, 2, 0, 1])
      .one_hot::<f32>(3)
      .tracked();
    let w1 = (Tensor::randn(&[4,8]) * 0.5).trained();
    let b1 = Tensor::zeros(&[8]).trained();
    let w2 = (Tensor::randn(&[8,3]) * 0.5).trained();
    let b2 = Tensor::zeros(&[3]).trained();
    let params = [w1.clone(), b1.clone(), w2.clone(), b2.clone()];
    let objective = || {
      let hidden = (x.mm(&w1) + &b1).relu();
      let scores = hidden.mm(&w2) + &b2;
      scores.softmax_cross_entropy(&labels).mean(0)
    };
    let mut optimizer = Optimizer::new(0.05, Adam::default());
    let before = objective().item();
    for _ in 0..30 {
      let loss = objective();
      optimizer.minimize(&loss, &params);
    }
    assert!(objective().item() < before);
  }
}
