use std::rc::Rc;
use std::collections::HashSet;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::fmt::Debug;

mod mops;

use crate::{
  tensor::Tensor,
  scalar::Real,
  ops::{ BaseOps, NumericOps, Hops },
};


fn make_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


/// Unary operation that can also compute its derivative.

pub trait UnaryOp<T: Real>: Debug {
  fn run(&self, lhs: &Tensor<T>) -> Tensor<T>;
  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Tensor<T>;
}


/// Binary operation that can also compute its derivatives.

pub trait BinaryOp<T: Real>: Debug {
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Tensor<T>;
  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> (Tensor<T>, Tensor<T>);
}


#[derive(Debug)]
enum Op<T: Real> {
  Unary(Box<dyn UnaryOp<T>>),
  Binary(Box<dyn BinaryOp<T>>),
}


// A node owns its value and gradient, plus the operation and input
// nodes that produced it. Gradients mutate through the tensor's
// shared storage, the node itself stays immutable.

#[derive(Debug)]
struct Node<T: Real> {
  id: usize,
  data: Tensor<T>,
  grad: Option<Tensor<T>>,
  op: Option<Op<T>>,
  inputs: Vec<Rc<Self>>,
  trainable: bool,
}

impl<T: Real> Node<T> {
  fn reset_gradient(&self, filler: T) {
    if let Some(grad) = &self.grad {
      grad.refill(filler);
    }
  }

  fn backward(&self) {
    let (op, grad) = match (&self.op, &self.grad) {
      (Some(op), Some(grad)) => (op, grad),
      _ => return,
    };
    let changes = match op {
      Op::Unary(op) => vec![op.derive(&self.inputs[0].data, grad)],
      Op::Binary(op) => {
        let (left, right) = op.derive(&self.inputs[0].data, &self.inputs[1].data, grad);
        vec![left, right]
      },
    };
    for (change, input) in changes.iter().zip(&self.inputs) {
      if let Some(grad) = &input.grad {
        grad.op_assign(change, |a, b| *a += b );
      }
    }
  }
}


/// A [Tensor] wrapped into a computation graph.
///
/// Every differentiable operation on a Variable records itself, so
/// that [backward](Variable::backward) can later walk the graph and
/// accumulate gradients into all trainable ancestors.
///
/// Variables get created by calling [tracked](Tensor::tracked) or
/// [trained](Tensor::trained) on a [Real] valued [Tensor]. They
/// dereference to their underlying tensor for all non-differentiable
/// operations.

#[derive(Debug, Clone)]
pub struct Variable<T: Real> {
  node: Rc<Node<T>>,
}

impl<T: Real> Hops<T> for Variable<T> {}

impl<T: Real> std::ops::Deref for Variable<T> {
  type Target = Tensor<T>;

  fn deref(&self) -> &Self::Target {
    &self.node.data
  }
}

impl<T: Real> PartialEq for Variable<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.node.data == rhs.node.data
  }
}

impl<T: Real> Variable<T> {
  pub(crate) fn from_tensor(tensor: Tensor<T>, trainable: bool) -> Self {
    Self {
      node: Rc::new(Node {
        id: make_id(),
        grad: trainable.then(|| Tensor::zeros(&tensor.shape().dims) ),
        data: tensor,
        op: None,
        inputs: vec![],
        trainable,
      }),
    }
  }

  fn operation(op: Op<T>, data: Tensor<T>, grad: bool, inputs: Vec<Rc<Node<T>>>) -> Self {
    Self {
      node: Rc::new(Node {
        id: make_id(),
        grad: grad.then(|| Tensor::zeros(&data.shape().dims) ),
        data,
        op: Some(op),
        inputs,
        trainable: false,
      }),
    }
  }

  pub fn id(&self) -> usize {
    self.node.id
  }

  pub fn tensor(&self) -> &Tensor<T> {
    &self.node.data
  }

  pub fn grad(&self) -> Option<&Tensor<T>> {
    self.node.grad.as_ref()
  }

  /// Record `op` as a new node. The result only carries gradient
  /// storage when this input does.

  pub fn unary_op(&self, op: impl UnaryOp<T> + 'static) -> Self {
    let data = op.run(&self.node.data);
    Self::operation(
      Op::Unary(Box::new(op)),
      data,
      self.grad().is_some(),
      vec![self.node.clone()],
    )
  }

  /// Record `op` as a new node. The result only carries gradient
  /// storage when either input does.

  pub fn binary_op(&self, op: impl BinaryOp<T> + 'static, rhs: &Self) -> Self {
    let data = op.run(&self.node.data, &rhs.node.data);
    Self::operation(
      Op::Binary(Box::new(op)),
      data,
      self.grad().is_some() || rhs.grad().is_some(),
      vec![self.node.clone(), rhs.node.clone()],
    )
  }

  /// Compute gradients across this Variable's entire graph.
  ///
  /// Gradients accumulate into every trainable ancestor until
  /// [reset](Variable::reset) is called.

  pub fn backward(&self) {
    if self.grad().is_none() { panic!("Cannot compute gradients for constant {self}") }
    self.node.reset_gradient(T::one());
    for node in self.ancestors().iter().rev() {
      node.backward();
    }
  }

  /// List all trainable parameters in this Variable's graph.

  pub fn parameters(&self) -> Vec<Self> {
    self.ancestors()
      .into_iter()
      .filter(|node| node.trainable )
      .map(|node| Self { node } )
      .collect()
  }

  /// Set gradients to zero for this Variable's entire graph.

  pub fn reset(&self) {
    for node in self.ancestors() {
      node.reset_gradient(T::zero());
    }
  }

  // Topologically ordered, every node after all of its inputs

  fn ancestors(&self) -> Vec<Rc<Node<T>>> {
    let mut ordered = vec![];
    Self::collect_ancestors(&self.node, &mut ordered, &mut HashSet::new());
    ordered
  }

  fn collect_ancestors(node: &Rc<Node<T>>, ordered: &mut Vec<Rc<Node<T>>>, visited: &mut HashSet<usize>) {
    if visited.contains(&node.id) { return }
    visited.insert(node.id);
    for input in &node.inputs {
      Self::collect_ancestors(input, ordered, visited);
    }
    ordered.push(node.clone());
  }

  /// Compare a function's automatically derived gradient against a
  /// numerical estimate over randomly generated input, returning
  /// the average difference.

  pub fn check_gradients<F>(shape: &[usize], generator: F) -> T
  where
    F: Fn(&Self) -> Self
  {
    let eps = T::from(1e-4).unwrap();
    let input = Tensor::randn(shape);
    let output = {
      let var = input.trained();
      let output = generator(&var).sum(0);
      output.reset();
      output.backward();
      var.grad().unwrap().detach()
    };
    // Central difference for every entry of the input
    let len = input.shape().size();
    let mut estimate = vec![T::zero(); len];
    for i in 0..len {
      let probe = Tensor::hot_encode(i, len).reshape(shape) * eps;
      let below = generator(&(&input - &probe).tracked()).sum(0);
      let above = generator(&(&input + &probe).tracked()).sum(0);
      estimate[i] = (above.item() - below.item()) / (eps + eps);
    }
    let estimate = Tensor::new(&output.shape().dims, estimate);
    (output - estimate).abs().mean(0).item()
  }

  pub fn tracked(&self) -> Self { panic!("Variable is already being tracked") }
  pub fn trained(&self) -> Self { panic!("Variable is already being tracked") }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    let title = if self.node.trainable { "Trainable" }
      else if self.node.grad.is_some() { "Computed" }
      else { "Tracked" };
    write!(f, "{title} {}", self.tensor())
  }
}
