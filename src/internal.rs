use rand::Rng;

use crate::scalar::Real;


#[inline]
pub fn negative_index(i: isize, n: usize, start_behind: bool) -> usize {
  if i >= 0 { return i as usize }
  let behind = start_behind as isize;
  (n as isize + i + behind) as usize
}


// Polar Box-Muller transform

pub fn randn<T: Real>() -> (T, T) {
  let mut rng = rand::thread_rng();
  loop {
    let u = rng.gen_range(-T::one()..T::one());
    let v = rng.gen_range(-T::one()..T::one());
    let r = u * u + v * v;
    // Resample until inside the unit circle
    if r == T::zero() || r >= T::one() { continue }
    let scale = (T::from(-2.0).unwrap() * r.ln() / r).sqrt();
    return (u * scale, v * scale);
  }
}
