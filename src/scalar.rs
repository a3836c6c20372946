use rand::distributions::uniform::SampleUniform;
use num_traits::{ Num, NumAssignOps, NumCast, PrimInt };


macro_rules! scalar_trait {
  ($(#[$attr:meta])* $name:ident: $($bound:path),+) => {
    $(#[$attr])*
    pub trait $name: $($bound +)+ {}
    impl<T: $($bound +)+> $name for T {}
  };
}

scalar_trait! {
  /// Any type a [Tensor](crate::Tensor) may contain.
  ///
  /// Implemented automatically for every type that satisfies the
  /// listed bounds.
  Element: PartialEq, Clone, Copy, Send, Sync, std::fmt::Debug
}

scalar_trait! {
  /// Numeric element types.
  Numeric: Element, PartialOrd, Num, NumCast, NumAssignOps, std::iter::Sum
}

scalar_trait! {
  /// Integer element types.
  Integer: Numeric, PrimInt
}

scalar_trait! {
  /// Unsigned integer element types.
  Unsigned: Numeric, num_traits::Unsigned
}

scalar_trait! {
  /// Signed element types.
  Signed: Numeric, num_traits::Signed
}

scalar_trait! {
  /// Continuous element types, as used for all differentiable
  /// operations.
  Real: Signed, num_traits::real::Real, SampleUniform
}
