//! The concrete moves that ship with the crate.

mod exchange;
mod joint;
mod random_walk;
mod scale;
mod uniform;

#[cfg(test)]
pub(crate) mod test_rng;

pub use exchange::{ExchangeOperator, ExchangeVariant, MIN_EXCHANGE_TIPS};
pub use joint::JointOperator;
pub use random_walk::{BoundaryCondition, RandomWalkOperator};
pub use scale::{ScaleMode, ScaleOperator, MIN_SCALE_FACTOR};
pub use uniform::UniformOperator;
