pub mod broadcast;
pub mod hybrid;
pub mod physics;
pub mod vertical;

#[cfg(test)]
mod tests;

pub use broadcast::*;
pub use hybrid::*;
pub use physics::*;
pub use vertical::*;
