pub mod config;
pub mod data_io;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod regrid;
pub mod time_utils;

pub use error::PhysicsError;
pub use math::{pressure_on_hybrid, sea_level_pressure};
