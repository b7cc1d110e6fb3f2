pub mod backend;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod inference;
pub mod runner;
pub mod store;
pub mod vis;

pub use engine::layer::stack::{StackConfig, StackedDenoisingAutoencoder};
pub use error::{Result, SdaError};
