pub mod billing;
pub mod db;
pub mod error;
pub mod keyer;
pub mod models;
pub mod parser;
pub mod planner;
pub mod reconciler;
pub mod recurring;

pub use error::{EngineError, Result, ValidationError};
