mod config;
mod error;
mod operator;
mod types;

pub use config::*;
pub use error::*;
pub use operator::*;
pub use types::*;
