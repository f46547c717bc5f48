pub mod definition;
pub mod error;
pub mod execution;
pub mod factory;
pub mod lifecycle;
pub mod snapshot;
pub mod state;
pub mod tree;
pub mod types;

#[cfg(test)]
mod tests;

pub use definition::*;
pub use error::*;
pub use execution::*;
pub use factory::*;
pub use snapshot::*;
pub use state::*;
pub use tree::*;
pub use types::*;
