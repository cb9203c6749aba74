//! Configuration for unijob.
//!
//! Configuration is an explicit immutable value threaded into each component
//! at construction; there is no ambient global state. Unknown YAML fields are
//! ignored for forward compatibility.

mod model;
mod operations;
mod types;

#[cfg(test)]
mod tests;

pub use model::Config;
pub use types::ReaperStrategy;
