//! Configuration sources and command-line resolution

mod args;
mod resolver;
mod variables;

pub use args::*;
pub use resolver::*;
pub use variables::*;
