//! Runtime components for supervising BrowserStackLocal

pub mod launcher;
pub mod session;

pub use launcher::*;
pub use session::*;
