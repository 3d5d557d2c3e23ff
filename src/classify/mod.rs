//! Content-based file-type identification.

pub mod classifier;
pub mod container;
pub mod oracle;
pub mod registry;
