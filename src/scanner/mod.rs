//! Leftover-file discovery: file-name patterns and the concurrent walker.

pub mod pattern;
pub mod walker;
