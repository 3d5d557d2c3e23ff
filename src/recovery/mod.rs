//! Copying leftover files back out under their classified extension.

pub mod copier;
