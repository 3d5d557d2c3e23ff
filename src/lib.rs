#![forbid(unsafe_code)]

//! WannaCry leftover file finder.
//!
//! While encrypting, WannaCry writes working copies of its victims' files
//! as `*.WNCRYT` temporaries and leaves many of them behind unencrypted.
//! This crate finds those files and copies them out under an extension that
//! matches their real content:
//! 1. **Discovery**: concurrent directory walks streaming matching paths
//! 2. **Classification**: header signatures, container inspection and a
//!    content-type oracle
//! 3. **Recovery**: parallel copy-out with an overwrite policy
//!
//! # Library usage
//!
//! ```rust,no_run
//! use wannacry_file_finder::prelude::*;
//!
//! let pattern = FilePattern::new("*.WNCRYT", true)?;
//! let discovery = discover(&[std::path::PathBuf::from("/")], &pattern);
//! let copier = RecoveryCopier::new(TypeClassifier::default());
//! let report = copier.recover_stream(std::path::Path::new("recovered"), false, discovery);
//! println!("{} copied", report.copied);
//! # Ok::<(), WcffError>(())
//! ```

pub mod prelude;

pub mod classify;
pub mod core;
pub mod logger;
pub mod recovery;
pub mod scanner;
