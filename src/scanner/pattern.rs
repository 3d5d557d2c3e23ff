//! File-name glob matching for discovery.
//!
//! Only the final path component is matched. `*` matches any run of
//! characters, `?` exactly one; everything else is literal. Case folding,
//! when enabled, is the regex engine's simple case folding.

#![allow(missing_docs)]

use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::core::errors::{Result, WcffError};

/// Compiled file-name glob.
#[derive(Debug, Clone)]
pub struct FilePattern {
    glob: String,
    regex: Regex,
}

impl FilePattern {
    /// Compile `glob`. With `case_insensitive`, letter case is ignored.
    pub fn new(glob: &str, case_insensitive: bool) -> Result<Self> {
        if glob.is_empty() {
            return Err(WcffError::InvalidConfig {
                details: "file pattern must not be empty".to_string(),
            });
        }
        if glob.contains(['/', '\\']) {
            return Err(WcffError::InvalidConfig {
                details: format!("file pattern {glob:?} must name files, not paths"),
            });
        }

        let regex = RegexBuilder::new(&glob_to_regex(glob))
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|err| WcffError::InvalidConfig {
                details: format!("invalid file pattern {glob:?}: {err}"),
            })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Match a bare file name.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Match the last component of `path`; paths without one never match.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matches_name(&name.to_string_lossy()))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex_str = String::with_capacity(glob.len() * 2 + 2);
    regex_str.push_str("(?s)^");
    for c in glob.chars() {
        match c {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            c => {
                let mut buf = [0u8; 4];
                regex_str.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }
    regex_str.push('$');
    regex_str
}
