use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::{Regex, RegexBuilder};

use crate::error::MirrorError;

/// Decides which relative paths are left out of mirroring entirely.
///
/// The primary rule is a single regular expression searched anywhere in the
/// forward-slash relative path. Extra glob patterns may be added; a glob is
/// tried against the full relative path and against the file name alone, so
/// `*.log` works at any depth while `cache/**` anchors at the root.
/// All matching is case-insensitive.
#[derive(Debug, Default)]
pub struct ExclusionFilter {
    pattern: Option<Regex>,
    globs: Option<GlobSet>,
}

impl ExclusionFilter {
    /// Build a filter. `None` or an empty pattern excludes nothing.
    pub fn new(pattern: Option<&str>, glob_patterns: &[String]) -> Result<Self, MirrorError> {
        let pattern = match pattern.filter(|p| !p.is_empty()) {
            Some(p) => Some(
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| MirrorError::InvalidPattern {
                        pattern: p.to_string(),
                        reason: e.to_string(),
                    })?,
            ),
            None => None,
        };

        let globs = if glob_patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for glob in glob_patterns {
                builder.add(GlobBuilder::new(glob).case_insensitive(true).build()?);
            }
            Some(builder.build()?)
        };

        Ok(Self { pattern, globs })
    }

    /// Returns true if `relative` must not be uploaded, deleted or tracked.
    pub fn is_excluded(&self, relative: &str) -> bool {
        if let Some(ref pattern) = self.pattern {
            if pattern.is_match(relative) {
                return true;
            }
        }

        if let Some(ref globs) = self.globs {
            let path = Path::new(relative);
            if globs.is_match(path) {
                return true;
            }
            if let Some(file_name) = path.file_name() {
                if globs.is_match(Path::new(file_name)) {
                    return true;
                }
            }
        }

        false
    }
}
