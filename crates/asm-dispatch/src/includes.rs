//! `.include` file access, injected rather than hard-wired to `std::fs`
//! (`spec.md` §9 "pass an output sink as an explicit dependency... no
//! process-wide singletons" — the same argument applies to any I/O the
//! core needs, not only diagnostics).

/// Resolves an `.include "path"` directive to source text. The CLI binds
/// this to the filesystem with its `-I` search path; tests bind it to an
/// in-memory map.
pub trait IncludeResolver {
    fn resolve(&self, path: &str) -> Result<String, String>;
}

/// No includes available; `.include` always fails. Used by tests and any
/// caller that only feeds the assembler a single in-memory buffer.
#[derive(Debug, Default)]
pub struct NullIncludeResolver;

impl IncludeResolver for NullIncludeResolver {
    fn resolve(&self, path: &str) -> Result<String, String> {
        Err(format!("no include resolver configured for `{path}`"))
    }
}

/// In-memory resolver, for tests that exercise `.include` without touching
/// the filesystem.
#[derive(Debug, Default)]
pub struct MapIncludeResolver {
    files: std::collections::HashMap<String, String>,
}

impl MapIncludeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl IncludeResolver for MapIncludeResolver {
    fn resolve(&self, path: &str) -> Result<String, String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| format!("include file not found: {path}"))
    }
}
