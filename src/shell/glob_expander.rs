//! Pathname expansion.
//!
//! Walks the real filesystem component by component, matching each
//! pattern segment with the shared pattern engine. Results come back
//! sorted; `nullglob`, `failglob`, `dotglob`, `globstar` and
//! `nocaseglob` all change behaviour here and nowhere else.

use std::path::{Path, PathBuf};

use crate::interpreter::expansion::pattern::{compile_pattern, has_glob_chars};

#[derive(Debug, Clone, Default)]
pub struct GlobOptions {
    pub nullglob: bool,
    pub failglob: bool,
    pub dotglob: bool,
    pub globstar: bool,
    pub extglob: bool,
    pub nocaseglob: bool,
}

/// Outcome of expanding one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobOutcome {
    /// Matches found (sorted).
    Matches(Vec<String>),
    /// No matches; caller applies nullglob/failglob/literal policy.
    NoMatch,
}

pub struct GlobExpander {
    options: GlobOptions,
}

impl GlobExpander {
    pub fn new(options: GlobOptions) -> Self {
        Self { options }
    }

    /// Expand one pattern against the filesystem, relative to `cwd`
    /// unless the pattern is absolute.
    pub fn expand(&self, pattern: &str, cwd: &Path) -> GlobOutcome {
        if !has_glob_chars(pattern, self.options.extglob) {
            return GlobOutcome::NoMatch;
        }

        let absolute = pattern.starts_with('/');
        let trailing_slash = pattern.ends_with('/');
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return GlobOutcome::NoMatch;
        }

        let root = if absolute { PathBuf::from("/") } else { cwd.to_path_buf() };
        let prefix = if absolute { "/".to_string() } else { String::new() };
        let mut results: Vec<String> = Vec::new();
        self.walk(&root, &prefix, &segments, &mut results);

        // A trailing slash restricts matches to directories.
        if trailing_slash {
            results.retain(|r| {
                let full = if absolute { PathBuf::from(r) } else { cwd.join(r) };
                full.is_dir()
            });
            for r in &mut results {
                r.push('/');
            }
        }

        if results.is_empty() {
            return GlobOutcome::NoMatch;
        }
        results.sort();
        results.dedup();
        GlobOutcome::Matches(results)
    }

    fn walk(&self, dir: &Path, display_prefix: &str, segments: &[&str], out: &mut Vec<String>) {
        let (segment, rest) = match segments.split_first() {
            Some(x) => x,
            None => return,
        };

        // `**` under globstar matches zero or more directory levels.
        if self.options.globstar && *segment == "**" {
            // Zero levels.
            if rest.is_empty() {
                // `x/**` matches everything below, including the
                // directory itself (as its contents listing).
                self.collect_recursive(dir, display_prefix, out);
                return;
            }
            self.walk(dir, display_prefix, rest, out);
            // One or more levels.
            for entry in self.read_sorted(dir) {
                if entry.starts_with('.') && !self.options.dotglob {
                    continue;
                }
                let child = dir.join(&entry);
                if child.is_dir() {
                    let prefix = format!("{}{}/", display_prefix, entry);
                    self.walk(&child, &prefix, segments, out);
                }
            }
            return;
        }

        // Literal segment: descend without reading the directory.
        if !has_glob_chars(segment, self.options.extglob) {
            let literal = unescape_segment(segment);
            let child = dir.join(&literal);
            if rest.is_empty() {
                if child.exists() || child.is_symlink() {
                    out.push(format!("{}{}", display_prefix, literal));
                }
            } else if child.is_dir() {
                let prefix = format!("{}{}/", display_prefix, literal);
                self.walk(&child, &prefix, rest, out);
            }
            return;
        }

        let regex = match compile_pattern(segment, self.options.extglob, self.options.nocaseglob) {
            Some(re) => re,
            None => return,
        };
        let explicit_dot = segment.starts_with('.');
        for entry in self.read_sorted(dir) {
            if entry.starts_with('.') && !self.options.dotglob && !explicit_dot {
                continue;
            }
            if entry == "." || entry == ".." {
                // Never generated by patterns, only by literal names.
                if !explicit_dot || !regex.is_match(&entry) {
                    continue;
                }
            }
            if !regex.is_match(&entry) {
                continue;
            }
            if rest.is_empty() {
                out.push(format!("{}{}", display_prefix, entry));
            } else {
                let child = dir.join(&entry);
                if child.is_dir() {
                    let prefix = format!("{}{}/", display_prefix, entry);
                    self.walk(&child, &prefix, rest, out);
                }
            }
        }
    }

    /// Everything below `dir`, depth-first, for a trailing `**`.
    fn collect_recursive(&self, dir: &Path, display_prefix: &str, out: &mut Vec<String>) {
        for entry in self.read_sorted(dir) {
            if entry.starts_with('.') && !self.options.dotglob {
                continue;
            }
            let child = dir.join(&entry);
            out.push(format!("{}{}", display_prefix, entry));
            if child.is_dir() {
                let prefix = format!("{}{}/", display_prefix, entry);
                self.collect_recursive(&child, &prefix, out);
            }
        }
    }

    fn read_sorted(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

/// Remove the backslashes protecting quoted characters in a segment that
/// turned out to be literal.
fn unescape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("alpha.txt"), "").expect("write");
        fs::write(dir.path().join("beta.txt"), "").expect("write");
        fs::write(dir.path().join("gamma.rs"), "").expect("write");
        fs::write(dir.path().join(".hidden"), "").expect("write");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("sub").join("inner.txt"), "").expect("write");
        dir
    }

    fn expand(pattern: &str, cwd: &Path, options: GlobOptions) -> GlobOutcome {
        GlobExpander::new(options).expand(pattern, cwd)
    }

    #[test]
    fn star_matches_sorted() {
        let dir = setup();
        match expand("*.txt", dir.path(), GlobOptions::default()) {
            GlobOutcome::Matches(m) => assert_eq!(m, vec!["alpha.txt", "beta.txt"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_match_reports_nomatch() {
        let dir = setup();
        assert_eq!(expand("*.zip", dir.path(), GlobOptions::default()), GlobOutcome::NoMatch);
    }

    #[test]
    fn hidden_files_need_dotglob() {
        let dir = setup();
        match expand("*", dir.path(), GlobOptions::default()) {
            GlobOutcome::Matches(m) => assert!(!m.iter().any(|f| f.starts_with('.'))),
            other => panic!("unexpected {:?}", other),
        }
        let opts = GlobOptions { dotglob: true, ..Default::default() };
        match expand("*", dir.path(), opts) {
            GlobOutcome::Matches(m) => assert!(m.contains(&".hidden".to_string())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn explicit_dot_prefix_matches_hidden() {
        let dir = setup();
        match expand(".h*", dir.path(), GlobOptions::default()) {
            GlobOutcome::Matches(m) => assert_eq!(m, vec![".hidden"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn multi_segment_patterns() {
        let dir = setup();
        match expand("sub/*.txt", dir.path(), GlobOptions::default()) {
            GlobOutcome::Matches(m) => assert_eq!(m, vec!["sub/inner.txt"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn globstar_descends() {
        let dir = setup();
        let opts = GlobOptions { globstar: true, ..Default::default() };
        match expand("**/*.txt", dir.path(), opts) {
            GlobOutcome::Matches(m) => {
                assert_eq!(m, vec!["alpha.txt", "beta.txt", "sub/inner.txt"])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn trailing_slash_selects_directories() {
        let dir = setup();
        match expand("*/", dir.path(), GlobOptions::default()) {
            GlobOutcome::Matches(m) => assert_eq!(m, vec!["sub/"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn extglob_pathname() {
        let dir = setup();
        let opts = GlobOptions { extglob: true, ..Default::default() };
        match expand("@(alpha|beta).txt", dir.path(), opts) {
            GlobOutcome::Matches(m) => assert_eq!(m, vec!["alpha.txt", "beta.txt"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
