// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Find report files from a list of glob patterns.
//!
//! Patterns are given one per line. Blank lines and lines starting with `#` are ignored, and lines
//! starting with `!` exclude files matched by earlier or later patterns. In a glob, `*` matches
//! within a single path component and `**` matches across components.
//!
//! Symlinks to files are yielded, but symlinked directories are never descended into.

use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::{collections::HashSet, path::PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// An error that occurred while locating report files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LocateError {
    /// The current directory could not be determined.
    #[error("failed to determine the current directory")]
    CurrentDir(#[source] std::io::Error),

    /// A path was not valid UTF-8.
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path {
        /// The path.
        path: PathBuf,
    },

    /// A pattern was not a valid glob.
    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,

        /// The underlying error.
        #[source]
        err: globset::Error,
    },

    /// Walking a directory failed.
    #[error("error while searching for files matching `{pattern}`")]
    Walk {
        /// The pattern as written.
        pattern: String,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },
}

/// Finds report files matching a set of patterns.
#[derive(Clone, Debug)]
pub struct ReportLocator {
    includes: Vec<IncludePattern>,
    excludes: GlobSet,
}

#[derive(Clone, Debug)]
struct IncludePattern {
    raw: String,
    // The longest leading part of the pattern without glob metacharacters.
    base: Utf8PathBuf,
    // None if the pattern names a single file.
    matcher: Option<GlobMatcher>,
}

impl ReportLocator {
    /// Parses `patterns`, resolving relative patterns against `cwd`.
    pub fn new(patterns: &str, cwd: &Utf8Path) -> Result<Self, LocateError> {
        let mut includes = Vec::new();
        let mut excludes = GlobSetBuilder::new();

        for line in patterns.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(excluded) = line.strip_prefix('!') {
                let resolved = ResolvedPattern::new(excluded.trim(), cwd);
                excludes.add(build_glob(line, &resolved.glob_str())?);
                continue;
            }

            let resolved = ResolvedPattern::new(line, cwd);
            let matcher = if resolved.rest.is_empty() {
                None
            } else {
                Some(build_glob(line, &resolved.glob_str())?.compile_matcher())
            };
            includes.push(IncludePattern {
                raw: line.to_owned(),
                base: resolved.base,
                matcher,
            });
        }

        let excludes = excludes.build().map_err(|err| LocateError::InvalidPattern {
            pattern: patterns.to_owned(),
            err,
        })?;

        Ok(Self { includes, excludes })
    }

    /// Parses `patterns`, resolving relative patterns against the current directory.
    pub fn from_current_dir(patterns: &str) -> Result<Self, LocateError> {
        let cwd = std::env::current_dir().map_err(LocateError::CurrentDir)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|err| LocateError::NonUtf8Path { path: err.into_path_buf() })?;
        Self::new(patterns, &cwd)
    }

    /// Returns true if no include patterns were given.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
    }

    /// Returns an iterator over matching files.
    ///
    /// Files are produced lazily, one pattern at a time, in sorted order within each pattern.
    /// A file matched by several patterns is produced once.
    pub fn files(&self) -> ReportFiles<'_> {
        ReportFiles {
            locator: self,
            next_pattern: 0,
            current: None,
            seen: HashSet::new(),
        }
    }
}

/// An iterator over report files, returned by [`ReportLocator::files`].
pub struct ReportFiles<'a> {
    locator: &'a ReportLocator,
    next_pattern: usize,
    current: Option<(&'a IncludePattern, walkdir::IntoIter)>,
    seen: HashSet<Utf8PathBuf>,
}

impl Iterator for ReportFiles<'_> {
    type Item = Result<Utf8PathBuf, LocateError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((pattern, walker)) = &mut self.current {
                let entry = match walker.next() {
                    Some(Ok(entry)) => entry,
                    Some(Err(err)) => {
                        let pattern = pattern.raw.clone();
                        self.current = None;
                        return Some(Err(LocateError::Walk { pattern, err }));
                    }
                    None => {
                        self.current = None;
                        continue;
                    }
                };

                let file_type = entry.file_type();
                if !file_type.is_file() && !file_type.is_symlink() {
                    continue;
                }
                let path = match Utf8PathBuf::try_from(entry.into_path()) {
                    Ok(path) => path,
                    Err(err) => {
                        return Some(Err(LocateError::NonUtf8Path {
                            path: err.into_path_buf(),
                        }));
                    }
                };
                // Symlinks are only yielded if they resolve to a file.
                if file_type.is_symlink() && !path.is_file() {
                    continue;
                }
                let is_match = pattern
                    .matcher
                    .as_ref()
                    .is_some_and(|matcher| matcher.is_match(&path));
                if is_match && self.accept(&path) {
                    return Some(Ok(path));
                }
                continue;
            }

            let pattern = self.locator.includes.get(self.next_pattern)?;
            self.next_pattern += 1;

            match &pattern.matcher {
                None => {
                    if pattern.base.is_file() && self.accept(&pattern.base) {
                        return Some(Ok(pattern.base.clone()));
                    }
                }
                Some(_) => {
                    if pattern.base.is_dir() {
                        debug!("searching {} for `{}`", pattern.base, pattern.raw);
                        let walker = WalkDir::new(&pattern.base)
                            .follow_links(false)
                            .sort_by_file_name()
                            .into_iter();
                        self.current = Some((pattern, walker));
                    } else {
                        debug!(
                            "skipping `{}`: {} is not a directory",
                            pattern.raw, pattern.base
                        );
                    }
                }
            }
        }
    }
}

impl ReportFiles<'_> {
    fn accept(&mut self, path: &Utf8Path) -> bool {
        if self.locator.excludes.is_match(path) {
            debug!("excluding {path}");
            return false;
        }
        self.seen.insert(path.to_owned())
    }
}

struct ResolvedPattern<'a> {
    base: Utf8PathBuf,
    rest: Vec<&'a str>,
}

impl<'a> ResolvedPattern<'a> {
    fn new(pattern: &'a str, cwd: &Utf8Path) -> Self {
        let mut base = if pattern.starts_with('/') {
            Utf8PathBuf::from("/")
        } else {
            cwd.to_owned()
        };

        let mut components = pattern
            .split('/')
            .filter(|component| !component.is_empty() && *component != ".")
            .peekable();
        while let Some(component) = components.next_if(|component| !has_glob_meta(component)) {
            base.push(component);
        }

        Self {
            base,
            rest: components.collect(),
        }
    }

    fn glob_str(&self) -> String {
        let mut glob_str = escape_glob(self.base.as_str().trim_end_matches('/'));
        for component in &self.rest {
            glob_str.push('/');
            glob_str.push_str(component);
        }
        if glob_str.is_empty() {
            glob_str.push('/');
        }
        glob_str
    }
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', ']', '{', '}'])
}

// Escapes via [], since backslash escapes are disabled.
fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}') {
            escaped.push('[');
            escaped.push(c);
            escaped.push(']');
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn build_glob(pattern: &str, glob_str: &str) -> Result<Glob, LocateError> {
    GlobBuilder::new(glob_str)
        // `*` stays within a single path component.
        .literal_separator(true)
        .backslash_escape(false)
        .build()
        .map_err(|err| LocateError::InvalidPattern {
            pattern: pattern.to_owned(),
            err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn tree(files: &[&str]) -> Utf8TempDir {
        let dir = camino_tempfile::Builder::new()
            .prefix("junit-annotate-locate")
            .tempdir()
            .expect("tempdir created");
        for file in files {
            let path = dir.path().join(file);
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent).expect("parent created");
            }
            fs_err::write(&path, "<testsuite/>").expect("file written");
        }
        dir
    }

    fn locate(dir: &Utf8TempDir, patterns: &str) -> Vec<String> {
        let locator = ReportLocator::new(patterns, dir.path()).expect("patterns are valid");
        locator
            .files()
            .map(|path| {
                let path = path.expect("no walk errors");
                path.strip_prefix(dir.path())
                    .expect("path is within the tree")
                    .as_str()
                    .to_owned()
            })
            .collect()
    }

    const FILES: &[&str] = &[
        "reports/a.xml",
        "reports/b.xml",
        "reports/notes.txt",
        "reports/nested/c.xml",
        "reports/nested/deeper/d.xml",
        "target/e.xml",
    ];

    #[test_case("reports/*.xml", &["reports/a.xml", "reports/b.xml"]; "single star")]
    #[test_case(
        "reports/**/*.xml",
        &["reports/a.xml", "reports/b.xml", "reports/nested/c.xml", "reports/nested/deeper/d.xml"];
        "double star"
    )]
    #[test_case("./reports/a.xml", &["reports/a.xml"]; "literal file")]
    #[test_case("reports/missing.xml", &[]; "missing literal file")]
    #[test_case("reports/nested", &[]; "literal directory")]
    #[test_case("nowhere/**/*.xml", &[]; "missing base directory")]
    #[test_case("reports/?.xml", &["reports/a.xml", "reports/b.xml"]; "question mark")]
    #[test_case("*/{a,e}.xml", &["reports/a.xml", "target/e.xml"]; "alternates")]
    fn single_pattern(pattern: &str, expected: &[&str]) {
        let dir = tree(FILES);
        assert_eq!(locate(&dir, pattern), expected);
    }

    #[test]
    fn comments_exclusions_and_duplicates() {
        let dir = tree(FILES);
        let patterns = indoc! {"
            # unit test reports

            reports/**/*.xml
            !reports/nested/deeper/**
            reports/a.xml
            target/*.xml
        "};
        assert_eq!(
            locate(&dir, patterns),
            ["reports/a.xml", "reports/b.xml", "reports/nested/c.xml", "target/e.xml"]
        );
    }

    #[test]
    fn absolute_pattern() {
        let dir = tree(FILES);
        let pattern = format!("{}/target/*.xml", dir.path());
        assert_eq!(locate(&dir, &pattern), ["target/e.xml"]);
    }

    #[test]
    fn no_patterns() {
        let dir = tree(FILES);
        let locator = ReportLocator::new("\n# nothing here\n", dir.path()).expect("valid");
        assert!(locator.is_empty());
        assert_eq!(locator.files().count(), 0);
    }

    #[test]
    fn invalid_pattern() {
        let dir = tree(FILES);
        let err = ReportLocator::new("reports/[a.xml", dir.path()).expect_err("invalid glob");
        match &err {
            LocateError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "reports/[a.xml"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn metacharacters_in_base_are_literal() {
        let dir = tree(&["odd[dir]/x.xml"]);
        let locator = ReportLocator::new("*.xml", &dir.path().join("odd[dir]")).expect("valid");
        let files: Vec<_> = locator.files().collect::<Result<_, _>>().expect("no errors");
        assert_eq!(files, [dir.path().join("odd[dir]/x.xml")]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks() {
        let dir = tree(&["reports/a.xml", "elsewhere/linked-dir.xml"]);
        let root = dir.path();
        std::os::unix::fs::symlink(root.join("reports/a.xml"), root.join("reports/link.xml"))
            .expect("file symlink created");
        std::os::unix::fs::symlink(root.join("elsewhere"), root.join("reports/dir-link"))
            .expect("dir symlink created");
        std::os::unix::fs::symlink(root.join("gone.xml"), root.join("reports/broken.xml"))
            .expect("broken symlink created");

        assert_eq!(
            locate(&dir, "reports/**/*.xml"),
            ["reports/a.xml", "reports/link.xml"]
        );
    }
}
