// SPDX-License-Identifier: Apache-2.0

//! Pure path-pattern matching, independent of any watcher backend.
//!
//! Patterns are globs: `*` and `?` stay inside one path segment, `**` spans
//! any number of segments, and a pattern without wildcards is an exact path.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::ingest::error::{Error, Result};
use crate::ingest::event::SourceType;

pub(crate) const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// File extensions exempt from hidden-path filtering
pub const LOG_EXTENSIONS: [&str; 2] = [".log", ".jsonl"];

/// A path pattern bound to the source type of the files it matches
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct WatchDescriptor {
    pub pattern: String,
    pub source_type: SourceType,
}

impl WatchDescriptor {
    pub fn new(pattern: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            pattern: pattern.into(),
            source_type,
        }
    }
}

impl std::str::FromStr for WatchDescriptor {
    type Err = String;

    /// Parse `<pattern>=<source_type>`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (pattern, source_type) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("invalid watch descriptor '{}': expected <pattern>=<source_type>", s))?;
        if pattern.is_empty() {
            return Err(format!("invalid watch descriptor '{}': empty pattern", s));
        }
        Ok(Self::new(pattern, source_type.parse()?))
    }
}

/// A descriptor with its pattern compiled
#[derive(Debug, Clone)]
pub struct CompiledDescriptor {
    pub descriptor: WatchDescriptor,
    pattern: Pattern,
}

impl CompiledDescriptor {
    pub fn new(descriptor: WatchDescriptor) -> Result<Self> {
        let pattern = Pattern::new(&descriptor.pattern)
            .map_err(|e| Error::InvalidPattern(format!("{}: {}", descriptor.pattern, e)))?;
        Ok(Self {
            descriptor,
            pattern,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.pattern.matches_path_with(path, MATCH_OPTIONS)
    }

    pub fn source_type(&self) -> SourceType {
        self.descriptor.source_type
    }
}

/// Compile a list of descriptors, failing on the first invalid pattern
pub fn compile_all(descriptors: &[WatchDescriptor]) -> Result<Vec<CompiledDescriptor>> {
    descriptors
        .iter()
        .cloned()
        .map(CompiledDescriptor::new)
        .collect()
}

/// Test a candidate path against a single glob pattern.
#[cfg(test)]
fn matches_pattern(pattern: &str, path: &Path) -> bool {
    Pattern::new(pattern)
        .map(|p| p.matches_path_with(path, MATCH_OPTIONS))
        .unwrap_or(false)
}

/// Classify a path by the first descriptor whose pattern matches it.
pub fn classify(descriptors: &[CompiledDescriptor], path: &Path) -> Option<SourceType> {
    descriptors
        .iter()
        .find(|d| d.matches(path))
        .map(CompiledDescriptor::source_type)
}

/// The longest leading run of wildcard-free components of a pattern.
pub fn literal_prefix(pattern: &str) -> PathBuf {
    let mut dir = PathBuf::new();
    for component in Path::new(pattern).components() {
        let comp_str = component.as_os_str().to_string_lossy();
        if has_wildcard(&comp_str) {
            break;
        }
        dir.push(component);
    }
    dir
}

/// Directory to watch for a pattern, and whether matches can sit in
/// subdirectories of it.
pub fn watch_root(pattern: &str) -> (PathBuf, bool) {
    let prefix = literal_prefix(pattern);
    if prefix.as_path() == Path::new(pattern) {
        // Exact path: watch the containing directory
        let parent = prefix
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        return (parent, false);
    }

    let remainder = Path::new(pattern)
        .strip_prefix(&prefix)
        .map(|r| r.components().count())
        .unwrap_or(0);
    (prefix, remainder > 1 || pattern.contains("**"))
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Whether a path should be skipped as hidden.
///
/// Only components below `state_dir` are considered, so a state directory
/// that is itself hidden is still watched. Files ending in a recognized log
/// extension are never skipped.
pub fn is_ignored_hidden(path: &Path, state_dir: &Path) -> bool {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if LOG_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext)) {
        return false;
    }

    let relative = path.strip_prefix(state_dir).unwrap_or(path);
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_path() {
        assert!(matches_pattern("/s/logs/cache-trace.jsonl", Path::new("/s/logs/cache-trace.jsonl")));
        assert!(!matches_pattern("/s/logs/cache-trace.jsonl", Path::new("/s/logs/other.jsonl")));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let pattern = "/s/agents/*/sessions/*.jsonl";
        assert!(matches_pattern(pattern, Path::new("/s/agents/main/sessions/abc.jsonl")));
        assert!(!matches_pattern(pattern, Path::new("/s/agents/a/b/sessions/abc.jsonl")));
        assert!(!matches_pattern(pattern, Path::new("/s/agents/main/sessions/old/abc.jsonl")));
        assert!(!matches_pattern(pattern, Path::new("/s/agents/main/sessions/abc.json")));
    }

    #[test]
    fn test_recursive_wildcard() {
        let pattern = "/s/logs/**/*.log";
        assert!(matches_pattern(pattern, Path::new("/s/logs/app.log")));
        assert!(matches_pattern(pattern, Path::new("/s/logs/2024/01/app.log")));
        assert!(!matches_pattern(pattern, Path::new("/s/other/app.log")));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!matches_pattern("/s/[unclosed", Path::new("/s/[unclosed")));
        assert!(CompiledDescriptor::new(WatchDescriptor::new("/s/[x", SourceType::Session)).is_err());
    }

    #[test]
    fn test_classify_first_match_wins() {
        let descriptors = compile_all(&[
            WatchDescriptor::new("/s/logs/cache-trace.jsonl", SourceType::CacheTrace),
            WatchDescriptor::new("/s/logs/**/*.jsonl", SourceType::SystemLog),
            WatchDescriptor::new("/s/agents/*/sessions/*.jsonl", SourceType::Session),
        ])
        .unwrap();

        assert_eq!(
            classify(&descriptors, Path::new("/s/logs/cache-trace.jsonl")),
            Some(SourceType::CacheTrace)
        );
        assert_eq!(
            classify(&descriptors, Path::new("/s/logs/gateway.jsonl")),
            Some(SourceType::SystemLog)
        );
        assert_eq!(
            classify(&descriptors, Path::new("/s/agents/x/sessions/1.jsonl")),
            Some(SourceType::Session)
        );
        assert_eq!(classify(&descriptors, Path::new("/s/notes.txt")), None);
    }

    #[test]
    fn test_literal_prefix_and_watch_root() {
        assert_eq!(
            literal_prefix("/s/agents/*/sessions/*.jsonl"),
            PathBuf::from("/s/agents")
        );
        assert_eq!(
            watch_root("/s/agents/*/sessions/*.jsonl"),
            (PathBuf::from("/s/agents"), true)
        );
        assert_eq!(watch_root("/s/logs/*.log"), (PathBuf::from("/s/logs"), false));
        assert_eq!(watch_root("/s/logs/**/*.log"), (PathBuf::from("/s/logs"), true));
        assert_eq!(
            watch_root("/s/logs/cache-trace.jsonl"),
            (PathBuf::from("/s/logs"), false)
        );
    }

    #[test]
    fn test_descriptor_from_str() {
        let d: WatchDescriptor = "/var/log/*.log=system_log".parse().unwrap();
        assert_eq!(d.pattern, "/var/log/*.log");
        assert_eq!(d.source_type, SourceType::SystemLog);

        assert!("/var/log/*.log".parse::<WatchDescriptor>().is_err());
        assert!("=session".parse::<WatchDescriptor>().is_err());
        assert!("/x=unknown".parse::<WatchDescriptor>().is_err());
    }

    #[test]
    fn test_hidden_paths() {
        let state = Path::new("/home/u/.state");
        assert!(!is_ignored_hidden(Path::new("/home/u/.state/logs/app.log"), state));
        assert!(is_ignored_hidden(Path::new("/home/u/.state/.cache/blob"), state));
        assert!(is_ignored_hidden(Path::new("/home/u/.state/logs/.app.swp"), state));
        // Recognized extensions are kept even when hidden
        assert!(!is_ignored_hidden(Path::new("/home/u/.state/logs/.rotated.jsonl"), state));
        assert!(!is_ignored_hidden(Path::new("/home/u/.state"), state));
    }
}
