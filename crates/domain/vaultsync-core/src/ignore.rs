//! Exclusion rules shared by the local walk and the remote listing.
//!
//! Rules, any match excludes:
//! 1. exact name match against a pattern
//! 2. suffix match (`.log`)
//! 3. prefix match against the pattern with leading separators stripped
//! 4. hidden names (leading `.`), unconditionally
//! 5. names starting with `untitled` in any case, unconditionally
//! 6. in-flight download files (`*.vaultsync.part`), unconditionally

use std::collections::BTreeSet;

const UNTITLED_PREFIX: &str = "untitled";

/// Suffix of the sibling file a download streams into before it is renamed
/// over its target. A leftover one is never a vault file.
pub const PART_SUFFIX: &str = ".vaultsync.part";

/// Decide whether a single name (file or directory, no separators) is excluded.
pub fn should_skip(name: &str, patterns: &BTreeSet<String>) -> bool {
    for pattern in patterns {
        if pattern.is_empty() {
            continue;
        }
        if name == pattern || name.ends_with(pattern.as_str()) {
            return true;
        }
        let anchored = pattern.trim_start_matches(['/', '\\']);
        if !anchored.is_empty() && name.starts_with(anchored) {
            return true;
        }
    }

    if name.starts_with('.') || name.ends_with(PART_SUFFIX) {
        return true;
    }

    name.get(..UNTITLED_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(UNTITLED_PREFIX))
}

/// Immutable pattern set loaded once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnorePolicy {
    patterns: BTreeSet<String>,
}

impl IgnorePolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p: String = p.into();
                p.trim().to_string()
            })
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    pub fn should_skip(&self, name: &str) -> bool {
        should_skip(name, &self.patterns)
    }

    /// Apply [`should_skip`] to every `/`-separated component.
    /// Remote names carry the full relative path, so a remote `build/out.bin`
    /// is excluded whenever a local walk would have pruned `build/`.
    pub fn should_skip_path(&self, path: &str) -> bool {
        path.split(['/', '\\'])
            .filter(|c| !c.is_empty())
            .any(|c| self.should_skip(c))
    }
}
