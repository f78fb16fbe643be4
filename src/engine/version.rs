//! Version gating.
//!
//! Settings and individual options declare a minimum application version in
//! `since`. Whether the running application satisfies that minimum is decided
//! by a [`VersionGate`], supplied by the host. [`AppVersion`] is the default
//! gate: a dotted numeric version compared component-wise.

use std::cmp::Ordering;
use std::fmt::Debug;

/// Minimum version assumed when a setting's `since` is silent.
pub const FLOOR_VERSION: &str = "1.1";

/// Decides whether the running application meets a minimum version.
pub trait VersionGate: Debug {
    /// True when the running version is at least `min_version`.
    fn check(&self, min_version: &str) -> bool;

    /// Switch the running version (the version picker does this).
    fn set_current(&mut self, version: &str);

    fn current(&self) -> Option<String>;
}

/// Dotted numeric application version, e.g. `2.53` or `2.53.1/latest`.
///
/// An unknown running version satisfies every requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppVersion {
    current: Option<String>,
}

impl AppVersion {
    pub fn new(version: impl Into<String>) -> Self {
        AppVersion { current: Some(version.into()) }
    }

    pub fn unknown() -> Self {
        AppVersion { current: None }
    }
}

impl VersionGate for AppVersion {
    fn check(&self, min_version: &str) -> bool {
        match &self.current {
            Some(current) => compare(current, min_version) != Ordering::Less,
            None => true,
        }
    }

    fn set_current(&mut self, version: &str) {
        self.current = Some(version.to_string());
    }

    fn current(&self) -> Option<String> {
        self.current.clone()
    }
}

/// Numeric components of a version, ignoring any `/build` suffix.
/// Non-numeric components count as 0.
fn components(version: &str) -> Vec<u64> {
    version
        .split('/')
        .next()
        .unwrap_or_default()
        .split('.')
        .map(|part| part.trim().parse::<u64>().unwrap_or(0))
        .collect()
}

/// Compare two versions component-wise; missing components are 0.
pub(crate) fn compare(a: &str, b: &str) -> Ordering {
    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let ord = a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// `"2.53.1/latest"` -> `"2"`.
pub(crate) fn major(build: &str) -> &str {
    build.split('/').next().unwrap_or_default().split('.').next().unwrap_or_default()
}

/// `"2.53.1/latest"` -> `"2.53"`.
pub(crate) fn major_minor(build: &str) -> String {
    build.split('/').next().unwrap_or_default().split('.').take(2).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_component_wise() {
        assert_eq!(compare("2.10", "2.9"), Ordering::Greater);
        assert_eq!(compare("2.0", "2"), Ordering::Equal);
        assert_eq!(compare("1.9", "2.0"), Ordering::Less);
        assert_eq!(compare("2.53.1/latest", "2.53"), Ordering::Greater);
    }

    #[test]
    fn gate_checks_minimum() {
        let gate = AppVersion::new("2.13");
        assert!(gate.check("2.13"));
        assert!(gate.check(FLOOR_VERSION));
        assert!(!gate.check("2.14"));
    }

    #[test]
    fn unknown_version_satisfies_everything() {
        assert!(AppVersion::unknown().check("99.0"));
    }

    #[test]
    fn set_current_moves_the_gate() {
        let mut gate = AppVersion::new("1.9");
        assert!(!gate.check("2.0"));
        gate.set_current("2.0");
        assert!(gate.check("2.0"));
        assert_eq!(gate.current().as_deref(), Some("2.0"));
    }

    #[test]
    fn build_strings_split_into_major_parts() {
        assert_eq!(major("2.53.1/latest"), "2");
        assert_eq!(major_minor("2.53.1/latest"), "2.53");
        assert_eq!(major_minor("1"), "1");
    }
}
