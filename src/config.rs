//! Process-wide environment handling (spec §6 Environment, §4.4 step 4).
//!
//! Deliberately not a general-purpose config crate: the surface is three
//! environment variables plus a compile-time build-type distinction, so a
//! thin struct read once at startup is clearer than a config-file layer.

use std::env;

/// Which build this process is: governs the `dev` profile override in
/// spec §4.4 step 4b.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Development,
    Production,
}

impl BuildType {
    /// `cfg!(debug_assertions)` stands in for the original's bundler-level
    /// dev/production build distinction.
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            BuildType::Development
        } else {
            BuildType::Production
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    /// `PROFILE` env var override (spec §6, §4.4 step 4a).
    pub profile_override: Option<String>,
    pub debug: bool,
}

impl Env {
    pub fn from_process() -> Self {
        Self {
            profile_override: env::var("PEEK_PROFILE").ok().filter(|s| !s.is_empty()),
            debug: env::var("PEEK_DEBUG")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_type_matches_debug_assertions() {
        let expected = if cfg!(debug_assertions) {
            BuildType::Development
        } else {
            BuildType::Production
        };
        assert_eq!(BuildType::current(), expected);
    }
}
