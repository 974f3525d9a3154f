//! Regex compilation and guarded matching.
//!
//! Every regex is compiled once when the rule file is loaded and shared
//! read-only between evaluations. Match attempts run under a
//! [`MatchLimits`] budget; tripping it is a non-match, never an error.

use std::time::{Duration, Instant};

use regex_automata::{
    MatchKind,
    meta::{self, Regex},
    util,
};
use serde::Deserialize;

use super::error::ParseError;
use super::pattern::BackReferences;

/// Budget applied to regex compilation and matching.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchLimits {
    /// Maximum duration of a single match attempt in milliseconds,
    /// `0` disables the check.
    pub timeout_ms: u64,
    /// Longest input a regex is run against, in bytes.
    pub max_input_len: usize,
    /// Maximum size of a compiled regex, in bytes.
    pub size_limit: usize,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 50,
            max_input_len: 64 * (1 << 10),
            size_limit: 10 * (1 << 20),
        }
    }
}

impl MatchLimits {
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Regex compiled from a directive along with its source text.
#[derive(Clone, Debug)]
pub struct CompiledRegex {
    source: String,
    nocase: bool,
    regex: Regex,
    limits: MatchLimits,
}

impl CompiledRegex {
    pub fn new(pattern: &str, nocase: bool, limits: &MatchLimits) -> Result<Self, ParseError> {
        let regex = Regex::builder()
            .configure(
                meta::Config::new()
                    .nfa_size_limit(Some(limits.size_limit))
                    .hybrid_cache_capacity(2 * (1 << 20))
                    .match_kind(MatchKind::LeftmostFirst)
                    .utf8_empty(true),
            )
            .syntax(util::syntax::Config::new().case_insensitive(nocase))
            .build(pattern)
            .map_err(|err| ParseError::InvalidRegex {
                pattern: pattern.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            source: pattern.to_owned(),
            nocase,
            regex,
            limits: limits.clone(),
        })
    }

    /// Pattern text the regex was compiled from.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn is_nocase(&self) -> bool {
        self.nocase
    }

    /// Returns true if the regex matches anywhere in `haystack`.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.guarded(haystack, || self.regex.is_match(haystack).then_some(()))
            .is_some()
    }

    /// Run the regex and collect every capture group.
    pub fn captures(&self, haystack: &str) -> Option<BackReferences> {
        self.guarded(haystack, || {
            let mut caps = self.regex.create_captures();
            self.regex.captures(haystack, &mut caps);
            if !caps.is_match() {
                return None;
            }
            let groups = (0..caps.group_len())
                .map(|index| match caps.get_group(index) {
                    Some(span) => haystack[span].to_owned(),
                    None => String::new(),
                })
                .collect();
            Some(BackReferences::new(groups))
        })
    }

    fn guarded<T>(&self, haystack: &str, search: impl FnOnce() -> Option<T>) -> Option<T> {
        if haystack.len() > self.limits.max_input_len {
            tracing::warn!(
                "regex {:?} skipped, input of {} bytes exceeds limit",
                self.source,
                haystack.len()
            );
            return None;
        }
        let start = Instant::now();
        let result = search();
        if let Some(timeout) = self.limits.timeout() {
            let elapsed = start.elapsed();
            if elapsed > timeout {
                tracing::warn!("regex {:?} timed out after {elapsed:?}", self.source);
                return None;
            }
        }
        result
    }
}
