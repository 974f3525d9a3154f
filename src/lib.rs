//! Framework agnostic compiler and evaluator for HTTPD's [mod_rewrite](https://httpd.apache.org/docs/current/mod/mod_rewrite.html)
//! directives.
//!
//! # Example
//!
//! ```
//! use rewrite_rules::{Engine, Rewrite, context::Request};
//!
//! let engine: Engine = r#"
//!   RewriteCond %{HTTP_HOST} ^old\.example\.com$ [NC]
//!   RewriteRule ^(.*)$        http://new.example.com$1 [R=301,L]
//!   RewriteRule ^/file/(.*)$  /tmp/$1                  [L]
//!   RewriteRule ^/blocked/    -                        [F]
//! "#.parse().expect("failed to process rules");
//!
//! let req = Request::new("/file/my/document.txt").header("Host", "example.com");
//! let outcome = engine.rewrite(&req);
//! assert_eq!(outcome.rewrite.uri().as_deref(), Some("/tmp/my/document.txt"));
//!
//! let req = Request::new("/foo").header("Host", "OLD.example.com");
//! let outcome = engine.rewrite(&req);
//! assert_eq!(
//!     outcome.rewrite,
//!     Rewrite::Redirect { location: "http://new.example.com/foo".to_owned(), status: 301 }
//! );
//! ```
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

pub mod actions;
pub mod conditions;
pub mod config;
pub mod context;
pub mod error;
pub mod expr;
mod extra;
pub mod flags;
pub mod matching;
pub mod pattern;
pub mod rule;
pub mod tokenize;
pub mod variables;

use config::{ConfigError, DEFAULT_MAX_ITERATIONS, EngineConfig};
use context::{RequestFacts, RewriteContext};
use error::LoadError;
use expr::FileParser;
use matching::MatchLimits;

pub use actions::{Rewrite, RuleResult};
pub use conditions::Condition;
pub use rule::Rule;

/// Decision produced by [`Engine::rewrite`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub rewrite: Rewrite,
    pub result: RuleResult,
    /// `Set-Cookie` header values emitted by the `CO` flag.
    pub cookies: Vec<String>,
    /// Environment changes made by the `E` flag, `None` marks a removal.
    pub env: BTreeMap<String, Option<String>>,
}

impl From<RewriteContext<'_>> for Outcome {
    fn from(ctx: RewriteContext<'_>) -> Self {
        let rewrite = match (ctx.response, ctx.rewritten) {
            (Some(response), _) => response,
            (None, true) => Rewrite::Uri {
                scheme: ctx.host.is_some().then_some(ctx.scheme),
                host: ctx.host,
                path: ctx.path,
                query: ctx.query,
            },
            (None, false) => Rewrite::Unchanged,
        };
        Self {
            rewrite,
            result: ctx.result,
            cookies: ctx.cookies,
            env: ctx.env,
        }
    }
}

/// Expression Engine for Processing Rewrite Rules
///
/// Supports a subset of [official](https://httpd.apache.org/docs/current/mod/mod_rewrite.html)
/// `mod_rewrite` directives. The rule set is immutable once loaded and
/// can be shared between threads.
#[derive(Debug, Clone)]
pub struct Engine {
    rules: Vec<Rule>,
    max_iterations: usize,
    limits: MatchLimits,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            limits: MatchLimits::default(),
        }
    }
}

impl Engine {
    /// Build an engine from a loaded [`EngineConfig`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut engine = Self::default()
            .with_limits(config.regex.clone())
            .max_iterations(config.max_iterations);
        if let Some(path) = &config.rules_file {
            engine.add_rules_file(path)?;
        }
        if let Some(rules) = &config.rules {
            engine.add_rules(rules)?;
        }
        Ok(engine)
    }

    /// Configure max number of passes over the entire ruleset allowed
    /// by the `N` flag before processing stops.
    ///
    /// Default is 10
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Configure regex limits applied to rules added afterwards.
    pub fn with_limits(mut self, limits: MatchLimits) -> Self {
        self.limits = limits;
        self
    }

    #[inline]
    fn parser(&self) -> FileParser {
        FileParser::new(self.limits.clone())
    }

    /// Parse additional [`Rule`]s to append to the existing engine.
    pub fn add_rules(&mut self, rules: &str) -> Result<&mut Self, LoadError> {
        let rules = self.parser().parse_str(rules)?;
        self.rules.extend(rules);
        Ok(self)
    }

    /// Read additional [`Rule`]s from a file and append them to the
    /// existing engine.
    pub fn add_rules_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&mut Self, LoadError> {
        let file = File::open(path)?;
        let rules = self.parser().parse(BufReader::new(file))?;
        self.rules.extend(rules);
        Ok(self)
    }

    /// Builder variant of [`Engine::add_rules`].
    pub fn rules(mut self, rules: &str) -> Result<Self, LoadError> {
        self.add_rules(rules)?;
        Ok(self)
    }

    /// Builder variant of [`Engine::add_rules_file`].
    pub fn rules_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, LoadError> {
        self.add_rules_file(path)?;
        Ok(self)
    }

    /// Loaded rules in evaluation order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate the request against the configured rules and produce an
    /// [`Outcome`].
    ///
    /// See [`Engine::rewrite_ctx`] for more details.
    pub fn rewrite<F: RequestFacts>(&self, facts: &F) -> Outcome {
        let mut ctx = RewriteContext::new(facts);
        self.rewrite_ctx(&mut ctx);
        Outcome::from(ctx)
    }

    /// Evaluate the rules in order against an existing [`RewriteContext`].
    ///
    /// A rule that does not match moves on to the next one, skipping the
    /// remainder of its chain when `C` is set. A matching rule applies its
    /// actions and either stops processing or continues, honoring `S=N`
    /// and restarting from the first rule on `N`.
    pub fn rewrite_ctx(&self, ctx: &mut RewriteContext) -> RuleResult {
        let mut iterations = 0;
        let mut index = 0;
        let result = loop {
            let Some(rule) = self.rules.get(index) else {
                break RuleResult::Continue;
            };
            index = match rule.apply(ctx) {
                None if rule.is_chain() => self.chain_end(index) + 1,
                None => index + 1,
                Some(RuleResult::Continue) if rule.is_next() => {
                    iterations += 1;
                    if iterations >= self.max_iterations {
                        tracing::warn!(
                            "rewrite of {:?} stopped after {iterations} iterations",
                            ctx.path()
                        );
                        break RuleResult::StopRules;
                    }
                    0
                }
                Some(RuleResult::Continue) => index.saturating_add(1).saturating_add(rule.skip()),
                Some(result) => break result,
            };
        };
        ctx.result = result;
        result
    }

    /// Index of the last rule belonging to the chain started at `index`.
    fn chain_end(&self, mut index: usize) -> usize {
        while self.rules.get(index).is_some_and(Rule::is_chain) {
            index += 1;
        }
        index
    }
}

impl FromStr for Engine {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::default().rules(s)
    }
}
