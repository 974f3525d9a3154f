//! `RewriteCond` parsing, compilation and evaluation.
use std::fmt;

pub mod matcher;
pub mod parse;

use crate::context::RewriteContext;
use crate::error::ParseError;
use crate::flags::{CondFlag, Flags};
use crate::matching::MatchLimits;
use crate::pattern::{BackReferences, Pattern};
use crate::tokenize::escape_token;

pub use matcher::{Expression, MatchResult};

/// Singular `RewriteCond` expression definition.
///
/// It contains the test-string template, a compiled expression and the
/// flags that define how the condition combines with its neighbours.
///
/// Supports a subset of [official](https://httpd.apache.org/docs/current/mod/mod_rewrite.html#rewritecond)
/// mod_rewrite conditions.
#[derive(Clone, Debug)]
pub struct Condition {
    input: Pattern,
    expression: Expression,
    flags: Flags<CondFlag>,
}

impl Condition {
    #[inline]
    pub fn input(&self) -> &Pattern {
        &self.input
    }

    #[inline]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    #[inline]
    pub fn flags(&self) -> &Flags<CondFlag> {
        &self.flags
    }

    /// Returns true if the rewrite condition uses OR operator rather
    /// than the default AND.
    #[inline]
    pub fn is_or(&self) -> bool {
        self.flags.has(CondFlag::Or)
    }

    /// Expand the test string and evaluate the expression against it.
    pub fn evaluate(
        &self,
        ctx: &RewriteContext,
        rule_refs: &BackReferences,
        cond_refs: &BackReferences,
    ) -> MatchResult {
        let input = self.input.evaluate(ctx, rule_refs, cond_refs, false);
        let result = self.expression.evaluate(&input, ctx);
        tracing::trace!(
            "condition {} {} against {input:?}: {}",
            self.input,
            self.expression,
            result.success
        );
        result
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RewriteCond {} {}", self.input, self.expression)?;
        if !self.flags.is_empty() {
            write!(f, " {}", escape_token(&self.flags.to_string()))?;
        }
        Ok(())
    }
}

/// Assembles a [`Condition`] from the operands of a `RewriteCond`
/// directive.
#[derive(Clone, Debug, Default)]
pub struct ConditionBuilder {
    limits: MatchLimits,
}

impl ConditionBuilder {
    pub fn new(limits: MatchLimits) -> Self {
        Self { limits }
    }

    /// Build a condition from its test string, condition pattern and
    /// optional bracketed flags.
    pub fn build(
        &self,
        test_string: &str,
        pattern: &str,
        flags: Option<&str>,
    ) -> Result<Condition, ParseError> {
        let flags = Flags::<CondFlag>::parse_opt(flags)?;
        let input = Pattern::parse(test_string)?;
        let parsed = parse::parse_condition_pattern(pattern)?;
        let expression = Expression::create(parsed, flags.has(CondFlag::NoCase), &self.limits)?;
        Ok(Condition {
            input,
            expression,
            flags,
        })
    }
}

/// Evaluate a list of conditions with `OR`/`AND` chaining.
///
/// A succeeding `OR` condition skips the rest of its group together with
/// the first non-`OR` condition closing it. Any failing non-`OR`
/// condition fails the whole list. Back-references of the last successful
/// capturing condition feed `%N` in later conditions and in the result.
pub fn evaluate_conditions(
    conditions: &[Condition],
    ctx: &RewriteContext,
    rule_refs: &BackReferences,
) -> MatchResult {
    let mut prev_refs = BackReferences::default();
    let mut last: Option<bool> = None;
    let mut or_succeeded = false;
    for condition in conditions {
        if or_succeeded {
            if !condition.is_or() {
                or_succeeded = false;
            }
            continue;
        }

        let result = condition.evaluate(ctx, rule_refs, &prev_refs);
        if condition.is_or() {
            or_succeeded = result.success;
        } else if !result.success {
            return MatchResult::new(false, prev_refs);
        }
        last = Some(result.success);
        if result.success && !result.refs.is_empty() {
            prev_refs = result.refs;
        }
    }
    MatchResult::new(last.unwrap_or(true), prev_refs)
}
