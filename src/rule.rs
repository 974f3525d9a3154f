use std::fmt;

use super::actions::{CookieAction, EnvAction, PreAction, QueryMode, RuleResult, Target, UrlAction};
use super::conditions::{self, Condition, parse};
use super::context::RewriteContext;
use super::error::{ParseError, Unsupported};
use super::flags::{Flags, RuleFlag};
use super::matching::{CompiledRegex, MatchLimits};
use super::pattern::{BackReferences, Pattern};
use super::tokenize::escape_token;

/// Singular `RewriteRule` expression definition.
///
/// It contains a regex pattern to match against the request path, the
/// conditions guarding it, the action run on a match and additional
/// flags that define how the rule behaves within the rule-engine.
///
/// Supports a subset of [official](https://httpd.apache.org/docs/current/mod/mod_rewrite.html#rewriterule)
/// mod_rewrite rules.
#[derive(Clone, Debug)]
pub struct Rule {
    matcher: CompiledRegex,
    invert: bool,
    substitution: Pattern,
    conditions: Vec<Condition>,
    action: UrlAction,
    pre_actions: Vec<PreAction>,
    flags: Flags<RuleFlag>,
    skip: usize,
}

impl Rule {
    /// Source of the regex matched against the request path.
    #[inline]
    pub fn pattern(&self) -> &str {
        self.matcher.source()
    }

    #[inline]
    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    #[inline]
    pub fn substitution(&self) -> &Pattern {
        &self.substitution
    }

    #[inline]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[inline]
    pub fn action(&self) -> &UrlAction {
        &self.action
    }

    #[inline]
    pub fn pre_actions(&self) -> &[PreAction] {
        &self.pre_actions
    }

    #[inline]
    pub fn flags(&self) -> &Flags<RuleFlag> {
        &self.flags
    }

    /// Returns true if a failed match skips the rest of the chain.
    #[inline]
    pub fn is_chain(&self) -> bool {
        self.flags.has(RuleFlag::Chain)
    }

    /// Returns true if a match restarts processing from the first rule.
    #[inline]
    pub fn is_next(&self) -> bool {
        self.flags.has(RuleFlag::Next)
    }

    /// Number of following rules skipped after a match.
    #[inline]
    pub fn skip(&self) -> usize {
        self.skip
    }

    /// Match the rule against the current request and run its actions.
    ///
    /// Returns `None` if the pattern or the conditions did not match.
    pub fn apply(&self, ctx: &mut RewriteContext) -> Option<RuleResult> {
        let rule_refs = match (self.matcher.captures(ctx.path()), self.invert) {
            (Some(refs), false) => refs,
            (None, true) => BackReferences::default(),
            _ => {
                tracing::debug!("rule {:?} not matched by {:?}", self.pattern(), ctx.path());
                return None;
            }
        };

        let conds = conditions::evaluate_conditions(&self.conditions, ctx, &rule_refs);
        if !conds.success {
            tracing::debug!("rule {:?} conditions not met", self.pattern());
            return None;
        }

        for action in self.pre_actions.iter() {
            action.apply(ctx, &rule_refs, &conds.refs);
        }
        let result = self.action.apply(ctx, &rule_refs, &conds.refs);
        tracing::debug!(
            "rule {:?} matched, path={:?} result={result:?}",
            self.pattern(),
            ctx.path()
        );
        Some(result)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for condition in self.conditions.iter() {
            writeln!(f, "{condition}")?;
        }
        let not = if self.invert { "!" } else { "" };
        write!(
            f,
            "RewriteRule {not}{} {}",
            escape_token(self.pattern()),
            self.substitution
        )?;
        if !self.flags.is_empty() {
            write!(f, " {}", escape_token(&self.flags.to_string()))?;
        }
        Ok(())
    }
}

#[inline]
fn parse_status(s: &str) -> Result<u16, ParseError> {
    let status = match s.to_ascii_lowercase().as_str() {
        "" | "temp" => 302,
        "permanent" => 301,
        "seeother" => 303,
        code => code
            .parse::<u16>()
            .map_err(|_| ParseError::InvalidStatus(s.to_owned()))?,
    };
    match !(100..600).contains(&status) {
        true => Err(ParseError::InvalidStatus(s.to_owned())),
        false => Ok(status),
    }
}

/// Assembles a [`Rule`] from the operands of a `RewriteRule` directive
/// and the conditions preceding it.
#[derive(Clone, Debug, Default)]
pub struct RuleBuilder {
    limits: MatchLimits,
}

impl RuleBuilder {
    pub fn new(limits: MatchLimits) -> Self {
        Self { limits }
    }

    /// Build a rule from its pattern, substitution and optional bracketed
    /// flags.
    ///
    /// The action is chosen by flag precedence: `F`, then `G`, then `R`,
    /// falling back to an internal rewrite.
    pub fn build(
        &self,
        pattern: &str,
        substitution: &str,
        flags: Option<&str>,
        conditions: Vec<Condition>,
    ) -> Result<Rule, ParseError> {
        let flags = Flags::<RuleFlag>::parse_opt(flags)?;
        if flags.has(RuleFlag::Proxy) {
            return Err(Unsupported::Proxy.into());
        }

        let parsed = parse::parse_rule_pattern(pattern)?;
        let nocase = flags.has(RuleFlag::NoCase);
        let matcher = CompiledRegex::new(&parsed.operand, nocase, &self.limits)?;
        let substitution = Pattern::parse(substitution)?;
        let skip = match flags.get(RuleFlag::Skip) {
            Some(n) => n
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidInteger(n.to_owned()))?,
            None => 0,
        };

        let mut pre_actions = Vec::new();
        if let Some(cookie) = flags.get(RuleFlag::Cookie) {
            pre_actions.push(PreAction::Cookie(cookie.parse::<CookieAction>()?));
        }
        if let Some(env) = flags.get(RuleFlag::Env) {
            pre_actions.push(PreAction::Env(env.parse::<EnvAction>()?));
        }

        let target = Target {
            pattern: substitution.clone(),
            escape: flags.has(RuleFlag::EscapeBackreference),
            query: QueryMode {
                append: flags.has(RuleFlag::QsAppend),
                discard: flags.has(RuleFlag::QsDiscard),
                last: flags.has(RuleFlag::QsLast),
            },
        };
        let action = if flags.has(RuleFlag::Forbidden) {
            UrlAction::Forbidden
        } else if flags.has(RuleFlag::Gone) {
            UrlAction::Gone
        } else if let Some(code) = flags.get(RuleFlag::Redirect) {
            match parse_status(code)? {
                status @ 300..400 => UrlAction::Redirect { target, status },
                status => UrlAction::Status(status),
            }
        } else {
            UrlAction::Rewrite {
                target,
                last: flags.has(RuleFlag::Last) || flags.has(RuleFlag::End),
            }
        };

        Ok(Rule {
            matcher,
            invert: parsed.invert,
            substitution,
            conditions,
            action,
            pre_actions,
            flags,
            skip,
        })
    }
}
