use std::io::{BufRead, Cursor};
use std::str::FromStr;

use super::conditions::{Condition, ConditionBuilder};
use super::error::{LoadError, ParseError, Unsupported};
use super::matching::MatchLimits;
use super::rule::{Rule, RuleBuilder};
use super::tokenize::tokenize;

/// All directive names recognized within a rule file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    Engine,
    Cond,
    Rule,
    Base,
    Map,
}

impl FromStr for Directive {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rewriteengine" => Ok(Self::Engine),
            "rewritecond" => Ok(Self::Cond),
            "rewriterule" => Ok(Self::Rule),
            "rewritebase" => Ok(Self::Base),
            "rewritemap" => Ok(Self::Map),
            _ => Err(ParseError::UnknownDirective(s.to_owned())),
        }
    }
}

/// Split directive operands into the two required values and the
/// optional flag list.
fn operands<'a>(
    directive: &str,
    operands: &'a [String],
) -> Result<(&'a str, &'a str, Option<&'a str>), ParseError> {
    match operands {
        [first, second] => Ok((first.as_str(), second.as_str(), None)),
        [first, second, flags] => Ok((first.as_str(), second.as_str(), Some(flags.as_str()))),
        _ => Err(ParseError::WrongArgumentCount {
            directive: directive.to_owned(),
            expected: "2 or 3",
            found: operands.len(),
        }),
    }
}

/// Streaming parser turning `mod_rewrite` directive text into an ordered
/// list of [`Rule`]s.
///
/// `RewriteCond` lines accumulate until the next `RewriteRule`, which
/// takes ownership of all of them.
#[derive(Clone, Debug, Default)]
pub struct FileParser {
    conditions: ConditionBuilder,
    rules: RuleBuilder,
}

impl FileParser {
    pub fn new(limits: MatchLimits) -> Self {
        Self {
            conditions: ConditionBuilder::new(limits.clone()),
            rules: RuleBuilder::new(limits),
        }
    }

    /// Parse every line of the reader, failing on the first invalid one.
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<Vec<Rule>, LoadError> {
        let mut rules = Vec::new();
        let mut pending = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            self.parse_line(&line, &mut pending, &mut rules)
                .map_err(|source| LoadError::Line {
                    line: index + 1,
                    source,
                })?;
        }
        if !pending.is_empty() {
            tracing::warn!(
                "{} trailing RewriteCond without a RewriteRule discarded",
                pending.len()
            );
        }
        Ok(rules)
    }

    /// Parse rules held in memory.
    #[inline]
    pub fn parse_str(&self, s: &str) -> Result<Vec<Rule>, LoadError> {
        self.parse(Cursor::new(s))
    }

    fn parse_line(
        &self,
        line: &str,
        pending: &mut Vec<Condition>,
        rules: &mut Vec<Rule>,
    ) -> Result<(), ParseError> {
        let start = line.trim_start();
        if start.is_empty() || start.starts_with('#') {
            return Ok(());
        }
        let Some(tokens) = tokenize(line)? else {
            return Ok(());
        };
        if tokens.len() > 4 {
            return Err(ParseError::TooManyTokens(tokens.len()));
        }
        let Some((name, args)) = tokens.split_first() else {
            return Ok(());
        };

        match name.parse::<Directive>()? {
            Directive::Engine => tracing::debug!("ignoring directive {line:?}"),
            Directive::Base => return Err(Unsupported::RewriteBase.into()),
            Directive::Map => return Err(Unsupported::RewriteMap.into()),
            Directive::Cond => {
                let (test, pattern, flags) = operands(name, args)?;
                pending.push(self.conditions.build(test, pattern, flags)?);
            }
            Directive::Rule => {
                let (pattern, substitution, flags) = operands(name, args)?;
                let conditions = std::mem::take(pending);
                rules.push(self.rules.build(pattern, substitution, flags, conditions)?);
            }
        }
        Ok(())
    }
}
