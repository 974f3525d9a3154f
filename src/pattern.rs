//! Test-string and substitution templates.
//!
//! A [`Pattern`] is the parsed form of strings such as
//! `/var/www/%{REQUEST_URI}` or `/index.php?page=$1&lang=%2`: literal text
//! interleaved with server variables and back-references.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use super::context::RewriteContext;
use super::error::{ParseError, Unsupported};
use super::tokenize::escape_token;
use super::variables::ServerVariable;

// https://url.spec.whatwg.org/#percent-encoded-bytes
const ESCAPE: &AsciiSet = &CONTROLS
    .add(b'~')
    .add(b' ') // fragment encoding
    .add(b'\'')
    .add(b'"')
    .add(b'`')
    .add(b'#') // query encoding
    .add(b'<')
    .add(b'>')
    .add(b'?') // path encoding
    .add(b'^')
    .add(b'{')
    .add(b'}')
    .add(b'/') // user-info encoding
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'$') // component encoding
    .add(b'&')
    .add(b'+')
    .add(b',');

/// Captured groups of a regex match, group `0` being the whole match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackReferences(Vec<String>);

impl BackReferences {
    pub fn new(groups: Vec<String>) -> Self {
        Self(groups)
    }

    /// Value of group `index`, empty if the group does not exist or
    /// did not participate in the match.
    #[inline]
    pub fn get(&self, index: usize) -> &str {
        self.0.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Single piece of a [`Pattern`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Plain text copied as-is.
    Literal(String),
    /// `%{NAME}` server variable.
    Server(ServerVariable),
    /// `%N` back-reference into the last evaluated condition.
    Condition(usize),
    /// `$N` back-reference into the rule pattern.
    Rule(usize),
}

/// Parsed test-string or substitution template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern(Vec<Segment>);

type Chars<'a> = Peekable<CharIndices<'a>>;

impl Pattern {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// Parse a raw test-string into its segments.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices().peekable();
        while let Some((_, c)) = chars.next() {
            let segment = match c {
                '\\' if chars.peek().is_some_and(|(_, n)| *n == '$' || *n == '%') => {
                    if let Some((_, n)) = chars.next() {
                        literal.push(n);
                    }
                    continue;
                }
                '%' => parse_percent(raw, &mut chars)?,
                '$' => parse_dollar(raw, &mut chars)?,
                _ => {
                    literal.push(c);
                    continue;
                }
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self(segments))
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Returns true if the pattern is exactly the `-` placeholder
    /// meaning "no substitution".
    pub fn is_passthrough(&self) -> bool {
        matches!(self.0.as_slice(), [Segment::Literal(l)] if l == "-")
    }

    /// Expand the pattern against the current request state.
    ///
    /// When `escape` is set, back-reference values are percent-encoded.
    pub fn evaluate(
        &self,
        ctx: &RewriteContext,
        rule_refs: &BackReferences,
        cond_refs: &BackReferences,
        escape: bool,
    ) -> String {
        let mut dst = String::new();
        for segment in self.0.iter() {
            let backref = match segment {
                Segment::Literal(literal) => {
                    dst.push_str(literal);
                    continue;
                }
                Segment::Server(var) => {
                    dst.push_str(&ctx.variable(*var));
                    continue;
                }
                Segment::Condition(index) => cond_refs.get(*index),
                Segment::Rule(index) => rule_refs.get(*index),
            };
            match escape {
                true => dst.extend(utf8_percent_encode(backref, ESCAPE)),
                false => dst.push_str(backref),
            }
        }
        dst
    }
}

fn parse_percent(raw: &str, chars: &mut Chars) -> Result<Segment, ParseError> {
    match chars.next() {
        None => Err(ParseError::UnexpectedEnd(raw.to_owned())),
        Some((_, '{')) => {
            let mut name = String::new();
            loop {
                match chars.next() {
                    None => return Err(ParseError::MissingCloseBrace(raw.to_owned())),
                    Some((_, '}')) => break,
                    Some((_, c)) => name.push(c),
                }
            }
            if name.contains(':') {
                return Err(Unsupported::SegmentedLookup(name).into());
            }
            Ok(Segment::Server(ServerVariable::from_name(&name)?))
        }
        Some((_, d)) if d.is_ascii_digit() => Ok(Segment::Condition(digit(d))),
        Some((index, found)) => Err(ParseError::UnexpectedChar {
            input: raw.to_owned(),
            index,
            found,
        }),
    }
}

fn parse_dollar(raw: &str, chars: &mut Chars) -> Result<Segment, ParseError> {
    match chars.next() {
        None => Err(ParseError::UnexpectedEnd(raw.to_owned())),
        Some((_, d)) if d.is_ascii_digit() => Ok(Segment::Rule(digit(d))),
        Some((_, '{')) => Err(Unsupported::RewriteMap.into()),
        Some(_) => Err(ParseError::InvalidBackReference(raw.to_owned())),
    }
}

#[inline]
fn digit(c: char) -> usize {
    c.to_digit(10).unwrap_or_default() as usize
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => {
                let literal = literal.replace('$', r"\$").replace('%', r"\%");
                f.write_str(&escape_token(&literal))
            }
            Self::Server(var) => write!(f, "{var}"),
            Self::Condition(index) => write!(f, "%{index}"),
            Self::Rule(index) => write!(f, "${index}"),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|s| write!(f, "{s}"))
    }
}
