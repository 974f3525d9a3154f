use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::ParseError;

/// Family of test performed by a condition pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionType {
    Regex,
    PropertyTest,
    StringComp,
    IntComp,
}

/// Comparison or filesystem test selected by a condition pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationType {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    NotEqual,
    Directory,
    RegularFile,
    ExistingFile,
    SymbolicLink,
    Size,
    ExistingUrl,
    Executable,
}

/// Intermediate form of a `CondPattern` or rule pattern before it is
/// compiled into an [`Expression`](super::matcher::Expression).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedExpression {
    pub invert: bool,
    pub kind: ConditionType,
    pub operation: Option<OperationType>,
    pub operand: String,
}

impl ParsedExpression {
    fn new(invert: bool, kind: ConditionType, operation: Option<OperationType>) -> Self {
        Self {
            invert,
            kind,
            operation,
            operand: String::new(),
        }
    }
}

struct Scanner<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    index: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            index: 0,
        }
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let (index, c) = self.chars.next()?;
        self.index = index;
        Some(c)
    }

    /// Advance to the next character, failing on end of input.
    #[inline]
    fn advance(&mut self) -> Result<char, ParseError> {
        self.bump()
            .ok_or_else(|| ParseError::UnexpectedEnd(self.input.to_owned()))
    }

    /// Fail unless at least one more character follows.
    #[inline]
    fn expect_more(&mut self) -> Result<(), ParseError> {
        match self.chars.peek() {
            Some(_) => Ok(()),
            None => Err(ParseError::UnexpectedEnd(self.input.to_owned())),
        }
    }

    fn unexpected(&self, found: char) -> ParseError {
        ParseError::UnexpectedChar {
            input: self.input.to_owned(),
            index: self.index,
            found,
        }
    }

    /// Input starting at the current character.
    #[inline]
    fn current(&self) -> &'a str {
        &self.input[self.index..]
    }

    /// Input following the current character.
    fn remaining(&mut self) -> &'a str {
        match self.chars.peek() {
            Some((index, _)) => &self.input[*index..],
            None => "",
        }
    }
}

/// Parse a `RewriteCond` pattern such as `!-f`, `>=5`, `-lt10` or a
/// plain regex.
///
/// # Example
///
/// ```
/// use rewrite_rules::conditions::parse::*;
///
/// let parsed = parse_condition_pattern(">=5").unwrap();
/// assert_eq!(parsed.kind, ConditionType::StringComp);
/// assert_eq!(parsed.operation, Some(OperationType::GreaterEqual));
/// assert_eq!(parsed.operand, "5");
/// ```
pub fn parse_condition_pattern(raw: &str) -> Result<ParsedExpression, ParseError> {
    use ConditionType as T;
    use OperationType as Op;

    let mut scan = Scanner::new(raw);
    let mut invert = false;
    let mut current = scan.advance()?;
    if current == '!' {
        invert = true;
        current = scan.advance()?;
    }

    let mut parsed = match current {
        '>' | '<' => {
            let (strict, equal) = match current {
                '>' => (Op::Greater, Op::GreaterEqual),
                _ => (Op::Less, Op::LessEqual),
            };
            scan.expect_more()?;
            let operation = match scan.chars.peek() {
                Some((_, '=')) => {
                    scan.advance()?;
                    scan.expect_more()?;
                    equal
                }
                _ => strict,
            };
            ParsedExpression::new(invert, T::StringComp, Some(operation))
        }
        '=' => {
            scan.expect_more()?;
            ParsedExpression::new(invert, T::StringComp, Some(Op::Equal))
        }
        '-' => {
            let parsed = parse_property(&mut scan, invert)?;
            if parsed.kind == T::PropertyTest {
                return Ok(parsed);
            }
            parsed
        }
        _ => {
            let mut parsed = ParsedExpression::new(invert, T::Regex, None);
            parsed.operand = scan.current().to_owned();
            return Ok(parsed);
        }
    };

    parsed.operand = scan.remaining().to_owned();
    if parsed.kind == T::IntComp && parsed.operand.parse::<i64>().is_err() {
        return Err(ParseError::InvalidInteger(parsed.operand));
    }
    Ok(parsed)
}

fn parse_property(scan: &mut Scanner, invert: bool) -> Result<ParsedExpression, ParseError> {
    use ConditionType as T;
    use OperationType as Op;

    let property = |op| Ok(ParsedExpression::new(invert, T::PropertyTest, Some(op)));
    let compare = |op| Ok(ParsedExpression::new(invert, T::IntComp, Some(op)));
    match scan.advance()? {
        'd' => property(Op::Directory),
        'f' => property(Op::RegularFile),
        'F' => property(Op::ExistingFile),
        'h' | 'L' => property(Op::SymbolicLink),
        's' => property(Op::Size),
        'U' => property(Op::ExistingUrl),
        'x' => property(Op::Executable),
        'e' => match scan.advance()? {
            'q' => compare(Op::Equal),
            c => Err(scan.unexpected(c)),
        },
        'g' => match scan.advance()? {
            't' => compare(Op::Greater),
            'e' => compare(Op::GreaterEqual),
            c => Err(scan.unexpected(c)),
        },
        // `-l` alone is a symbolic link test, `-lt` and `-le` compare
        'l' => match scan.bump() {
            None => property(Op::SymbolicLink),
            Some('t') => compare(Op::Less),
            Some('e') => compare(Op::LessEqual),
            Some(c) => Err(scan.unexpected(c)),
        },
        'n' => match scan.advance()? {
            'e' => compare(Op::NotEqual),
            c => Err(scan.unexpected(c)),
        },
        c => Err(scan.unexpected(c)),
    }
}

/// Parse a `RewriteRule` pattern: an optional leading `!` followed by a
/// regex.
pub fn parse_rule_pattern(raw: &str) -> Result<ParsedExpression, ParseError> {
    let (invert, operand) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    if operand.is_empty() {
        return Err(ParseError::UnexpectedEnd(raw.to_owned()));
    }
    let mut parsed = ParsedExpression::new(invert, ConditionType::Regex, None);
    parsed.operand = operand.to_owned();
    Ok(parsed)
}

impl OperationType {
    /// Prefix used to write this operation in a condition pattern.
    pub fn prefix(&self, kind: ConditionType) -> &'static str {
        match (kind, self) {
            (ConditionType::StringComp, Self::Equal) => "=",
            (ConditionType::StringComp, Self::Greater) => ">",
            (ConditionType::StringComp, Self::GreaterEqual) => ">=",
            (ConditionType::StringComp, Self::Less) => "<",
            (ConditionType::StringComp, Self::LessEqual) => "<=",
            (_, Self::Equal) => "-eq",
            (_, Self::Greater) => "-gt",
            (_, Self::GreaterEqual) => "-ge",
            (_, Self::Less) => "-lt",
            (_, Self::LessEqual) => "-le",
            (_, Self::NotEqual) => "-ne",
            (_, Self::Directory) => "-d",
            (_, Self::RegularFile) => "-f",
            (_, Self::ExistingFile) => "-F",
            (_, Self::SymbolicLink) => "-h",
            (_, Self::Size) => "-s",
            (_, Self::ExistingUrl) => "-U",
            (_, Self::Executable) => "-x",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ParsedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invert {
            f.write_str("!")?;
        }
        if let Some(op) = self.operation {
            f.write_str(op.prefix(self.kind))?;
        }
        f.write_str(&self.operand)
    }
}
