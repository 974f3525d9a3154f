use std::fmt;
use std::path::Path;

use unicase::UniCase;

use super::parse::{ConditionType, OperationType, ParsedExpression};
use crate::context::{FileProbe, RewriteContext};
use crate::error::{ParseError, Unsupported};
use crate::matching::{CompiledRegex, MatchLimits};
use crate::pattern::BackReferences;
use crate::tokenize::escape_token;

/// Outcome of evaluating an [`Expression`] or a list of conditions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub success: bool,
    pub refs: BackReferences,
}

impl MatchResult {
    #[inline]
    pub fn new(success: bool, refs: BackReferences) -> Self {
        Self { success, refs }
    }
}

/// Ordered comparison shared by string and integer operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compare {
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    NotEqual,
}

impl Compare {
    /// Evaluate `first <op> second`.
    pub fn compare<T: Ord>(&self, first: T, second: T) -> bool {
        match self {
            Self::Equal => first == second,
            Self::Greater => first > second,
            Self::GreaterEqual => first >= second,
            Self::Less => first < second,
            Self::LessEqual => first <= second,
            Self::NotEqual => first != second,
        }
    }

    fn from_operation(kind: ConditionType, op: OperationType) -> Result<Self, ParseError> {
        Ok(match op {
            OperationType::Equal => Self::Equal,
            OperationType::Greater => Self::Greater,
            OperationType::GreaterEqual => Self::GreaterEqual,
            OperationType::Less => Self::Less,
            OperationType::LessEqual => Self::LessEqual,
            OperationType::NotEqual if kind == ConditionType::IntComp => Self::NotEqual,
            _ => return Err(invalid_operation(kind, Some(op))),
        })
    }

    fn operation(&self) -> OperationType {
        match self {
            Self::Equal => OperationType::Equal,
            Self::Greater => OperationType::Greater,
            Self::GreaterEqual => OperationType::GreaterEqual,
            Self::Less => OperationType::Less,
            Self::LessEqual => OperationType::LessEqual,
            Self::NotEqual => OperationType::NotEqual,
        }
    }
}

/// Filesystem attribute test run against the expanded test string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileTest {
    Directory,
    RegularFile,
    ExistingFile,
    Size,
    Executable,
}

impl FileTest {
    fn from_operation(op: Option<OperationType>) -> Result<Self, ParseError> {
        match op {
            Some(OperationType::Directory) => Ok(Self::Directory),
            Some(OperationType::RegularFile) => Ok(Self::RegularFile),
            Some(OperationType::ExistingFile) => Ok(Self::ExistingFile),
            Some(OperationType::Size) => Ok(Self::Size),
            Some(OperationType::Executable) => Ok(Self::Executable),
            Some(OperationType::SymbolicLink) => Err(Unsupported::SymbolicLink.into()),
            Some(OperationType::ExistingUrl) => Err(Unsupported::ExistingUrl.into()),
            op => Err(invalid_operation(ConditionType::PropertyTest, op)),
        }
    }

    /// Evaluate the test against the given path.
    pub fn matches(&self, path: &Path, files: &dyn FileProbe) -> bool {
        match self {
            Self::Directory => files.is_dir(path),
            Self::RegularFile | Self::ExistingFile => files.is_file(path),
            Self::Size => files.file_size(path).is_some_and(|size| size > 0),
            Self::Executable => files.is_executable(path),
        }
    }

    fn operation(&self) -> OperationType {
        match self {
            Self::Directory => OperationType::Directory,
            Self::RegularFile => OperationType::RegularFile,
            Self::ExistingFile => OperationType::ExistingFile,
            Self::Size => OperationType::Size,
            Self::Executable => OperationType::Executable,
        }
    }
}

fn invalid_operation(kind: ConditionType, op: Option<OperationType>) -> ParseError {
    ParseError::InvalidOperation {
        kind: kind.to_string(),
        operation: op.map(|op| op.to_string()).unwrap_or_else(|| "none".to_owned()),
    }
}

/// Compiled right hand side of a condition or rule.
#[derive(Clone, Debug)]
pub enum Operand {
    Regex(CompiledRegex),
    Integer(Compare, i64),
    String {
        compare: Compare,
        value: String,
        nocase: bool,
    },
    FileTest(FileTest),
}

/// Executable condition expression, an [`Operand`] plus its invert bit.
#[derive(Clone, Debug)]
pub struct Expression {
    operand: Operand,
    invert: bool,
}

impl Expression {
    /// Compile a [`ParsedExpression`] into its executable form.
    ///
    /// `nocase` makes regexes and string comparisons case-insensitive.
    pub fn create(
        parsed: ParsedExpression,
        nocase: bool,
        limits: &MatchLimits,
    ) -> Result<Self, ParseError> {
        let operand = match parsed.kind {
            ConditionType::Regex => {
                Operand::Regex(CompiledRegex::new(&parsed.operand, nocase, limits)?)
            }
            ConditionType::IntComp => {
                let op = parsed
                    .operation
                    .ok_or_else(|| invalid_operation(parsed.kind, None))?;
                let value = parsed
                    .operand
                    .parse()
                    .map_err(|_| ParseError::InvalidInteger(parsed.operand.clone()))?;
                Operand::Integer(Compare::from_operation(parsed.kind, op)?, value)
            }
            ConditionType::StringComp => {
                let op = parsed
                    .operation
                    .ok_or_else(|| invalid_operation(parsed.kind, None))?;
                Operand::String {
                    compare: Compare::from_operation(parsed.kind, op)?,
                    value: parsed.operand,
                    nocase,
                }
            }
            ConditionType::PropertyTest => {
                Operand::FileTest(FileTest::from_operation(parsed.operation)?)
            }
        };
        Ok(Self {
            operand,
            invert: parsed.invert,
        })
    }

    #[inline]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    #[inline]
    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    /// Evaluate the expression against an expanded input string.
    ///
    /// Only a successful, non-inverted regex produces back-references.
    pub fn evaluate(&self, input: &str, ctx: &RewriteContext) -> MatchResult {
        let (success, refs) = match &self.operand {
            Operand::Regex(regex) => match regex.captures(input) {
                Some(refs) => (true, refs),
                None => (false, BackReferences::default()),
            },
            Operand::Integer(compare, value) => {
                let success = input
                    .trim()
                    .parse::<i64>()
                    .is_ok_and(|n| compare.compare(n, *value));
                (success, BackReferences::default())
            }
            Operand::String {
                compare,
                value,
                nocase: true,
            } => (
                compare.compare(UniCase::new(input), UniCase::new(value.as_str())),
                BackReferences::default(),
            ),
            Operand::String { compare, value, .. } => (
                compare.compare(input, value.as_str()),
                BackReferences::default(),
            ),
            Operand::FileTest(test) => (
                test.matches(Path::new(input), ctx.files()),
                BackReferences::default(),
            ),
        };
        match self.invert {
            true => MatchResult::new(!success, BackReferences::default()),
            false => MatchResult::new(success, refs),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invert {
            f.write_str("!")?;
        }
        match &self.operand {
            Operand::Regex(regex) => f.write_str(&escape_token(regex.source())),
            Operand::Integer(compare, value) => {
                let prefix = compare.operation().prefix(ConditionType::IntComp);
                write!(f, "{prefix}{value}")
            }
            Operand::String { compare, value, .. } => {
                let prefix = compare.operation().prefix(ConditionType::StringComp);
                write!(f, "{prefix}{}", escape_token(value))
            }
            Operand::FileTest(test) => {
                f.write_str(test.operation().prefix(ConditionType::PropertyTest))
            }
        }
    }
}
