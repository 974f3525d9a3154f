//! Bracketed flag lists such as `[NC,R=301,L]`.
//!
//! Rules and conditions each have their own closed vocabulary, both parsed
//! by the same [`Flags`] container. Unknown flags are hard errors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use once_cell::sync::Lazy;
use unicase::UniCase;

use super::error::ParseError;

/// Closed vocabulary of flags accepted by one directive type.
pub trait FlagKind: Copy + Ord + Hash + fmt::Debug + 'static {
    /// Case-insensitive lookup of a long or short flag name.
    fn lookup(name: &str) -> Option<Self>;

    /// Canonical short name.
    fn name(&self) -> &'static str;
}

macro_rules! flag_kind {
    (
        $(#[$meta:meta])*
        $kind:ident, $table:ident {
            $($(#[$fmeta:meta])* $flag:ident => [$short:literal $(, $alias:literal)*],)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $kind {
            $($(#[$fmeta])* $flag,)*
        }

        static $table: Lazy<HashMap<UniCase<String>, $kind>> = Lazy::new(|| {
            let mut table = HashMap::new();
            $(
                table.insert(UniCase::new($short.to_owned()), $kind::$flag);
                $(table.insert(UniCase::new($alias.to_owned()), $kind::$flag);)*
            )*
            table
        });

        impl FlagKind for $kind {
            #[inline]
            fn lookup(name: &str) -> Option<Self> {
                $table.get(&UniCase::new(name.to_owned())).copied()
            }

            fn name(&self) -> &'static str {
                match self {
                    $(Self::$flag => $short,)*
                }
            }
        }
    };
}

flag_kind! {
    /// Supported `RewriteRule` flags.
    ///
    /// See the [official](https://httpd.apache.org/docs/current/rewrite/flags.html)
    /// flag documentation for their meaning.
    RuleFlag, RULE_FLAGS {
        EscapeBackreference => ["B"],
        Chain => ["C", "chain"],
        Cookie => ["CO", "cookie"],
        DiscardPath => ["DPI", "discardpath"],
        Env => ["E", "env"],
        End => ["END"],
        Forbidden => ["F", "forbidden"],
        Gone => ["G", "gone"],
        Handler => ["H", "handler"],
        Last => ["L", "last"],
        Next => ["N", "next"],
        NoCase => ["NC", "nocase"],
        NoEscape => ["NE", "noescape"],
        NoSubReq => ["NS", "nosubreq"],
        Proxy => ["P", "proxy"],
        PassThrough => ["PT", "passthrough"],
        QsAppend => ["QSA", "qsappend"],
        QsDiscard => ["QSD", "qsdiscard"],
        QsLast => ["QSL", "qslast"],
        Redirect => ["R", "redirect"],
        Skip => ["S", "skip"],
        Type => ["T", "type"],
    }
}

flag_kind! {
    /// Supported `RewriteCond` flags.
    CondFlag, COND_FLAGS {
        NoCase => ["NC", "nocase"],
        Or => ["OR", "ornext"],
        NoVary => ["NV", "novary"],
    }
}

/// Parsed flag list mapping each flag to its payload.
///
/// Flags without a `=value` payload map to an empty string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flags<F: FlagKind>(BTreeMap<F, String>);

impl<F: FlagKind> Default for Flags<F> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<F: FlagKind> Flags<F> {
    /// Parse an optional flag token, missing flags are empty.
    pub fn parse_opt(s: Option<&str>) -> Result<Self, ParseError> {
        s.map(Self::from_str).transpose().map(Option::unwrap_or_default)
    }

    #[inline]
    pub fn has(&self, flag: F) -> bool {
        self.0.contains_key(&flag)
    }

    #[inline]
    pub fn get(&self, flag: F) -> Option<&str> {
        self.0.get(&flag).map(|s| s.as_str())
    }

    /// Assign a flag, replacing any earlier payload.
    pub fn set<S: Into<String>>(&mut self, flag: F, value: S) {
        self.0.insert(flag, value.into());
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (F, &str)> {
        self.0.iter().map(|(f, v)| (*f, v.as_str()))
    }
}

impl<F: FlagKind> FromStr for Flags<F> {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| ParseError::FlagsMissingBrackets(s.to_owned()))?;
        if inner.is_empty() {
            return Err(ParseError::FlagsEmpty);
        }
        let mut flags = Self::default();
        for token in inner.split(',') {
            let (name, value) = token.split_once('=').unwrap_or((token, ""));
            let flag = F::lookup(name).ok_or_else(|| ParseError::UnknownFlag(name.to_owned()))?;
            flags.set(flag, value);
        }
        Ok(flags)
    }
}

impl<F: FlagKind> fmt::Display for Flags<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (flag, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(flag.name())?;
            if !value.is_empty() {
                write!(f, "={value}")?;
            }
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_flags() {
        let flags: Flags<RuleFlag> = "[R=301,L]".parse().unwrap();
        assert_eq!(flags.get(RuleFlag::Redirect), Some("301"));
        assert_eq!(flags.get(RuleFlag::Last), Some(""));
        assert!(!flags.has(RuleFlag::End));
        assert_eq!(flags.to_string(), "[L,R=301]");
    }

    #[test]
    fn test_aliases() {
        let flags: Flags<RuleFlag> = "[nocase,Redirect=302,qsa,CO=a:b:c]".parse().unwrap();
        assert!(flags.has(RuleFlag::NoCase));
        assert!(flags.has(RuleFlag::QsAppend));
        assert_eq!(flags.get(RuleFlag::Redirect), Some("302"));
        assert_eq!(flags.get(RuleFlag::Cookie), Some("a:b:c"));

        let flags: Flags<CondFlag> = "[NC,ornext]".parse().unwrap();
        assert!(flags.has(CondFlag::NoCase));
        assert!(flags.has(CondFlag::Or));
    }

    #[test]
    fn test_duplicate_overwrites() {
        let flags: Flags<RuleFlag> = "[S=1,S=3]".parse().unwrap();
        assert_eq!(flags.get(RuleFlag::Skip), Some("3"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            "[badflag]".parse::<Flags<RuleFlag>>(),
            Err(ParseError::UnknownFlag("badflag".to_owned()))
        );
        assert_eq!(
            "[L,]".parse::<Flags<RuleFlag>>(),
            Err(ParseError::UnknownFlag(String::new()))
        );
        assert_eq!("[]".parse::<Flags<RuleFlag>>(), Err(ParseError::FlagsEmpty));
        assert!(matches!(
            "L".parse::<Flags<RuleFlag>>(),
            Err(ParseError::FlagsMissingBrackets(_))
        ));
        // closed vocabularies per directive
        assert!("[R]".parse::<Flags<CondFlag>>().is_err());
        assert!("[OR]".parse::<Flags<RuleFlag>>().is_err());
    }

    #[test]
    fn test_parse_opt() {
        assert!(Flags::<CondFlag>::parse_opt(None).unwrap().is_empty());
        assert!(Flags::<CondFlag>::parse_opt(Some("[OR]")).unwrap().has(CondFlag::Or));
    }
}
