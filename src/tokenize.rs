//! Directive line tokenizer.

use super::error::ParseError;

/// Split a directive line into whitespace separated tokens.
///
/// A backslash protects the following character from being treated as a
/// delimiter. Escaped spaces and tabs are unescaped inside the token, every
/// other escape sequence is kept verbatim so regex escapes such as `\.`
/// reach the regex compiler untouched.
///
/// Quotes carry no special meaning. Returns `None` for empty input.
pub fn tokenize(line: &str) -> Result<Option<Vec<String>>, ParseError> {
    if line.is_empty() {
        return Ok(None);
    }

    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(ws @ (' ' | '\t')) => token.push(ws),
                Some(next) => {
                    token.push('\\');
                    token.push(next);
                }
                None => return Err(ParseError::DanglingEscape(line.to_owned())),
            },
            ' ' | '\t' => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
            }
            _ => token.push(c),
        }
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    Ok(Some(tokens))
}

/// Escape a token so that [`tokenize`] reads it back as a single token.
pub(crate) fn escape_token(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len());
    for c in token.chars() {
        if c == ' ' || c == '\t' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<String> {
        tokenize(line).unwrap().unwrap()
    }

    #[test]
    fn test_simple() {
        assert_eq!(
            tokens("RewriteRule ^/(.*)$   /index.php?p=$1\t[L]"),
            vec!["RewriteRule", "^/(.*)$", "/index.php?p=$1", "[L]"]
        );
    }

    #[test]
    fn test_escaped_space() {
        assert_eq!(tokens(r"a b\ c d"), vec!["a", "b c", "d"]);
        assert_eq!(tokens("a\\\tb"), vec!["a\tb"]);
    }

    #[test]
    fn test_regex_escapes_preserved() {
        assert_eq!(
            tokens(r"RewriteCond %{HTTP_HOST} ^old\.example\.com$ [NC]"),
            vec!["RewriteCond", "%{HTTP_HOST}", r"^old\.example\.com$", "[NC]"]
        );
        assert_eq!(tokens(r"a\\ b"), vec![r"a\\", "b"]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(tokenize("").unwrap(), None);
        assert_eq!(tokenize("   ").unwrap(), Some(vec![]));
    }

    #[test]
    fn test_dangling_escape() {
        assert!(matches!(
            tokenize(r"RewriteRule a b\"),
            Err(ParseError::DanglingEscape(_))
        ));
    }

    #[test]
    fn test_escape_token() {
        let escaped = escape_token("b c\td");
        assert_eq!(escaped, "b\\ c\\\td");
        assert_eq!(tokens(&escaped), vec!["b c\td"]);
    }
}
