use assertables::*;
use rewrite_rules::actions::UrlAction;
use rewrite_rules::context::Request;
use rewrite_rules::error::{ParseError, Unsupported};
use rewrite_rules::expr::FileParser;
use rewrite_rules::{Engine, Rewrite};

mod common;

#[test]
fn load_fixture() {
    common::setup();

    let file = std::fs::File::open(common::data("rules.conf")).unwrap();
    let rules = assert_ok!(FileParser::default().parse(std::io::BufReader::new(file)));
    assert_eq!(rules.len(), 5);
    assert_eq!(rules[0].conditions().len(), 1);
    assert_eq!(rules[4].conditions().len(), 2);
    assert!(rules[1..4].iter().all(|rule| rule.conditions().is_empty()));

    assert!(matches!(rules[0].action(), UrlAction::Redirect { status: 301, .. }));
    assert!(matches!(rules[2].action(), UrlAction::Gone));
    assert!(matches!(rules[3].action(), UrlAction::Forbidden));
    assert!(matches!(rules[4].action(), UrlAction::Rewrite { last: true, .. }));
}

#[test]
fn conditions_are_consumed() {
    common::setup();

    let rules = assert_ok!(FileParser::default().parse_str(
        r#"
        RewriteCond %{HTTP_HOST} ^a [OR]
        RewriteCond %{HTTP_HOST} ^b
        RewriteRule ^/one$ /1
        RewriteRule ^/two$ /2
        RewriteCond %{REQUEST_METHOD} =POST
        RewriteRule ^/three$ /3
        "#
    ));
    let counts: Vec<_> = rules.iter().map(|r| r.conditions().len()).collect();
    assert_eq!(counts, vec![2, 0, 1]);
    assert!(rules[0].conditions()[0].is_or());
    assert!(!rules[0].conditions()[1].is_or());
}

#[test]
fn escaped_whitespace() {
    common::setup();

    let parser = FileParser::default();
    let rules = assert_ok!(parser.parse_str(r"RewriteRule ^/my\ page$ /my\ file [L]"));
    assert_eq!(rules[0].pattern(), "^/my page$");
    assert_eq!(rules[0].substitution().to_string(), r"/my\ file");
}

#[test]
fn trailing_escaped_space() {
    common::setup();

    let rules = "RewriteCond %{HTTP_USER_AGENT} =foo\\ \nRewriteRule ^/a$ /b [L]  \t";
    let parsed = assert_ok!(FileParser::default().parse_str(rules));
    assert_eq!(parsed.len(), 1);
    assert_eq!(
        parsed[0].conditions()[0].to_string(),
        r"RewriteCond %{HTTP_USER_AGENT} =foo\ "
    );

    let engine = assert_ok!(rules.parse::<Engine>());
    let req = Request::new("/a").header("User-Agent", "foo ");
    assert_eq!(engine.rewrite(&req).rewrite.uri().as_deref(), Some("/b"));
    let req = Request::new("/a").header("User-Agent", "foo");
    assert_eq!(engine.rewrite(&req).rewrite, Rewrite::Unchanged);
}

#[test]
fn error_lines() {
    common::setup();

    let parser = FileParser::default();
    let err = assert_err!(parser.parse_str("RewriteRule ^/a$ /b\n\n# note\nRewriteRule ^/(a$ /b"));
    assert_eq!(err.line(), Some(4));
    assert!(matches!(err.parse_error(), Some(ParseError::InvalidRegex { .. })));
    assert_contains!(err.to_string(), "line 4");

    let err = assert_err!(parser.parse_str("RewriteCond %{HTTP_HOST}"));
    assert_eq!(err.line(), Some(1));

    let err = assert_err!(parser.parse_str("RewriteRule ^/a$ /b [L,QSA"));
    assert_eq!(err.parse_error(), Some(&ParseError::FlagsMissingBrackets("[L,QSA".to_owned())));

    let err = assert_err!(parser.parse_str("RewriteRule ^/a$ /b [X]"));
    assert!(matches!(err.parse_error(), Some(ParseError::UnknownFlag(_))));
}

#[test]
fn unsupported_features() {
    common::setup();

    let parser = FileParser::default();
    for (rules, expected) in [
        ("RewriteBase /app", Unsupported::RewriteBase),
        ("RewriteMap m txt:/etc/map", Unsupported::RewriteMap),
        ("RewriteRule ^/a$ http://b/ [P]", Unsupported::Proxy),
        ("RewriteCond %{HTTP_HOST} -l\nRewriteRule ^ -", Unsupported::SymbolicLink),
        ("RewriteCond %{REQUEST_URI} -U\nRewriteRule ^ -", Unsupported::ExistingUrl),
    ] {
        let err = assert_err!(parser.parse_str(rules));
        assert!(err.is_unsupported(), "{rules}");
        assert_eq!(err.parse_error(), Some(&ParseError::NotImplemented(expected)));
    }
}
