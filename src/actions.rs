//! Side effects of a matching rule.
//!
//! A rule runs its [`PreAction`]s in order and then exactly one
//! [`UrlAction`], which reports how evaluation proceeds through a
//! [`RuleResult`].

use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};

use super::context::RewriteContext;
use super::error::ParseError;
use super::extra;
use super::pattern::{BackReferences, Pattern};

/// Signal returned by an action controlling further rule processing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RuleResult {
    /// Proceed with the next rule using the rewritten request.
    #[default]
    Continue,
    /// Stop processing rules, the request continues downstream.
    StopRules,
    /// Stop processing rules, the response is complete.
    ResponseComplete,
}

/// Final decision of an evaluation over a rule set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// No rule changed the request.
    Unchanged,
    /// Request rewritten internally. `scheme` and `host` are only set when
    /// an absolute url was produced.
    Uri {
        scheme: Option<String>,
        host: Option<String>,
        path: String,
        query: String,
    },
    /// External redirect with the `Location` and status to respond with.
    Redirect { location: String, status: u16 },
    /// Terminal status such as `403` or `410`.
    Status(u16),
}

impl Rewrite {
    /// Rebuild the rewritten uri, `None` unless this is [`Rewrite::Uri`].
    pub fn uri(&self) -> Option<String> {
        let Self::Uri {
            scheme,
            host,
            path,
            query,
        } = self
        else {
            return None;
        };
        let mut uri = match (scheme, host) {
            (Some(scheme), Some(host)) => format!("{scheme}://{host}{path}"),
            _ => path.clone(),
        };
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(query);
        }
        Some(uri)
    }
}

/// Query string handling selected by `QSA`, `QSD` and `QSL`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryMode {
    pub append: bool,
    pub discard: bool,
    pub last: bool,
}

impl QueryMode {
    /// Split the substitution into its path and optional query parts.
    fn split<'t>(&self, target: &'t str) -> (&'t str, Option<&'t str>) {
        let split = match self.last {
            true => target.rsplit_once('?'),
            false => target.split_once('?'),
        };
        match split {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        }
    }

    /// Combine the substitution's query with the current one.
    fn resolve(&self, new: Option<&str>, old: &str) -> String {
        match new {
            Some(new) if self.append && !self.discard => extra::join_query(new, old),
            Some(new) => new.to_owned(),
            None if self.discard => String::new(),
            None => old.to_owned(),
        }
    }
}

/// Substitution template plus how it is expanded.
#[derive(Clone, Debug)]
pub struct Target {
    pub pattern: Pattern,
    pub escape: bool,
    pub query: QueryMode,
}

impl Target {
    #[inline]
    fn expand(
        &self,
        ctx: &RewriteContext,
        rule_refs: &BackReferences,
        cond_refs: &BackReferences,
    ) -> String {
        self.pattern.evaluate(ctx, rule_refs, cond_refs, self.escape)
    }
}

#[inline]
fn leading_slash(path: &str) -> String {
    match path.starts_with('/') {
        true => path.to_owned(),
        false => format!("/{path}"),
    }
}

/// Main action of a rule.
#[derive(Clone, Debug)]
pub enum UrlAction {
    /// Internal rewrite, `last` is set by the `L` or `END` flags.
    Rewrite { target: Target, last: bool },
    /// External redirect with a `3xx` status.
    Redirect { target: Target, status: u16 },
    Forbidden,
    Gone,
    /// Non-redirect status given through `R=`.
    Status(u16),
}

impl UrlAction {
    /// Apply the action to the context.
    pub fn apply(
        &self,
        ctx: &mut RewriteContext,
        rule_refs: &BackReferences,
        cond_refs: &BackReferences,
    ) -> RuleResult {
        match self {
            Self::Rewrite { target, last } => {
                rewrite(target, ctx, rule_refs, cond_refs);
                match last {
                    true => RuleResult::StopRules,
                    false => RuleResult::Continue,
                }
            }
            Self::Redirect { target, status } => {
                let url = target.expand(ctx, rule_refs, cond_refs);
                let (base, new_query) = target.query.split(&url);
                let query = target.query.resolve(new_query, &ctx.query);
                let base = match base.contains("://") {
                    true => base.to_owned(),
                    false => leading_slash(base),
                };
                let location = extra::with_query(base, &query);
                ctx.response = Some(Rewrite::Redirect {
                    location,
                    status: *status,
                });
                RuleResult::ResponseComplete
            }
            Self::Forbidden => respond(ctx, 403),
            Self::Gone => respond(ctx, 410),
            Self::Status(status) => respond(ctx, *status),
        }
    }
}

#[inline]
fn respond(ctx: &mut RewriteContext, status: u16) -> RuleResult {
    ctx.response = Some(Rewrite::Status(status));
    RuleResult::ResponseComplete
}

fn rewrite(
    target: &Target,
    ctx: &mut RewriteContext,
    rule_refs: &BackReferences,
    cond_refs: &BackReferences,
) {
    if target.pattern.is_passthrough() {
        if target.query.discard && !ctx.query.is_empty() {
            ctx.query.clear();
            ctx.rewritten = true;
        }
        return;
    }

    let mut url = target.expand(ctx, rule_refs, cond_refs);
    if url.is_empty() {
        url.push('/');
    }
    let (base, new_query) = target.query.split(&url);
    ctx.query = target.query.resolve(new_query, &ctx.query);
    match extra::split_absolute(base) {
        Some((scheme, host, path)) => {
            ctx.scheme = scheme.to_owned();
            ctx.host = Some(host.to_owned());
            ctx.path = leading_slash(path);
        }
        None => ctx.path = leading_slash(base),
    }
    ctx.rewritten = true;
}

/// Side effect run before the main action of a matching rule.
#[derive(Clone, Debug)]
pub enum PreAction {
    Cookie(CookieAction),
    Env(EnvAction),
}

impl PreAction {
    pub fn apply(
        &self,
        ctx: &mut RewriteContext,
        rule_refs: &BackReferences,
        cond_refs: &BackReferences,
    ) {
        match self {
            Self::Cookie(cookie) => {
                let header = cookie.header_value(ctx.now());
                ctx.cookies.push(header);
            }
            Self::Env(env) => {
                let value = env
                    .value
                    .as_ref()
                    .map(|value| value.evaluate(ctx, rule_refs, cond_refs, false));
                ctx.env.insert(env.name.clone(), value);
            }
        }
    }
}

/// Cookie declared by the `CO` flag.
///
/// Format is `NAME:VALUE:DOMAIN[:lifetime[:path[:secure[:httponly]]]]`
/// with the lifetime in minutes. A leading `;` switches the separator
/// to `;`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieAction {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub lifetime: Option<i64>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

#[inline]
fn is_enabled(field: &str, name: &str) -> bool {
    field.eq_ignore_ascii_case(name) || field.eq_ignore_ascii_case("true") || field == "1"
}

impl FromStr for CookieAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidCookie(s.to_owned());
        let (separator, body) = match s.strip_prefix(';') {
            Some(body) => (';', body),
            None => (':', s),
        };
        let fields: Vec<&str> = body.split(separator).map(str::trim).collect();
        let [name, value, domain, rest @ ..] = fields.as_slice() else {
            return Err(invalid());
        };
        if name.is_empty() || rest.len() > 4 {
            return Err(invalid());
        }

        let field = |index: usize| rest.get(index).copied().unwrap_or_default();
        let lifetime = match field(0) {
            "" => None,
            minutes => Some(minutes.parse::<i64>().map_err(|_| invalid())?),
        };
        let path = match field(1) {
            "" => "/",
            path => path,
        };
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_string(),
            lifetime,
            path: path.to_owned(),
            secure: is_enabled(field(2), "secure"),
            http_only: is_enabled(field(3), "httponly"),
        })
    }
}

impl CookieAction {
    /// Render the `Set-Cookie` header value relative to `now`.
    pub fn header_value(&self, now: DateTime<Utc>) -> String {
        let mut header = format!("{}={}", self.name, self.value);
        let expires = self
            .lifetime
            .filter(|minutes| *minutes > 0)
            .and_then(TimeDelta::try_minutes)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        if let Some(expires) = expires {
            header.push_str(&expires.format("; expires=%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if !self.domain.is_empty() {
            header.push_str("; domain=");
            header.push_str(&self.domain);
        }
        header.push_str("; path=");
        header.push_str(&self.path);
        if self.secure {
            header.push_str("; secure");
        }
        if self.http_only {
            header.push_str("; httponly");
        }
        header
    }
}

/// Environment change declared by the `E` flag.
///
/// `E=VAR:VALUE` sets a variable, `E=!VAR` unsets it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvAction {
    pub name: String,
    pub value: Option<Pattern>,
}

impl FromStr for EnvAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.strip_prefix('!') {
            Some(name) => (name, None),
            None => match s.split_once(':') {
                Some((name, value)) => (name, Some(Pattern::parse(value)?)),
                None => (s, Some(Pattern::default())),
            },
        };
        if name.is_empty() {
            return Err(ParseError::InvalidEnv(s.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::context::Request;

    fn target(raw: &str, query: QueryMode) -> Target {
        Target {
            pattern: Pattern::parse(raw).unwrap(),
            escape: false,
            query,
        }
    }

    fn refs(groups: &[&str]) -> BackReferences {
        BackReferences::new(groups.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_rewrite() {
        let req = Request::new("/old/page?a=1");
        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Rewrite {
            target: target("new/$1", QueryMode::default()),
            last: true,
        };
        let result = action.apply(&mut ctx, &refs(&["/old/page", "page"]), &refs(&[]));
        assert_eq!(result, RuleResult::StopRules);
        assert_eq!(ctx.path(), "/new/page");
        assert_eq!(ctx.query(), "a=1");
        assert!(ctx.rewritten);
    }

    #[test]
    fn test_rewrite_query() {
        let req = Request::new("/x?a=1");
        let empty = refs(&[]);

        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Rewrite {
            target: target("/y?b=2", QueryMode::default()),
            last: false,
        };
        assert_eq!(action.apply(&mut ctx, &empty, &empty), RuleResult::Continue);
        assert_eq!((ctx.path(), ctx.query()), ("/y", "b=2"));

        let mut ctx = RewriteContext::new(&req);
        let qsa = QueryMode {
            append: true,
            ..Default::default()
        };
        let action = UrlAction::Rewrite {
            target: target("/y?b=2", qsa),
            last: false,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!(ctx.query(), "b=2&a=1");

        let mut ctx = RewriteContext::new(&req);
        let qsd = QueryMode {
            discard: true,
            ..Default::default()
        };
        let action = UrlAction::Rewrite {
            target: target("/y", qsd),
            last: false,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!((ctx.path(), ctx.query()), ("/y", ""));

        let mut ctx = RewriteContext::new(&req);
        let qsl = QueryMode {
            last: true,
            ..Default::default()
        };
        let action = UrlAction::Rewrite {
            target: target("/y?what?c=3", qsl),
            last: false,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!((ctx.path(), ctx.query()), ("/y?what", "c=3"));
    }

    #[test]
    fn test_rewrite_special() {
        let req = Request::new("/x?a=1");
        let empty = refs(&[]);

        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Rewrite {
            target: target("-", QueryMode::default()),
            last: false,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!((ctx.path(), ctx.query()), ("/x", "a=1"));
        assert!(!ctx.rewritten);

        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Rewrite {
            target: target("$5", QueryMode::default()),
            last: false,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!(ctx.path(), "/");

        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Rewrite {
            target: target("https://other.example.com/z", QueryMode::default()),
            last: false,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!(ctx.path(), "/z");
        assert_eq!(ctx.scheme, "https");
        assert_eq!(ctx.host.as_deref(), Some("other.example.com"));
    }

    #[test]
    fn test_redirect() {
        let req = Request::new("/old?a=1");
        let empty = refs(&[]);

        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Redirect {
            target: target("new", QueryMode::default()),
            status: 301,
        };
        assert_eq!(
            action.apply(&mut ctx, &empty, &empty),
            RuleResult::ResponseComplete
        );
        assert_eq!(
            ctx.response,
            Some(Rewrite::Redirect {
                location: "/new?a=1".to_owned(),
                status: 301
            })
        );

        let mut ctx = RewriteContext::new(&req);
        let action = UrlAction::Redirect {
            target: target("http://example.com/x?b=2", QueryMode::default()),
            status: 302,
        };
        action.apply(&mut ctx, &empty, &empty);
        assert_eq!(
            ctx.response,
            Some(Rewrite::Redirect {
                location: "http://example.com/x?b=2".to_owned(),
                status: 302
            })
        );
    }

    #[test]
    fn test_terminal() {
        let req = Request::new("/x");
        let empty = refs(&[]);
        for (action, status) in [
            (UrlAction::Forbidden, 403),
            (UrlAction::Gone, 410),
            (UrlAction::Status(404), 404),
        ] {
            let mut ctx = RewriteContext::new(&req);
            assert_eq!(
                action.apply(&mut ctx, &empty, &empty),
                RuleResult::ResponseComplete
            );
            assert_eq!(ctx.response, Some(Rewrite::Status(status)));
        }
    }

    #[test]
    fn test_cookie_parse() {
        let cookie: CookieAction = "lang:en:example.com:60:/app:secure:httponly".parse().unwrap();
        assert_eq!(
            cookie,
            CookieAction {
                name: "lang".to_owned(),
                value: "en".to_owned(),
                domain: "example.com".to_owned(),
                lifetime: Some(60),
                path: "/app".to_owned(),
                secure: true,
                http_only: true,
            }
        );

        let cookie: CookieAction = ";token;a:b;.example.com".parse().unwrap();
        assert_eq!(cookie.value, "a:b");
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.lifetime, None);
        assert!(!cookie.secure);

        for bad in ["a:b", "a", ":b:c", "a:b:c:soon", "a:b:c:1:/:1:1:extra"] {
            assert!(bad.parse::<CookieAction>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_cookie_header() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let cookie: CookieAction = "lang:en:example.com:10::true".parse().unwrap();
        assert_eq!(
            cookie.header_value(now),
            "lang=en; expires=Tue, 05 Mar 2024 07:18:09 GMT; domain=example.com; path=/; secure"
        );
    }

    #[test]
    fn test_env() {
        let env: EnvAction = "!DEBUG".parse().unwrap();
        assert_eq!(env.name, "DEBUG");
        assert_eq!(env.value, None);

        let env: EnvAction = "PAGE:$1".parse().unwrap();
        let req = Request::new("/x");
        let mut ctx = RewriteContext::new(&req);
        PreAction::Env(env).apply(&mut ctx, &refs(&["/x", "x"]), &refs(&[]));
        assert_eq!(ctx.env.get("PAGE"), Some(&Some("x".to_owned())));

        assert!("".parse::<EnvAction>().is_err());
        assert!("!".parse::<EnvAction>().is_err());
        assert!(":x".parse::<EnvAction>().is_err());
    }

    #[test]
    fn test_rewrite_uri() {
        let rewrite = Rewrite::Uri {
            scheme: Some("https".to_owned()),
            host: Some("example.com".to_owned()),
            path: "/a".to_owned(),
            query: "b=1".to_owned(),
        };
        assert_eq!(rewrite.uri().as_deref(), Some("https://example.com/a?b=1"));
        assert_eq!(Rewrite::Unchanged.uri(), None);
    }
}
