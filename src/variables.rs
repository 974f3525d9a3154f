//! Server variables available to `%{NAME}` lookups.
//!
//! Designed as a subset of the [official](https://httpd.apache.org/docs/current/mod/mod_rewrite.html#rewritecond)
//! `RewriteCond` server variables.

use std::fmt;

use super::error::{ParseError, Unsupported};

macro_rules! variables {
    ($($var:ident => $name:literal,)*) => {
        /// Request or server fact referenced as `%{NAME}` in a test string
        /// or substitution.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ServerVariable {
            $(
                #[doc = concat!("`%{", $name, "}`")]
                $var,
            )*
        }

        impl ServerVariable {
            /// Directive name of the variable.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$var => $name,)*
                }
            }

            fn lookup(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$var),)*
                    _ => None,
                }
            }
        }
    };
}

variables! {
    ContentLength => "CONTENT_LENGTH",
    ContentType => "CONTENT_TYPE",
    HttpAccept => "HTTP_ACCEPT",
    HttpCookie => "HTTP_COOKIE",
    HttpHost => "HTTP_HOST",
    HttpReferer => "HTTP_REFERER",
    HttpUserAgent => "HTTP_USER_AGENT",
    HttpConnection => "HTTP_CONNECTION",
    HttpForwarded => "HTTP_FORWARDED",
    ConnRemoteAddr => "CONN_REMOTE_ADDR",
    Ipv6 => "IPV6",
    QueryString => "QUERY_STRING",
    RemoteAddr => "REMOTE_ADDR",
    RemoteHost => "REMOTE_HOST",
    RemotePort => "REMOTE_PORT",
    RemoteUser => "REMOTE_USER",
    AuthType => "AUTH_TYPE",
    RequestMethod => "REQUEST_METHOD",
    ServerAddr => "SERVER_ADDR",
    ServerName => "SERVER_NAME",
    ServerPort => "SERVER_PORT",
    ServerProtocol => "SERVER_PROTOCOL",
    ServerSoftware => "SERVER_SOFTWARE",
    ServerAdmin => "SERVER_ADMIN",
    DocumentRoot => "DOCUMENT_ROOT",
    PathInfo => "PATH_INFO",
    TimeYear => "TIME_YEAR",
    TimeMon => "TIME_MON",
    TimeDay => "TIME_DAY",
    TimeHour => "TIME_HOUR",
    TimeMin => "TIME_MIN",
    TimeSec => "TIME_SEC",
    TimeWday => "TIME_WDAY",
    Time => "TIME",
    Https => "HTTPS",
    RequestFilename => "REQUEST_FILENAME",
    RequestScheme => "REQUEST_SCHEME",
    RequestUri => "REQUEST_URI",
}

/// Apache variables that only make sense inside httpd itself.
const HTTPD_ONLY: &[&str] = &[
    "ALL_RAW",
    "APP_POOL_ID",
    "API_VERSION",
    "CONTEXT_PREFIX",
    "CONTEXT_DOCUMENT_ROOT",
    "HTTP2",
    "IS_SUBREQ",
    "REMOTE_IDENT",
    "SCRIPT_FILENAME",
    "THE_REQUEST",
];

impl ServerVariable {
    /// Resolve a variable name against the allow-list.
    ///
    /// Names are case-sensitive, exactly as httpd treats them.
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        if let Some(var) = Self::lookup(name) {
            return Ok(var);
        }
        match HTTPD_ONLY.contains(&name) {
            true => Err(Unsupported::ServerVariable(name.to_owned()).into()),
            false => Err(ParseError::UnknownServerVariable(name.to_owned())),
        }
    }

    /// Header backing an `HTTP_*`/`CONTENT_*` variable.
    pub(crate) fn header(&self) -> Option<&'static str> {
        match self {
            Self::ContentLength => Some("Content-Length"),
            Self::ContentType => Some("Content-Type"),
            Self::HttpAccept => Some("Accept"),
            Self::HttpCookie => Some("Cookie"),
            Self::HttpHost => Some("Host"),
            Self::HttpReferer => Some("Referer"),
            Self::HttpUserAgent => Some("User-Agent"),
            Self::HttpConnection => Some("Connection"),
            Self::HttpForwarded => Some("Forwarded"),
            _ => None,
        }
    }
}

impl fmt::Display for ServerVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{{{}}}", self.name())
    }
}
