//! Request facts and per-evaluation state used when applying rules.
//!
//! The engine never depends on a specific web framework. Hosts describe
//! the incoming request through [`RequestFacts`], either by implementing
//! the trait on their own request type or by filling in a [`Request`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::{fs, io};

use chrono::{DateTime, Datelike, Timelike, Utc};
use unicase::UniCase;

use super::actions::{Rewrite, RuleResult};
use super::extra;
use super::variables::ServerVariable;

macro_rules! setter {
    ($key:ident, $ref:ident) => {
        #[doc = concat!("Assign value for `", stringify!($ref), "` variable")]
        pub fn $key<S: Into<String>>(mut self, $key: S) -> Self {
            self.$key = Some($key.into());
            self
        }
    };
}

/// Filesystem checks backing the `-d`, `-f`, `-s` and `-x` condition tests.
pub trait FileProbe {
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    /// Size of a regular file, `None` if the path is not a regular file.
    fn file_size(&self, path: &Path) -> Option<u64>;
    fn is_executable(&self, path: &Path) -> bool;
}

/// [`FileProbe`] backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsProbe;

impl FileProbe for FsProbe {
    #[inline]
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[inline]
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, _path: &Path) -> bool {
        false
    }
}

/// Abstraction for the request a rule set is evaluated against.
///
/// Only [`RequestFacts::path`] and [`RequestFacts::header`] are required,
/// everything else falls back to a neutral default.
pub trait RequestFacts {
    /// Request path including the leading `/`.
    fn path(&self) -> &str;

    /// Query string without the leading `?`.
    fn query(&self) -> &str {
        ""
    }

    fn method(&self) -> &str {
        "GET"
    }

    fn scheme(&self) -> &str {
        "http"
    }

    fn protocol(&self) -> &str {
        "HTTP/1.1"
    }

    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<&str>;

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Values with no generic request counterpart such as
    /// `DOCUMENT_ROOT`, `SERVER_NAME` or `REMOTE_USER`.
    fn attribute(&self, _var: ServerVariable) -> Option<&str> {
        None
    }

    /// Clock used for the `TIME_*` variables and cookie expiry.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn files(&self) -> &dyn FileProbe {
        &FsProbe
    }
}

/// Owned, builder-style [`RequestFacts`] implementation.
///
/// # Example
///
/// ```
/// use rewrite_rules::context::Request;
///
/// let req = Request::new("/index.php?page=1")
///     .method("POST")
///     .header("Host", "example.com")
///     .remote_addr("10.0.0.1:4312")
///     .expect("invalid address");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Request {
    path: String,
    query: String,
    method: Option<String>,
    scheme: Option<String>,
    protocol: Option<String>,
    headers: HashMap<UniCase<String>, String>,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    auth_type: Option<String>,
    document_root: Option<String>,
    path_info: Option<String>,
    remote_host: Option<String>,
    remote_user: Option<String>,
    server_admin: Option<String>,
    server_name: Option<String>,
    server_software: Option<String>,
    now: Option<DateTime<Utc>>,
}

#[inline]
fn socket_addr<A: ToSocketAddrs>(addr: A) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing socket address"))
}

impl Request {
    /// Build a request from its path, splitting off any query string.
    pub fn new(uri: &str) -> Self {
        let (path, query) = extra::split_query(uri);
        Self {
            path,
            query: query.to_owned(),
            ..Default::default()
        }
    }

    setter!(method, REQUEST_METHOD);
    setter!(scheme, REQUEST_SCHEME);
    setter!(protocol, SERVER_PROTOCOL);
    setter!(auth_type, AUTH_TYPE);
    setter!(document_root, DOCUMENT_ROOT);
    setter!(path_info, PATH_INFO);
    setter!(remote_host, REMOTE_HOST);
    setter!(remote_user, REMOTE_USER);
    setter!(server_admin, SERVER_ADMIN);
    setter!(server_name, SERVER_NAME);
    setter!(server_software, SERVER_SOFTWARE);

    /// Assign a request header. Names are case-insensitive.
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(UniCase::new(name.into()), value.into());
        self
    }

    /// Assign value for `REMOTE_ADDR`, `REMOTE_PORT` and `IPV6` variables.
    pub fn remote_addr<A: ToSocketAddrs>(mut self, remote_addr: A) -> io::Result<Self> {
        self.remote_addr = Some(socket_addr(remote_addr)?);
        Ok(self)
    }

    /// Assign value for `SERVER_ADDR` and `SERVER_PORT` variables.
    pub fn local_addr<A: ToSocketAddrs>(mut self, local_addr: A) -> io::Result<Self> {
        self.local_addr = Some(socket_addr(local_addr)?);
        Ok(self)
    }

    /// Pin the clock used for `TIME_*` variables.
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

impl RequestFacts for Request {
    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    fn scheme(&self) -> &str {
        self.scheme.as_deref().unwrap_or("http")
    }

    fn protocol(&self) -> &str {
        self.protocol.as_deref().unwrap_or("HTTP/1.1")
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&UniCase::new(name.to_owned()))
            .map(|v| v.as_str())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn attribute(&self, var: ServerVariable) -> Option<&str> {
        let value = match var {
            ServerVariable::AuthType => &self.auth_type,
            ServerVariable::DocumentRoot => &self.document_root,
            ServerVariable::PathInfo => &self.path_info,
            ServerVariable::RemoteHost => &self.remote_host,
            ServerVariable::RemoteUser => &self.remote_user,
            ServerVariable::ServerAdmin => &self.server_admin,
            ServerVariable::ServerName => &self.server_name,
            ServerVariable::ServerSoftware => &self.server_software,
            _ => return None,
        };
        value.as_deref()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// Mutable state of a single evaluation over a rule set.
///
/// Starts as a snapshot of the [`RequestFacts`] and accumulates every
/// rewrite, cookie and environment change made by matching rules.
pub struct RewriteContext<'a> {
    facts: &'a dyn RequestFacts,
    now: DateTime<Utc>,
    pub(crate) scheme: String,
    pub(crate) host: Option<String>,
    pub(crate) path: String,
    pub(crate) query: String,
    pub(crate) rewritten: bool,
    pub(crate) cookies: Vec<String>,
    pub(crate) env: BTreeMap<String, Option<String>>,
    pub(crate) response: Option<Rewrite>,
    pub(crate) result: RuleResult,
}

impl<'a> RewriteContext<'a> {
    pub fn new(facts: &'a dyn RequestFacts) -> Self {
        Self {
            facts,
            now: facts.now(),
            scheme: facts.scheme().to_owned(),
            host: None,
            path: facts.path().to_owned(),
            query: facts.query().to_owned(),
            rewritten: false,
            cookies: Vec::new(),
            env: BTreeMap::new(),
            response: None,
            result: RuleResult::Continue,
        }
    }

    /// Current, possibly rewritten, request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current, possibly rewritten, query string.
    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[inline]
    pub fn facts(&self) -> &dyn RequestFacts {
        self.facts
    }

    #[inline]
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[inline]
    pub(crate) fn files(&self) -> &dyn FileProbe {
        self.facts.files()
    }

    /// Return the value associated with a server variable.
    ///
    /// Values that cannot be resolved for this request are empty.
    pub fn variable(&self, var: ServerVariable) -> String {
        use ServerVariable as V;

        if let Some(header) = var.header() {
            if var == V::HttpHost {
                if let Some(host) = &self.host {
                    return host.clone();
                }
            }
            return self.facts.header(header).unwrap_or_default().to_owned();
        }

        let remote = self.facts.remote_addr();
        let local = self.facts.local_addr();
        match var {
            V::ConnRemoteAddr | V::RemoteAddr => {
                remote.map(|a| a.ip().to_string()).unwrap_or_default()
            }
            V::RemotePort => remote.map(|a| a.port().to_string()).unwrap_or_default(),
            V::RemoteHost => self
                .facts
                .attribute(var)
                .map(str::to_owned)
                .or_else(|| remote.map(|a| a.ip().to_string()))
                .unwrap_or_default(),
            V::Ipv6 => on_off(remote.is_some_and(|a| a.is_ipv6())),
            V::QueryString => self.query.clone(),
            V::RequestMethod => self.facts.method().to_owned(),
            V::ServerAddr => local.map(|a| a.ip().to_string()).unwrap_or_default(),
            V::ServerPort => local.map(|a| a.port().to_string()).unwrap_or_default(),
            V::ServerProtocol => self.facts.protocol().to_owned(),
            V::ServerName => self
                .facts
                .attribute(var)
                .or_else(|| self.facts.header("Host"))
                .map(|host| host.split(':').next().unwrap_or(host).to_owned())
                .unwrap_or_default(),
            V::TimeYear => self.now.year().to_string(),
            V::TimeMon => format!("{:02}", self.now.month()),
            V::TimeDay => format!("{:02}", self.now.day()),
            V::TimeHour => format!("{:02}", self.now.hour()),
            V::TimeMin => format!("{:02}", self.now.minute()),
            V::TimeSec => format!("{:02}", self.now.second()),
            V::TimeWday => self.now.weekday().num_days_from_sunday().to_string(),
            V::Time => self.now.format("%Y%m%d%H%M%S").to_string(),
            V::Https => on_off(self.scheme.eq_ignore_ascii_case("https")),
            V::RequestFilename => match self.facts.attribute(V::DocumentRoot) {
                Some(root) => format!("{}{}", root.trim_end_matches('/'), self.path),
                None => self.path.clone(),
            },
            V::RequestScheme => self.scheme.clone(),
            V::RequestUri => self.path.clone(),
            _ => self
                .facts
                .attribute(var)
                .map(str::to_owned)
                .unwrap_or_default(),
        }
    }
}

#[inline]
fn on_off(on: bool) -> String {
    match on {
        true => "on".to_owned(),
        false => "off".to_owned(),
    }
}

impl Debug for RewriteContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteContext")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("cookies", &self.cookies)
            .field("env", &self.env)
            .field("response", &self.response)
            .field("result", &self.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn request() -> Request {
        Request::new("/docs/index.html?lang=en")
            .method("POST")
            .header("host", "example.com:8080")
            .header("User-Agent", "curl/8.0")
            .remote_addr("[::1]:4312")
            .unwrap()
            .local_addr("127.0.0.1:8080")
            .unwrap()
            .now(Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap())
    }

    #[test]
    fn test_request_variables() {
        let req = request();
        let ctx = RewriteContext::new(&req);
        assert_eq!(ctx.path(), "/docs/index.html");
        assert_eq!(ctx.query(), "lang=en");
        assert_eq!(ctx.variable(ServerVariable::HttpHost), "example.com:8080");
        assert_eq!(ctx.variable(ServerVariable::HttpUserAgent), "curl/8.0");
        assert_eq!(ctx.variable(ServerVariable::HttpReferer), "");
        assert_eq!(ctx.variable(ServerVariable::RequestMethod), "POST");
        assert_eq!(ctx.variable(ServerVariable::RemoteAddr), "::1");
        assert_eq!(ctx.variable(ServerVariable::RemotePort), "4312");
        assert_eq!(ctx.variable(ServerVariable::Ipv6), "on");
        assert_eq!(ctx.variable(ServerVariable::ServerAddr), "127.0.0.1");
        assert_eq!(ctx.variable(ServerVariable::ServerPort), "8080");
        assert_eq!(ctx.variable(ServerVariable::ServerName), "example.com");
        assert_eq!(ctx.variable(ServerVariable::QueryString), "lang=en");
        assert_eq!(ctx.variable(ServerVariable::Https), "off");
        assert_eq!(ctx.variable(ServerVariable::RequestUri), "/docs/index.html");
        assert_eq!(ctx.variable(ServerVariable::AuthType), "");
    }

    #[test]
    fn test_time_variables() {
        let req = request();
        let ctx = RewriteContext::new(&req);
        assert_eq!(ctx.variable(ServerVariable::TimeYear), "2024");
        assert_eq!(ctx.variable(ServerVariable::TimeMon), "03");
        assert_eq!(ctx.variable(ServerVariable::TimeDay), "05");
        assert_eq!(ctx.variable(ServerVariable::TimeHour), "07");
        assert_eq!(ctx.variable(ServerVariable::TimeMin), "08");
        assert_eq!(ctx.variable(ServerVariable::TimeSec), "09");
        assert_eq!(ctx.variable(ServerVariable::TimeWday), "2");
        assert_eq!(ctx.variable(ServerVariable::Time), "20240305070809");
    }

    #[test]
    fn test_request_filename() {
        let req = Request::new("/a/b.txt").document_root("/var/www/");
        let ctx = RewriteContext::new(&req);
        assert_eq!(
            ctx.variable(ServerVariable::RequestFilename),
            "/var/www/a/b.txt"
        );
        assert_eq!(ctx.variable(ServerVariable::DocumentRoot), "/var/www/");

        let req = Request::new("/a/b.txt");
        let ctx = RewriteContext::new(&req);
        assert_eq!(ctx.variable(ServerVariable::RequestFilename), "/a/b.txt");
    }

    #[test]
    fn test_fs_probe() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let probe = FsProbe;
        assert!(probe.is_dir(root));
        assert!(!probe.is_file(root));
        assert!(probe.is_file(&root.join("Cargo.toml")));
        assert!(probe.file_size(&root.join("Cargo.toml")).is_some_and(|s| s > 0));
        assert_eq!(probe.file_size(root), None);
        assert!(!probe.is_executable(&root.join("missing")));
    }
}
