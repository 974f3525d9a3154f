#![allow(dead_code)]
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Once;

use rewrite_rules::context::{FileProbe, RequestFacts};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static START: Once = Once::new();

/// Setup function that is only run once, even if called multiple times.
pub fn setup() {
    START.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Path of a fixture under `tests/data`.
pub fn data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// In-memory filesystem used in place of the real one.
#[derive(Debug, Default)]
pub struct MockFiles {
    pub dirs: HashSet<PathBuf>,
    pub files: Vec<(PathBuf, u64, bool)>,
}

impl MockFiles {
    pub fn dir(mut self, path: &str) -> Self {
        self.dirs.insert(PathBuf::from(path));
        self
    }

    pub fn file(mut self, path: &str, size: u64, executable: bool) -> Self {
        self.files.push((PathBuf::from(path), size, executable));
        self
    }

    fn find(&self, path: &Path) -> Option<&(PathBuf, u64, bool)> {
        self.files.iter().find(|(p, _, _)| p == path)
    }
}

impl FileProbe for MockFiles {
    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        self.find(path).map(|(_, size, _)| *size)
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.find(path).is_some_and(|(_, _, exec)| *exec)
    }
}

/// Minimal host request type exercising the trait defaults.
pub struct HostRequest {
    pub path: String,
    pub query: String,
    pub host: String,
    pub root: String,
    pub files: MockFiles,
}

impl HostRequest {
    pub fn new(path: &str, files: MockFiles) -> Self {
        Self {
            path: path.to_owned(),
            query: String::new(),
            host: "example.com".to_owned(),
            root: "/srv/www".to_owned(),
            files,
        }
    }
}

impl RequestFacts for HostRequest {
    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn header(&self, name: &str) -> Option<&str> {
        match name.eq_ignore_ascii_case("host") {
            true => Some(&self.host),
            false => None,
        }
    }

    fn attribute(&self, var: rewrite_rules::variables::ServerVariable) -> Option<&str> {
        match var {
            rewrite_rules::variables::ServerVariable::DocumentRoot => Some(&self.root),
            _ => None,
        }
    }

    fn files(&self) -> &dyn FileProbe {
        &self.files
    }
}
