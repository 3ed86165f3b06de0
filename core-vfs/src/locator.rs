//! # Resource Locators
//!
//! A [`ResourceLocator`] names a file or folder on any backend:
//! `scheme://[login[:secret]@]host[:port]/path`. Absolute local paths such as
//! `/home/alice/notes.txt` are accepted as shorthand for `file` locators.
//!
//! ## Overview
//!
//! Locators are immutable values. Parsing lower-cases the scheme and host,
//! collapses `.`/`..`/empty segments, percent-decodes what is left, and drops
//! explicit ports equal to the scheme's default. The normalized string form
//! (`Display`) never includes the secret and escapes the characters that
//! would read differently when parsed again. Equality and hashing are defined
//! on that form, so two locators that differ only in the secret are equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

use crate::credential::Credential;
use crate::error::{VfsError, VfsResult};

/// Scheme used for the local filesystem.
pub const FILE_SCHEME: &str = "file";

/// Default port for well-known schemes.
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "ftp" => Some(21),
        "sftp" => Some(22),
        "smb" => Some(445),
        "http" => Some(80),
        "https" => Some(443),
        "nfs" => Some(2049),
        _ => None,
    }
}

/// Identifies a resource on some backend.
#[derive(Clone)]
pub struct ResourceLocator {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    credential: Option<Credential>,
}

impl ResourceLocator {
    /// Parses a locator string or an absolute local path.
    pub fn parse(input: &str) -> VfsResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VfsError::InvalidLocator("empty locator".to_string()));
        }

        if !trimmed.contains("://") {
            if !trimmed.starts_with('/') {
                return Err(VfsError::InvalidLocator(format!(
                    "not an absolute path: {}",
                    trimmed
                )));
            }
            return Ok(Self::local(normalize_path(trimmed)));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| VfsError::InvalidLocator(format!("{}: {}", trimmed, e)))?;

        let scheme = url.scheme().to_ascii_lowercase();
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if host.is_empty() && scheme != FILE_SCHEME {
            return Err(VfsError::InvalidLocator(format!(
                "missing host: {}",
                trimmed
            )));
        }

        let default = default_port(&scheme);
        let port = url.port().filter(|port| Some(*port) != default);

        let credential = if url.username().is_empty() {
            None
        } else {
            let login = decode(url.username())?;
            let secret = match url.password() {
                Some(password) => decode(password)?,
                None => String::new(),
            };
            Some(Credential::new(login, secret))
        };

        Ok(Self {
            scheme,
            host,
            port,
            path: normalize_encoded_path(url.path())?,
            credential,
        })
    }

    /// Locator for an absolute local path.
    pub fn from_path(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(VfsError::InvalidLocator(format!(
                "not an absolute path: {}",
                path.display()
            )));
        }
        let raw = path.to_string_lossy().replace('\\', "/");
        Ok(Self::local(normalize_path(&raw)))
    }

    fn local(path: String) -> Self {
        Self {
            scheme: FILE_SCHEME.to_string(),
            host: String::new(),
            port: None,
            path,
            credential: None,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit, non-default port.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Explicit port, falling back to the scheme default.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    /// Normalized, decoded absolute path. The root is `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_local(&self) -> bool {
        self.scheme == FILE_SCHEME
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Local filesystem path for `file` locators.
    pub fn to_path_buf(&self) -> Option<PathBuf> {
        self.is_local().then(|| PathBuf::from(&self.path))
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Extension of [`name`](Self::name), lower-cased, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }

    /// Key under which credentials for this server are cached.
    pub fn authority_key(&self) -> String {
        match self.effective_port() {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// Same server, same folder, different credential.
    pub fn with_credential(&self, credential: Credential) -> Self {
        Self {
            credential: Some(credential),
            ..self.clone()
        }
    }

    pub fn without_credential(&self) -> Self {
        Self {
            credential: None,
            ..self.clone()
        }
    }

    /// Locator of the containing folder; `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let parent_path = match self.path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => self.path[..idx].to_string(),
        };
        Some(Self {
            path: parent_path,
            ..self.clone()
        })
    }

    /// Locator of a direct child named `name`.
    pub fn join(&self, name: &str) -> VfsResult<Self> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(VfsError::InvalidLocator(format!(
                "invalid child name '{}' under {}",
                name, self
            )));
        }
        let path = if self.is_root() {
            format!("/{}", name)
        } else {
            format!("{}/{}", self.path, name)
        };
        Ok(Self {
            path,
            ..self.clone()
        })
    }

    /// Path of `self` relative to `base`, when both live on the same server
    /// and `self` is strictly below `base`.
    pub fn relative_to(&self, base: &ResourceLocator) -> Option<String> {
        if self.scheme != base.scheme || self.host != base.host || self.port != base.port {
            return None;
        }
        let rest = if base.is_root() {
            self.path.strip_prefix('/')?
        } else {
            self.path.strip_prefix(base.path.as_str())?.strip_prefix('/')?
        };
        (!rest.is_empty()).then(|| rest.to_string())
    }

    fn login(&self) -> Option<&str> {
        self.credential.as_ref().map(|c| c.login())
    }
}

fn decode(raw: &str) -> VfsResult<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| VfsError::InvalidLocator(format!("invalid percent-encoding: {}", e)))
}

/// Normalizes a percent-encoded path, then decodes each segment. A segment
/// that decodes to a separator or a dot segment is rejected, since the
/// decoded path would be read differently.
fn normalize_encoded_path(raw: &str) -> VfsResult<String> {
    let mut segments = Vec::new();
    for segment in normalize_path(raw).split('/').filter(|s| !s.is_empty()) {
        let decoded = decode(segment)?;
        if decoded.contains('/') || decoded == "." || decoded == ".." {
            return Err(VfsError::InvalidLocator(format!(
                "invalid path segment '{}' in {}",
                segment, raw
            )));
        }
        segments.push(decoded);
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Percent-encodes `%`, `#`, `?`, backslashes, control characters and `extra`.
fn escape(text: &str, extra: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '#' | '?' | '\\') || c.is_control() || extra.contains(&c) {
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Collapses empty, `.` and `..` segments. `..` at the root stays at the root.
fn normalize_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(login) = self.login() {
            write!(f, "{}@", escape(login, &['@', ':', '/']))?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        f.write_str(&escape(&self.path, &[]))
    }
}

impl fmt::Debug for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceLocator({})", self)
    }
}

impl FromStr for ResourceLocator {
    type Err = VfsError;

    fn from_str(s: &str) -> VfsResult<Self> {
        Self::parse(s)
    }
}

impl PartialEq for ResourceLocator {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
            && self.login() == other.login()
    }
}

impl Eq for ResourceLocator {}

impl Hash for ResourceLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scheme.hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.path.hash(state);
        self.login().hash(state);
    }
}
