//! Path handling: the `VfsPath` newtype and the pure path-resolution helpers.
//!
//! `VfsPath` is an opaque string validated on construction. Raw input (user
//! intents, AI operations, HTML references) is first run through
//! [`normalize`], then validated: it rejects `.`/`..` components and null
//! bytes. Everything that keys into the store goes through `VfsPath`.
//!
//! The free functions (`normalize`, `resolve_relative`, `is_folder_prefix_of`,
//! `parent_of`) operate on plain strings and never fail; they are what the
//! tree and preview consumers call directly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name of the zero-length marker that keeps an otherwise empty folder alive.
pub const SENTINEL_NAME: &str = ".keep";

/// Normalized, validated path within the virtual file system.
///
/// Invariants (enforced at construction):
/// - Starts with exactly one `/`
/// - No `//` sequences
/// - No `.` or `..` components
/// - No null bytes
/// - No trailing `/` (except root `/`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VfsPath(String);

impl VfsPath {
    /// Normalize `path` and validate the result.
    pub fn new(path: &str) -> Result<Self> {
        if path.contains('\0') {
            return Err(Error::invalid_path(path, "path cannot contain null bytes"));
        }
        let normalized = normalize(path);
        if normalized
            .split('/')
            .any(|component| component == "." || component == "..")
        {
            return Err(Error::invalid_path(
                path,
                "path cannot contain '.' or '..' components",
            ));
        }
        Ok(Self(normalized))
    }

    /// The root folder `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Parent path, or `None` if this is the root.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        Some(VfsPath(parent_of(&self.0)))
    }

    /// Final component of the path, or `None` for root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Join a relative segment (which may itself contain `/`) onto this path.
    pub fn join(&self, segment: &str) -> Result<VfsPath> {
        if segment.starts_with('/') {
            return Err(Error::invalid_path(segment, "join segment must be relative"));
        }
        if self.is_root() {
            VfsPath::new(&format!("/{}", segment))
        } else {
            VfsPath::new(&format!("{}/{}", self.0, segment))
        }
    }

    /// True if this is a `.keep` folder marker.
    pub fn is_sentinel(&self) -> bool {
        self.file_name() == Some(SENTINEL_NAME)
    }

    /// Marker path for the folder at `self`.
    pub fn sentinel(&self) -> VfsPath {
        if self.is_root() {
            VfsPath(format!("/{}", SENTINEL_NAME))
        } else {
            VfsPath(format!("{}/{}", self.0, SENTINEL_NAME))
        }
    }

    /// True if `self` is strictly nested under `folder`.
    pub fn is_within(&self, folder: &VfsPath) -> bool {
        is_folder_prefix_of(&folder.0, &self.0)
    }

    /// Rewrite the `from` prefix of this path to `to`.
    ///
    /// Returns `None` unless `self` equals `from` or is nested under it.
    pub fn rebase(&self, from: &VfsPath, to: &VfsPath) -> Option<VfsPath> {
        if self == from {
            return Some(to.clone());
        }
        if !self.is_within(from) {
            return None;
        }
        let rest = if from.is_root() {
            &self.0[1..]
        } else {
            &self.0[from.0.len() + 1..]
        };
        to.join(rest).ok()
    }

    /// Split the file name into `(stem, extension)`.
    ///
    /// Dotfiles such as `.env` have no extension. Returns `("", None)` for root.
    pub fn stem_and_extension(&self) -> (&str, Option<&str>) {
        let name = self.file_name().unwrap_or("");
        match name.rfind('.') {
            Some(0) | None => (name, None),
            Some(pos) => (&name[..pos], Some(&name[pos + 1..])),
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for VfsPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        VfsPath::new(&value)
    }
}

impl From<VfsPath> for String {
    fn from(path: VfsPath) -> Self {
        path.0
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ensure a single leading `/`, collapse repeated slashes, strip the trailing
/// slash (except for root). Surrounding whitespace is trimmed.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Resolve an HTML reference (`href`/`src`) against the directory of `base`.
///
/// Follows URL-relative semantics: `./x`, `../x`, bare `x` and rooted `/x`.
/// Query strings and fragments are dropped. Fails closed: external URLs
/// (`http:`, `data:`, `//host`, ...), empty references, fragment-only
/// references and anything that climbs above the root yield `None`.
pub fn resolve_relative(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    let reference = reference
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    if reference.is_empty() || reference.starts_with("//") || has_scheme(reference) {
        return None;
    }

    let base_dir = parent_of(&normalize(base));
    let mut stack: Vec<&str> = if reference.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        return None;
    }
    Some(format!("/{}", stack.join("/")))
}

/// True iff `path` is strictly nested under `candidate_folder`.
pub fn is_folder_prefix_of(candidate_folder: &str, path: &str) -> bool {
    if candidate_folder == "/" {
        return path != "/" && path.starts_with('/');
    }
    path.len() > candidate_folder.len() + 1
        && path.starts_with(candidate_folder)
        && path.as_bytes()[candidate_folder.len()] == b'/'
}

/// All segments but the last, or `/` for top-level paths.
pub fn parent_of(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

/// `scheme:` prefix per RFC 3986 (letter followed by letters, digits, `+-.`).
fn has_scheme(reference: &str) -> bool {
    let Some(colon) = reference.find(':') else {
        return false;
    };
    let scheme = &reference[..colon];
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
