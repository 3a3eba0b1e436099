//! File-system paths with platform-neutral syntax.
//!
//! Paths are kept as normalized UTF-8 strings: backslashes become forward
//! slashes and runs of separators collapse to one, so equality is purely
//! syntactic. Conversion to the OS representation happens only at the
//! filesystem boundary via [`Path::to_std`].

use std::fmt;
use std::path::PathBuf;

use bincode::{Decode, Encode};

/// Which suffix an extension query returns for names with several dots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionMode {
    /// Only the suffix after the final dot ("gz" for "archive.tar.gz").
    Last,
    /// Everything after the first dot of the file name ("tar.gz").
    All,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Path {
    path: String,
}

impl Path {
    pub fn new(path: &str) -> Self {
        let mut normalized = String::with_capacity(path.len());
        let mut prev_sep = false;
        for c in path.chars() {
            let sep = c == '/' || c == '\\';
            if sep {
                if !prev_sep {
                    normalized.push('/');
                }
            } else {
                normalized.push(c);
            }
            prev_sep = sep;
        }
        Self { path: normalized }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// The normalized textual form of the path.
    pub fn native(&self) -> &str {
        &self.path
    }

    pub fn to_std(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    pub fn is_relative(&self) -> bool {
        !self.path.is_empty() && !self.is_absolute()
    }

    /// True if the file name starts with a dot.
    pub fn is_hidden(&self) -> bool {
        self.file_name().path.starts_with('.')
    }

    /// Path of the parent directory, keeping the trailing separator.
    /// The parent of "/" and of a bare file name is the empty path.
    pub fn parent_path(&self) -> Self {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => Self {
                path: trimmed[..=idx].to_string(),
            },
            None => Self::empty(),
        }
    }

    /// The last component of the path, ignoring a trailing separator.
    pub fn file_name(&self) -> Self {
        let trimmed = self.path.trim_end_matches('/');
        let start = trimmed.rfind('/').map_or(0, |idx| idx + 1);
        Self {
            path: trimmed[start..].to_string(),
        }
    }

    /// Extension of the file name, without the leading dot. Hidden files
    /// and names without a dot have no extension.
    pub fn extension(&self, mode: ExtensionMode) -> Self {
        let name = self.file_name();
        let name = name.path.as_str();
        if name.is_empty() || name == "." || name == ".." {
            return Self::empty();
        }
        let dot = match mode {
            ExtensionMode::All => name[1..].find('.').map(|idx| idx + 1),
            ExtensionMode::Last => name[1..].rfind('.').map(|idx| idx + 1),
        };
        match dot {
            Some(idx) if idx + 1 < name.len() => Self {
                path: name[idx + 1..].to_string(),
            },
            _ => Self::empty(),
        }
    }

    /// Replaces the current extension (in [`ExtensionMode::All`] sense)
    /// with the given one. Paths without a file name, hidden files and the
    /// special dirs are returned unchanged.
    pub fn replace_extension(&self, new_extension: &str) -> Self {
        let name = self.file_name();
        if name.is_empty() || name.path == "." || name.path == ".." {
            return self.clone();
        }
        let parent = self.parent_path();
        let stem = match name.path[1..].find('.') {
            Some(idx) => &name.path[..=idx],
            None => name.path.as_str(),
        };
        Self {
            path: format!("{}{}.{}", parent.path, stem, new_extension),
        }
    }

    /// Removes the extension (in [`ExtensionMode::All`] sense), if any.
    pub fn remove_extension(&self) -> Self {
        let name = self.file_name();
        if name.is_empty() || name.path == "." || name.path == ".." {
            return self.clone();
        }
        let parent = self.parent_path();
        let stem = match name.path[1..].find('.') {
            Some(idx) => &name.path[..idx + 1],
            None => name.path.as_str(),
        };
        Self {
            path: format!("{}{}", parent.path, stem),
        }
    }

    /// Collapses "." and ".." components. A ".." at the beginning is
    /// dropped. When the final component of the input is a special dir,
    /// the result keeps a trailing separator ("/usr/lib/.." collapses to
    /// "/usr/").
    pub fn remove_special_dirs(&self) -> Self {
        let absolute = self.is_absolute();
        let mut components: Vec<&str> = Vec::new();
        for part in self.path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    components.pop();
                }
                other => components.push(other),
            }
        }

        let last = self.path.split('/').next_back().unwrap_or("");
        let keep_trailing =
            (last == "." || last == ".." || last.is_empty()) && !components.is_empty();

        let mut result = String::new();
        if absolute {
            result.push('/');
        }
        result.push_str(&components.join("/"));
        if keep_trailing && !result.ends_with('/') {
            result.push('/');
        }
        Self { path: result }
    }

    /// Current working directory of the process.
    pub fn current_path() -> Self {
        match std::env::current_dir() {
            Ok(dir) => {
                let mut path = Self::new(&dir.to_string_lossy());
                if !path.path.ends_with('/') {
                    path.path.push('/');
                }
                path
            }
            Err(_) => Self::empty(),
        }
    }

    /// Resolves the path against the working directory and collapses
    /// special dirs.
    pub fn make_absolute(&self) -> Self {
        if self.is_empty() || self.is_absolute() {
            return self.clone();
        }
        (Self::current_path() / self.clone()).remove_special_dirs()
    }

    pub fn join(&self, other: &Path) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut path = self.path.clone();
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(other.path.trim_start_matches('/'));
        Self { path }
    }
}

impl std::ops::Div for Path {
    type Output = Path;

    fn div(self, other: Path) -> Path {
        self.join(&other)
    }
}

impl std::ops::Div<&str> for Path {
    type Output = Path;

    fn div(self, other: &str) -> Path {
        self.join(&Path::new(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
