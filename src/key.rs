//! Resource keys and key normalization.

use std::fmt;

/// Identifier of a cached resource.
///
/// Textures and buffers are keyed by a path or name. Shaders are keyed by the
/// full `(path, entry point, profile)` tuple, so two entry points compiled
/// from one file are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Name(String),
    Shader {
        path: String,
        entry_point: String,
        profile: String,
    },
}

impl ResourceKey {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn shader(
        path: impl Into<String>,
        entry_point: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self::Shader {
            path: path.into(),
            entry_point: entry_point.into(),
            profile: profile.into(),
        }
    }

    /// The path or name component of the key.
    pub fn path(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Shader { path, .. } => path,
        }
    }

    /// Apply a normalization policy to the path component.
    ///
    /// Entry point and profile are never rewritten.
    pub fn normalized(self, policy: KeyPolicy) -> Self {
        match self {
            Self::Name(name) => Self::Name(policy.normalize(&name)),
            Self::Shader {
                path,
                entry_point,
                profile,
            } => Self::Shader {
                path: policy.normalize(&path),
                entry_point,
                profile,
            },
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Shader {
                path,
                entry_point,
                profile,
            } => write!(f, "{path}[{entry_point}@{profile}]"),
        }
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&ShaderKey> for ResourceKey {
    fn from(key: &ShaderKey) -> Self {
        Self::shader(&key.path, &key.entry_point, &key.profile)
    }
}

impl From<ShaderKey> for ResourceKey {
    fn from(key: ShaderKey) -> Self {
        Self::Shader {
            path: key.path,
            entry_point: key.entry_point,
            profile: key.profile,
        }
    }
}

/// Shader source location plus compilation target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub path: String,
    pub entry_point: String,
    pub profile: String,
}

impl ShaderKey {
    pub fn new(
        path: impl Into<String>,
        entry_point: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            entry_point: entry_point.into(),
            profile: profile.into(),
        }
    }
}

/// How caller-supplied paths and names are rewritten before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Use the string exactly as given.
    Exact,
    /// Unify separators to `/`, drop empty and `.` segments and fold `..`.
    /// Case is preserved.
    #[default]
    Path,
    /// [`KeyPolicy::Path`] followed by ASCII lowercasing.
    PathIgnoreCase,
}

impl KeyPolicy {
    pub fn normalize(self, raw: &str) -> String {
        match self {
            KeyPolicy::Exact => raw.to_string(),
            KeyPolicy::Path => normalize_path(raw),
            KeyPolicy::PathIgnoreCase => normalize_path(raw).to_ascii_lowercase(),
        }
    }
}

fn normalize_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // `/..` stays at the root
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}
