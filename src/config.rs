use std::path::PathBuf;
use std::time::Duration;

use crate::compiler::CompileFlags;
use crate::key::KeyPolicy;

/// Configuration for a [`ResourceCache`](crate::ResourceCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How caller-supplied paths are normalized into keys
    pub key_policy: KeyPolicy,
    /// Root directory for the default file system source
    pub asset_root: PathBuf,
    /// Flags passed to the shader compiler
    pub compile_flags: CompileFlags,
    /// How long a caller waits on another caller's in-flight load.
    /// `None` waits until the load finishes.
    pub load_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_policy: KeyPolicy::Path,
            asset_root: PathBuf::from("assets"),
            compile_flags: CompileFlags::default(),
            load_timeout: None,
        }
    }
}

impl CacheConfig {
    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn with_compile_flags(mut self, flags: CompileFlags) -> Self {
        self.compile_flags = flags;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.key_policy, KeyPolicy::Path);
        assert_eq!(config.load_timeout, None);
        assert!(config.compile_flags.contains(CompileFlags::DEBUG));
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default()
            .with_key_policy(KeyPolicy::Exact)
            .with_asset_root("/data")
            .with_load_timeout(Duration::from_millis(250));
        assert_eq!(config.key_policy, KeyPolicy::Exact);
        assert_eq!(config.asset_root, PathBuf::from("/data"));
        assert_eq!(config.load_timeout, Some(Duration::from_millis(250)));
    }
}
