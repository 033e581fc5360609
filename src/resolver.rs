//! Stack identity resolution.
//!
//! Decides which configuration an invocation runs with before any backend
//! call is made. A named profile that cannot be found is an error; there is
//! no fallback to the default configuration.

use std::fmt;

use tracing::{debug, info};

use crate::config::{ConfigSource, Configuration};
use crate::error::{ConfigError, Result};

/// Where a resolved configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOrigin {
    /// The default configuration.
    Default,
    /// A named profile given on the command line.
    Named(String),
}

impl fmt::Display for ProfileOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default configuration"),
            Self::Named(name) => write!(f, "profile {name}"),
        }
    }
}

/// Configuration resolved for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStack {
    /// Configuration in effect.
    pub config: Configuration,
    /// Where it came from.
    pub origin: ProfileOrigin,
}

impl ResolvedStack {
    /// Returns the target stack name.
    #[must_use]
    pub fn stack_name(&self) -> &str {
        self.config.stack_name()
    }
}

/// Resolves the configuration profile for an invocation.
#[derive(Debug)]
pub struct StackResolver<'a, S: ConfigSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: ConfigSource + ?Sized> StackResolver<'a, S> {
    /// Creates a resolver over a configuration source.
    #[must_use]
    pub const fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Resolves the configuration for an optional profile argument.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProfileNotFound`] if `profile` names a profile
    /// that does not exist, or the source's error if loading fails.
    pub fn resolve(&self, profile: Option<&str>) -> Result<ResolvedStack> {
        let resolved = match profile {
            None => ResolvedStack {
                config: self.source.load_default()?,
                origin: ProfileOrigin::Default,
            },
            Some(name) => {
                debug!("Looking up profile {name}");
                let config = self
                    .source
                    .load_named(name)?
                    .ok_or_else(|| ConfigError::ProfileNotFound {
                        name: name.to_string(),
                    })?;
                ResolvedStack {
                    config,
                    origin: ProfileOrigin::Named(name.to_string()),
                }
            }
        };

        info!(
            "Using stack {} from {}",
            resolved.stack_name(),
            resolved.origin
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigSource;
    use crate::error::KilnError;

    fn source() -> MemoryConfigSource {
        MemoryConfigSource::new(Configuration::new("DefaultStack", "stack.yaml"))
            .with_profile("teststack", Configuration::new("MyStack", "stack.yaml"))
    }

    #[test]
    fn test_default_without_argument() {
        let source = source();
        let resolved = StackResolver::new(&source).resolve(None).expect("resolve failed");
        assert_eq!(resolved.stack_name(), "DefaultStack");
        assert_eq!(resolved.origin, ProfileOrigin::Default);
    }

    #[test]
    fn test_named_profile() {
        let source = source();
        let resolved = StackResolver::new(&source)
            .resolve(Some("teststack"))
            .expect("resolve failed");
        assert_eq!(resolved.stack_name(), "MyStack");
        assert_eq!(resolved.origin, ProfileOrigin::Named(String::from("teststack")));
    }

    #[test]
    fn test_missing_profile_does_not_fall_back() {
        let source = source();
        let err = StackResolver::new(&source)
            .resolve(Some("notfound"))
            .unwrap_err();
        assert!(matches!(
            err,
            KilnError::Config(ConfigError::ProfileNotFound { ref name }) if name == "notfound"
        ));
    }
}
