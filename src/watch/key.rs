//! Subscription identity.

use std::fmt;

/// Identity of a watch subscription. Unique per active watcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// A service-instance list, identified by service name.
    Service { name: String },
    /// A configuration file, identified by file, group and namespace.
    Config {
        file: String,
        group: String,
        namespace: String,
    },
}

impl WatchKey {
    pub fn service(name: impl Into<String>) -> Self {
        WatchKey::Service { name: name.into() }
    }

    pub fn config(
        file: impl Into<String>,
        group: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        WatchKey::Config {
            file: file.into(),
            group: group.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchKey::Service { name } => write!(f, "service/{}", name),
            WatchKey::Config {
                file,
                group,
                namespace,
            } => write!(f, "config/{}/{}:{}", namespace, file, group),
        }
    }
}
