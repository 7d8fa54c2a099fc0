// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The static set of services the launcher starts, grouped into ordered tiers

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed infrastructure services, started first
const PLATFORM: &[&str] = &[
    "api",      // :8080
    "web",      // :8082
    "registry", // :8000
];

const EXTENSIONS: &[&str] = &[
    "proxy",
    "store",
    "settings",
    "phoenix",
    "graph",
    "graph-explorer",
    "ocs",
    "webdav",
    "storage-frontend",
    "storage-gateway",
    "storage-users",
    "storage-auth-basic",
    "storage-auth-bearer",
    "storage-storage-home",
    "storage-storage-home-data",
    "storage-storage-eos",
    "storage-storage-eos-data",
    "storage-storage-oc",
    "storage-storage-oc-data",
    "storage-storage-public-link",
    "storage-storage-metadata",
    "glauth",
    "konnectd",
    "thumbnails",
];

/// storage-sharing reads sharing.json before its parent folder is guaranteed to exist
const DEPENDENTS: &[&str] = &["accounts", "storage-sharing"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierKind {
    Platform,
    Extensions,
    Dependents,
}

impl TierKind {
    pub fn display(self) -> &'static str {
        match self {
            TierKind::Platform => "platform",
            TierKind::Extensions => "extensions",
            TierKind::Dependents => "dependents",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}

/// An ordered group of services, all started before the next tier begins
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    kind: TierKind,
    services: Vec<String>,
}

impl Tier {
    pub fn new<I, S>(kind: TierKind, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            services: services.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> TierKind {
        self.kind
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }
}

/// Immutable catalog of the three tiers.
///
/// Constructed once and handed to the launcher; nothing mutates it afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCatalog {
    platform: Tier,
    extensions: Tier,
    dependents: Tier,
}

impl ServiceCatalog {
    pub fn new<P, E, D, S>(platform: P, extensions: E, dependents: D) -> Self
    where
        P: IntoIterator<Item = S>,
        E: IntoIterator<Item = S>,
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            platform: Tier::new(TierKind::Platform, platform),
            extensions: Tier::new(TierKind::Extensions, extensions),
            dependents: Tier::new(TierKind::Dependents, dependents),
        }
    }

    pub fn platform(&self) -> &Tier {
        &self.platform
    }

    pub fn extensions(&self) -> &Tier {
        &self.extensions
    }

    pub fn dependents(&self) -> &Tier {
        &self.dependents
    }

    /// Tiers in start order
    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        vec![&self.platform, &self.extensions, &self.dependents].into_iter()
    }

    /// Total number of services across all tiers
    pub fn len(&self) -> usize {
        self.iter().map(Tier::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of this catalog with nothing in the dependents tier
    pub fn without_dependents(&self) -> Self {
        Self {
            platform: self.platform.clone(),
            extensions: self.extensions.clone(),
            dependents: Tier::new(TierKind::Dependents, Vec::<String>::new()),
        }
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new(
            PLATFORM.iter().copied(),
            EXTENSIONS.iter().copied(),
            DEPENDENTS.iter().copied(),
        )
    }
}

/// Everything the supervisor needs to launch one process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    name: String,
    args: Vec<String>,
    environment: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// Descriptor for `name` carrying a snapshot of this process's environment
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_environment(name, current_environment())
    }

    /// The args default to just the service name
    pub fn with_environment(name: impl Into<String>, environment: BTreeMap<String, String>) -> Self {
        let name = name.into();
        Self {
            args: vec![name.clone()],
            name,
            environment,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// The environment flattened to `KEY=VALUE` entries, sorted by key
    pub fn env_pairs(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

/// Snapshot of the live process environment, non-unicode entries are converted lossily
pub fn current_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("OCIS_LOG_LEVEL".to_string(), "debug".to_string());
        env.insert("HOME".to_string(), "/var/lib/ocis".to_string());
        env
    }

    #[test]
    fn test_default_catalog_order() {
        let catalog = ServiceCatalog::default();

        assert_eq!(catalog.platform().services(), &["api", "web", "registry"]);
        assert_eq!(catalog.extensions().len(), 24);
        assert_eq!(catalog.extensions().services()[0], "proxy");
        assert_eq!(catalog.extensions().services()[23], "thumbnails");
        assert_eq!(catalog.dependents().services(), &["accounts", "storage-sharing"]);
        assert_eq!(catalog.len(), 29);

        let kinds: Vec<TierKind> = catalog.iter().map(Tier::kind).collect();
        assert_eq!(
            kinds,
            vec![TierKind::Platform, TierKind::Extensions, TierKind::Dependents]
        );
    }

    #[test]
    fn test_without_dependents() {
        let catalog = ServiceCatalog::default().without_dependents();

        assert!(catalog.dependents().is_empty());
        assert_eq!(catalog.dependents().kind(), TierKind::Dependents);
        assert_eq!(catalog.platform(), ServiceCatalog::default().platform());
    }

    #[test]
    fn test_descriptor_defaults_args_to_name() {
        let descriptor = ServiceDescriptor::with_environment("proxy", env());

        assert_eq!(descriptor.name(), "proxy");
        assert_eq!(descriptor.args(), &["proxy"]);
    }

    #[test]
    fn test_descriptor_is_repeatable() {
        let catalog = ServiceCatalog::default();
        let entry = &catalog.extensions().services()[3];

        let first = ServiceDescriptor::with_environment(entry.as_str(), env());
        let second = ServiceDescriptor::with_environment(entry.as_str(), env());

        assert_eq!(first, second);
    }

    #[test]
    fn test_env_pairs_sorted() {
        let descriptor = ServiceDescriptor::with_environment("ocs", env());

        assert_eq!(
            descriptor.env_pairs(),
            vec!["HOME=/var/lib/ocis", "OCIS_LOG_LEVEL=debug"]
        );
    }

    #[test]
    fn test_new_snapshots_environment() {
        let descriptor = ServiceDescriptor::new("store");

        assert_eq!(descriptor.environment(), &current_environment());
    }
}
