// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be
// copied and pasted across crates, but there doesn't appear to be a way to include inner
// attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

//! Canonical resource identity: the `(API, Remote-path, LocalName)` triple described in
//! the resource manager's data model, plus the `Model` identifier distinguishing driver
//! implementations.

use std::fmt;

/// The namespace a resource's [`Api`] belongs to.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Namespace {
    Rdk,
    RdkInternal,
    UserDefined(String),
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Rdk => write!(f, "rdk"),
            Namespace::RdkInternal => write!(f, "rdk-internal"),
            Namespace::UserDefined(s) => write!(f, "{s}"),
        }
    }
}

/// The broad kind of resource an [`Api`] describes.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ResourceKind {
    Component,
    Service,
    Remote,
    Other(String),
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Component => write!(f, "component"),
            ResourceKind::Service => write!(f, "service"),
            ResourceKind::Remote => write!(f, "remote"),
            ResourceKind::Other(s) => write!(f, "{s}"),
        }
    }
}

/// `(Namespace, ResourceKind, Subtype)`: the contract a resource implements.
///
/// Equality is structural: two `Api` values are the same API iff all three fields match.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Api {
    pub namespace: Namespace,
    pub kind: ResourceKind,
    pub subtype: String,
}

impl Api {
    pub fn new(namespace: Namespace, kind: ResourceKind, subtype: impl Into<String>) -> Self {
        Api {
            namespace,
            kind,
            subtype: subtype.into(),
        }
    }

    /// Shorthand for an `rdk`-namespaced component API, e.g. `Api::component("arm")`.
    pub fn component(subtype: impl Into<String>) -> Self {
        Api::new(Namespace::Rdk, ResourceKind::Component, subtype)
    }

    /// Shorthand for an `rdk`-namespaced service API, e.g. `Api::service("motion")`.
    pub fn service(subtype: impl Into<String>) -> Self {
        Api::new(Namespace::Rdk, ResourceKind::Service, subtype)
    }

    /// The `remote` pseudo-API used for remote-node entries in the graph.
    pub fn remote() -> Self {
        Api::new(Namespace::RdkInternal, ResourceKind::Remote, "remote")
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.kind, self.subtype)
    }
}

/// A qualified driver-implementation identifier. Two sentinel models exist: [`Model::builtin`]
/// for natively constructed resources, and [`Model::unknown`] for resources discovered through
/// a remote whose concrete model is opaque to the local process.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Model {
    pub family: String,
    pub name: String,
}

impl Model {
    pub fn new(family: impl Into<String>, name: impl Into<String>) -> Self {
        Model {
            family: family.into(),
            name: name.into(),
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Model::new("builtin", name)
    }

    pub fn unknown() -> Self {
        Model::new("rdk", "unknown")
    }

    pub fn is_unknown(&self) -> bool {
        self.family == "rdk" && self.name == "unknown"
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.name)
    }
}

/// An ordered list of remote hops. `RemotePath::empty()` identifies a locally-defined resource;
/// a non-empty path identifies a resource grafted in from one or more remote robots, read
/// outermost-first (the hop closest to this process comes first).
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RemotePath(Vec<String>);

impl RemotePath {
    pub fn empty() -> Self {
        RemotePath(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hops(&self) -> &[String] {
        &self.0
    }

    pub fn from_hops(hops: impl IntoIterator<Item = String>) -> Self {
        RemotePath(hops.into_iter().collect())
    }

    /// Prepends a hop, used when a remote's own remote subtree is grafted under this remote's
    /// node: the new hop becomes the outermost (closest) one.
    pub fn prepended(&self, hop: &str) -> Self {
        let mut v = Vec::with_capacity(self.0.len() + 1);
        v.push(hop.to_owned());
        v.extend(self.0.iter().cloned());
        RemotePath(v)
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hop in &self.0 {
            write!(f, "{hop}:")?;
        }
        Ok(())
    }
}

/// A fully-qualified resource identity: `(API, Remote-path, LocalName)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Name {
    pub api: Api,
    pub remote_path: RemotePath,
    pub local_name: String,
}

impl Name {
    pub fn new(api: Api, local_name: impl Into<String>) -> Self {
        Name {
            api,
            remote_path: RemotePath::empty(),
            local_name: local_name.into(),
        }
    }

    pub fn with_remote_path(api: Api, remote_path: RemotePath, local_name: impl Into<String>) -> Self {
        Name {
            api,
            remote_path,
            local_name: local_name.into(),
        }
    }

    /// `Prepend(r, n)`: produces a fully qualified remote-scoped name by prefixing `remote`
    /// onto this name's remote path. Used when grafting a remote's resources (or a remote's own
    /// remotes, for transitive remoting) under a local remote-node.
    pub fn prepend_remote(&self, remote: &str) -> Name {
        Name {
            api: self.api.clone(),
            remote_path: self.remote_path.prepended(remote),
            local_name: self.local_name.clone(),
        }
    }

    pub fn is_remote_origin(&self) -> bool {
        !self.remote_path.is_empty()
    }

    /// The fully qualified colon-joined string form, e.g. `r1:r2:myArm`. Does not include the
    /// API: dependency references and `ResourceByName` queries are path + local name only.
    pub fn qualified_string(&self) -> String {
        format!("{}{}", self.remote_path, self.local_name)
    }

    /// A short disambiguation string of the form `subtype:localName`, e.g. `arm:a`, used when
    /// presenting a partial-match clash to a caller.
    pub fn short_api_string(&self) -> String {
        format!("{}:{}", self.api.subtype, self.local_name)
    }

    /// Returns true if this name matches an unqualified query string, ignoring remote path.
    /// The query may be a bare local name (`a`) or a `subtype:localName` shorthand (`arm:a`);
    /// matching on the subtype shorthand lets a clash be reported and re-resolved using the
    /// same string a human would type back in.
    pub fn matches_short_query(&self, query: &str) -> bool {
        let parts: Vec<&str> = query.split(':').collect();
        match parts.as_slice() {
            [local] => *local == self.local_name,
            [subtype, local] => *subtype == self.api.subtype && *local == self.local_name,
            _ => false,
        }
    }

    /// Returns true if this name matches a fully (or partially remote-) qualified query of the
    /// form `hop1:hop2:...:localName` or `hop1:...:subtype:localName`.
    pub fn matches_qualified_query(&self, query: &str) -> bool {
        let parts: Vec<&str> = query.split(':').collect();
        if parts.is_empty() {
            return false;
        }
        let (prefix, rest) = parts.split_at(parts.len() - 1);
        let local = rest[0];
        let (hops, local_ok) = if local == self.local_name {
            (prefix, true)
        } else {
            (prefix, false)
        };
        if local_ok && hops == self.remote_path.hops() {
            return true;
        }
        // Try `...:subtype:localName`.
        if let Some((last_hop_or_subtype, hops2)) = prefix.split_last() {
            if *last_hop_or_subtype == self.api.subtype
                && local == self.local_name
                && hops2 == self.remote_path.hops()
            {
                return true;
            }
        }
        false
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_builds_outermost_first() {
        let n = Name::new(Api::component("arm"), "a");
        let once = n.prepend_remote("r1");
        assert_eq!(once.remote_path.hops(), &["r1".to_owned()]);
        let twice = once.prepend_remote("r0");
        assert_eq!(twice.remote_path.hops(), &["r0".to_owned(), "r1".to_owned()]);
        assert_eq!(twice.qualified_string(), "r0:r1:a");
    }

    #[test]
    fn short_query_matches_bare_and_subtype_qualified() {
        let n = Name::new(Api::component("arm"), "a");
        assert!(n.matches_short_query("a"));
        assert!(n.matches_short_query("arm:a"));
        assert!(!n.matches_short_query("camera:a"));
        assert!(!n.matches_short_query("b"));
    }

    #[test]
    fn qualified_query_matches_remote_prefixed_names() {
        let n = Name::new(Api::component("arm"), "a").prepend_remote("r1");
        assert!(n.matches_qualified_query("r1:a"));
        assert!(n.matches_qualified_query("r1:arm:a"));
        assert!(!n.matches_qualified_query("r2:a"));
        assert!(!n.matches_qualified_query("a"));
    }

    #[test]
    fn model_sentinels() {
        assert!(Model::unknown().is_unknown());
        assert!(!Model::builtin("fake_arm").is_unknown());
    }

    #[test]
    fn equality_is_structural() {
        let a = Name::new(Api::component("arm"), "a");
        let b = Name::new(Api::component("arm"), "a");
        assert_eq!(a, b);
        let c = Name::new(Api::service("arm"), "a");
        assert_ne!(a, c);
    }
}
