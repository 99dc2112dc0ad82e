//! Name resolution: turning a symbolic [`Target`] into a list of addresses.
//!
//! A [`ResolverBuilder`] is registered per scheme. Building a resolver for a
//! target performs the first resolution synchronously and pushes the result
//! into a [`StateSink`] (normally the balancer).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{EXAMPLE_ADDRS, EXAMPLE_SERVICE, PASSTHROUGH_SCHEME};
use crate::error::{Error, Result};

/// A network location, `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for Address {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// A parsed dial target.
///
/// `scheme://authority/endpoint` and `scheme:///endpoint` name a symbolic
/// endpoint group. Anything without `://` is a literal address and uses the
/// passthrough scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub authority: String,
    pub endpoint: String,
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTarget(s.to_owned());

        let Some((scheme, rest)) = s.split_once("://") else {
            if s.is_empty() {
                return Err(invalid());
            }
            return Ok(Target {
                scheme: PASSTHROUGH_SCHEME.to_owned(),
                authority: String::new(),
                endpoint: s.to_owned(),
            });
        };

        let (authority, endpoint) = rest.split_once('/').ok_or_else(invalid)?;
        if scheme.is_empty() || endpoint.is_empty() {
            return Err(invalid());
        }

        Ok(Target {
            scheme: scheme.to_owned(),
            authority: authority.to_owned(),
            endpoint: endpoint.to_owned(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme == PASSTHROUGH_SCHEME && self.authority.is_empty() {
            return f.write_str(&self.endpoint);
        }
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.endpoint)
    }
}

/// The resolved addresses for one target, in resolver order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverState {
    pub addresses: Vec<Address>,
}

/// Receives resolver state updates.
pub trait StateSink: Send + Sync {
    fn update_state(&self, state: ResolverState);
}

/// A live resolver bound to one target.
pub trait Resolver: Send + Sync {
    /// Ask for a fresh resolution.
    fn resolve_now(&self);

    /// Stop any background resolution.
    fn close(&self);
}

pub trait ResolverBuilder: Send + Sync {
    fn scheme(&self) -> &str;

    fn build(&self, target: &Target, sink: Arc<dyn StateSink>) -> Result<Box<dyn Resolver>>;
}

/// Symbolic name to address table backing a [`StaticResolverBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticTable {
    entries: HashMap<String, Vec<Address>>,
}

impl StaticTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `example` -> `localhost:50051`, `localhost:50052`.
    pub fn example() -> Self {
        Self::new().with_entry(EXAMPLE_SERVICE, EXAMPLE_ADDRS.iter().copied())
    }

    pub fn with_entry<I, A>(mut self, key: impl Into<String>, addrs: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.entries
            .insert(key.into(), addrs.into_iter().map(Into::into).collect());
        self
    }

    /// Addresses for `key`, empty when the key is unknown.
    pub fn lookup(&self, key: &str) -> Vec<Address> {
        self.entries.get(key).cloned().unwrap_or_default()
    }
}

pub struct StaticResolverBuilder {
    scheme: String,
    table: Arc<StaticTable>,
}

impl StaticResolverBuilder {
    pub fn new(scheme: impl Into<String>, table: StaticTable) -> Self {
        Self {
            scheme: scheme.into(),
            table: Arc::new(table),
        }
    }
}

impl ResolverBuilder for StaticResolverBuilder {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn build(&self, target: &Target, sink: Arc<dyn StateSink>) -> Result<Box<dyn Resolver>> {
        let addresses = self.table.lookup(&target.endpoint);
        log::debug!(
            "resolved {} to {} address(es): {:?}",
            target,
            addresses.len(),
            addresses
        );
        sink.update_state(ResolverState { addresses });

        Ok(Box::new(StaticResolver {
            target: target.clone(),
        }))
    }
}

struct StaticResolver {
    target: Target,
}

impl Resolver for StaticResolver {
    fn resolve_now(&self) {
        log::trace!("resolve_now on static target {}", self.target);
    }

    fn close(&self) {}
}

/// Resolves a literal address to itself.
#[derive(Debug, Default)]
pub struct PassthroughResolverBuilder;

impl ResolverBuilder for PassthroughResolverBuilder {
    fn scheme(&self) -> &str {
        PASSTHROUGH_SCHEME
    }

    fn build(&self, target: &Target, sink: Arc<dyn StateSink>) -> Result<Box<dyn Resolver>> {
        sink.update_state(ResolverState {
            addresses: vec![Address::new(target.endpoint.clone())],
        });
        Ok(Box::new(PassthroughResolver))
    }
}

struct PassthroughResolver;

impl Resolver for PassthroughResolver {
    fn resolve_now(&self) {}

    fn close(&self) {}
}

/// Resolver builders keyed by scheme. Always knows `passthrough`.
#[derive(Clone)]
pub struct ResolverRegistry {
    builders: HashMap<String, Arc<dyn ResolverBuilder>>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        let mut registry = Self {
            builders: HashMap::new(),
        };
        registry.register(PassthroughResolverBuilder);
        registry
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder`, replacing any builder for the same scheme.
    pub fn register(&mut self, builder: impl ResolverBuilder + 'static) {
        self.builders
            .insert(builder.scheme().to_owned(), Arc::new(builder));
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.builders.get(scheme).cloned()
    }

    pub fn build(&self, target: &Target, sink: Arc<dyn StateSink>) -> Result<Box<dyn Resolver>> {
        let builder = self
            .get(&target.scheme)
            .ok_or_else(|| Error::UnknownScheme(target.scheme.clone()))?;
        builder.build(target, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ResolverState>>);

    impl StateSink for Recorder {
        fn update_state(&self, state: ResolverState) {
            self.0.lock().unwrap().push(state);
        }
    }

    fn addrs(list: &[&str]) -> Vec<Address> {
        list.iter().copied().map(Address::from).collect()
    }

    #[test]
    fn parse_symbolic_target() {
        let target: Target = "example:///example".parse().unwrap();
        assert_eq!(target.scheme, "example");
        assert_eq!(target.authority, "");
        assert_eq!(target.endpoint, "example");
        assert_eq!(target.to_string(), "example:///example");

        let target: Target = "dns://8.8.8.8/foo.bar:443".parse().unwrap();
        assert_eq!(target.scheme, "dns");
        assert_eq!(target.authority, "8.8.8.8");
        assert_eq!(target.endpoint, "foo.bar:443");
    }

    #[test]
    fn parse_literal_target_as_passthrough() {
        let target: Target = "localhost:50051".parse().unwrap();
        assert_eq!(target.scheme, PASSTHROUGH_SCHEME);
        assert_eq!(target.endpoint, "localhost:50051");
        assert_eq!(target.to_string(), "localhost:50051");
    }

    #[test]
    fn parse_rejects_malformed_targets() {
        for bad in ["", "example://", "example://authority", "://x/y"] {
            assert!(
                matches!(bad.parse::<Target>(), Err(Error::InvalidTarget(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn example_target_resolves_to_both_addresses_in_order() {
        let sink = Arc::new(Recorder::default());
        let builder = StaticResolverBuilder::new("example", StaticTable::example());
        let target = "example:///example".parse().unwrap();

        let resolver = builder.build(&target, sink.clone()).unwrap();
        resolver.resolve_now();
        resolver.close();

        let pushed = sink.0.lock().unwrap();
        assert_eq!(pushed.len(), 1, "exactly one push at build time");
        assert_eq!(
            pushed[0].addresses,
            addrs(&["localhost:50051", "localhost:50052"])
        );
    }

    #[test]
    fn unknown_name_resolves_to_empty_set() {
        let sink = Arc::new(Recorder::default());
        let builder = StaticResolverBuilder::new("example", StaticTable::example());
        let target = "example:///nope".parse().unwrap();

        builder.build(&target, sink.clone()).unwrap();

        let pushed = sink.0.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert!(pushed[0].addresses.is_empty());
    }

    #[test]
    fn independent_tables_do_not_interfere() {
        let table_a = StaticTable::new().with_entry("svc", ["10.0.0.1:1"]);
        let table_b = StaticTable::new().with_entry("svc", ["10.0.0.2:2"]);
        let a = StaticResolverBuilder::new("a", table_a);
        let b = StaticResolverBuilder::new("b", table_b);

        let sink_a = Arc::new(Recorder::default());
        let sink_b = Arc::new(Recorder::default());
        a.build(&"a:///svc".parse().unwrap(), sink_a.clone()).unwrap();
        b.build(&"b:///svc".parse().unwrap(), sink_b.clone()).unwrap();

        assert_eq!(sink_a.0.lock().unwrap()[0].addresses, addrs(&["10.0.0.1:1"]));
        assert_eq!(sink_b.0.lock().unwrap()[0].addresses, addrs(&["10.0.0.2:2"]));
    }

    #[test]
    fn registry_routes_by_scheme() {
        let mut registry = ResolverRegistry::new();
        registry.register(StaticResolverBuilder::new("example", StaticTable::example()));

        let sink = Arc::new(Recorder::default());
        registry
            .build(&"127.0.0.1:9".parse().unwrap(), sink.clone())
            .unwrap();
        assert_eq!(sink.0.lock().unwrap()[0].addresses, addrs(&["127.0.0.1:9"]));

        let err = registry
            .build(&"dns:///example".parse().unwrap(), sink)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownScheme(scheme) if scheme == "dns"));
    }

    #[test]
    fn static_table_deserializes_from_json() {
        let table: StaticTable =
            serde_json::from_str(r#"{"svc": ["h1:1", "h2:2"]}"#).unwrap();
        assert_eq!(table.lookup("svc"), addrs(&["h1:1", "h2:2"]));
        assert!(table.lookup("other").is_empty());
    }
}
