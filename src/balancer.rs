use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::resolver::{Address, ResolverState, StateSink};

/// Round-robin address picker fed by a resolver.
///
/// The `i`-th pick after a state update returns `addresses[i % len]`.
#[derive(Debug)]
pub struct RoundRobin {
    target: String,
    addresses: RwLock<Vec<Address>>,
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            addresses: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Picks the next address, failing fast when the set is empty.
    pub fn pick(&self) -> Result<Address> {
        let addresses = self
            .addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        if addresses.is_empty() {
            return Err(Error::NoAvailableEndpoint(self.target.clone()));
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % addresses.len();
        let picked = addresses[idx].clone();
        log::debug!("picked {} for {}", picked, self.target);
        Ok(picked)
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateSink for RoundRobin {
    fn update_state(&self, state: ResolverState) {
        let mut addresses = self
            .addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        log::debug!(
            "{}: address set updated to {:?}",
            self.target,
            state.addresses
        );
        *addresses = state.addresses;
        self.cursor.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn balancer_with(addrs: &[&str]) -> RoundRobin {
        let rr = RoundRobin::new("test:///svc");
        rr.update_state(ResolverState {
            addresses: addrs.iter().copied().map(Address::from).collect(),
        });
        rr
    }

    #[test]
    fn picks_cycle_in_resolver_order() {
        let addrs = ["a:1", "b:2", "c:3"];
        let rr = balancer_with(&addrs);

        for i in 0..10 {
            assert_eq!(rr.pick().unwrap().as_str(), addrs[i % addrs.len()]);
        }
    }

    #[test]
    fn picks_are_evenly_spread() {
        let rr = balancer_with(&["a:1", "b:2", "c:3"]);
        let n = 11;

        let mut counts: HashMap<Address, usize> = HashMap::new();
        for _ in 0..n {
            *counts.entry(rr.pick().unwrap()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert!(*count == n / 3 || *count == n / 3 + 1, "{counts:?}");
        }
    }

    #[test]
    fn empty_set_fails_fast() {
        let rr = RoundRobin::new("example:///nope");
        assert!(matches!(
            rr.pick(),
            Err(Error::NoAvailableEndpoint(t)) if t == "example:///nope"
        ));

        let rr = balancer_with(&[]);
        assert!(rr.pick().is_err());
    }

    #[test]
    fn update_restarts_rotation() {
        let rr = balancer_with(&["a:1", "b:2"]);
        rr.pick().unwrap();

        rr.update_state(ResolverState {
            addresses: vec![Address::from("x:9"), Address::from("y:8")],
        });
        assert_eq!(rr.pick().unwrap().as_str(), "x:9");
        assert_eq!(rr.pick().unwrap().as_str(), "y:8");
        assert_eq!(rr.addresses().len(), 2);
    }
}
