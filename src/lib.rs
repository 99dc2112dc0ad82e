//! A greeter service and client with pluggable name resolution and
//! round-robin load balancing.
//!
//! A symbolic target such as `example:///example` is handed to a
//! [`resolver::ResolverBuilder`] for its scheme. The resolver pushes the
//! resolved addresses into a [`balancer::RoundRobin`], and the
//! [`client::GreeterClient`] asks the balancer for one address per call.

pub mod proto {
    tonic::include_proto!("helloworld");
}

pub mod balancer;
pub mod client;
pub mod config;
pub mod constants;
pub mod details;
pub mod error;
pub mod interceptor;
pub mod metadata;
pub mod resolver;
pub mod server;

pub use error::{Error, Result};
