//! Greeter client routed through a resolver and a round-robin balancer.
//!
//! Every optional feature is a builder option:
//!
//! ```ignore
//! let client = GreeterClientBuilder::new("example:///example")
//!     .with_resolver(StaticResolverBuilder::new("example", StaticTable::example()))
//!     .with_transport_security(ClientTls::from_pem_file("server.crt".as_ref(), None)?)
//!     .with_interceptor(log_outgoing)
//!     .build()?;
//!
//! let outcome = client
//!     .say_hello("World", CallOptions::new().with_metadata(metadata::timestamp()))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Response, Status};

use crate::balancer::RoundRobin;
use crate::config::ClientConfig;
use crate::constants::CONNECT_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::interceptor::{log_outgoing, InterceptorChain};
use crate::metadata::Metadata;
use crate::proto::greeter_client::GreeterClient as RawGreeterClient;
use crate::proto::{HelloReply, HelloRequest};
use crate::resolver::{
    Address, Resolver, ResolverBuilder, ResolverRegistry, StaticResolverBuilder, Target,
};

/// Server verification for TLS connections. No client certificate is sent.
#[derive(Debug, Clone)]
pub struct ClientTls {
    ca_pem: Vec<u8>,
    domain: Option<String>,
}

impl ClientTls {
    pub fn from_pem(ca_pem: impl Into<Vec<u8>>, domain: Option<String>) -> Self {
        Self {
            ca_pem: ca_pem.into(),
            domain,
        }
    }

    pub fn from_pem_file(path: &Path, domain: Option<String>) -> Result<Self> {
        Ok(Self::from_pem(std::fs::read(path)?, domain))
    }

    fn config(&self) -> ClientTlsConfig {
        let config = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(&self.ca_pem));
        match &self.domain {
            Some(domain) => config.domain_name(domain.clone()),
            None => config,
        }
    }
}

pub struct GreeterClientBuilder {
    target: String,
    tls: Option<ClientTls>,
    interceptors: InterceptorChain,
    resolvers: ResolverRegistry,
    connect_timeout: Duration,
}

impl GreeterClientBuilder {
    /// `target` is either a literal `host:port` or `scheme:///name`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tls: None,
            interceptors: InterceptorChain::new(),
            resolvers: ResolverRegistry::new(),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
        }
    }

    /// Builder for the client binary: the configured static table is
    /// registered under `cfg.scheme`, plus TLS and call logging if enabled.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        let mut builder = Self::new(&cfg.target)
            .with_resolver(StaticResolverBuilder::new(
                &cfg.scheme,
                cfg.resolver_table.clone(),
            ))
            .with_connect_timeout(cfg.connect_timeout());

        if let Some(tls) = &cfg.tls {
            let tls = ClientTls::from_pem_file(&tls.ca_cert, tls.domain.clone())?;
            builder = builder.with_transport_security(tls);
        }
        if cfg.log_calls {
            builder = builder.with_interceptor(log_outgoing);
        }
        Ok(builder)
    }

    pub fn with_transport_security(mut self, tls: ClientTls) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_interceptor<F>(mut self, f: F) -> Self
    where
        F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
    {
        self.interceptors.push(f);
        self
    }

    pub fn with_resolver(mut self, builder: impl ResolverBuilder + 'static) -> Self {
        self.resolvers.register(builder);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolves the target. No connection is made until the first call.
    pub fn build(self) -> Result<GreeterClient> {
        let target: Target = self.target.parse()?;
        let balancer = Arc::new(RoundRobin::new(target.to_string()));
        let resolver = self.resolvers.build(&target, balancer.clone())?;

        Ok(GreeterClient {
            target,
            balancer,
            resolver,
            tls: self.tls,
            interceptors: self.interceptors,
            connect_timeout: self.connect_timeout,
            channels: Mutex::new(HashMap::new()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub metadata: Metadata,
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Cancelling `token` aborts the in-flight call with `CANCELLED`.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug)]
pub struct CallOutcome {
    pub reply: HelloReply,
    /// Response metadata: the server's headers with its trailers merged in.
    pub metadata: MetadataMap,
}

pub struct GreeterClient {
    target: Target,
    balancer: Arc<RoundRobin>,
    resolver: Box<dyn Resolver>,
    tls: Option<ClientTls>,
    interceptors: InterceptorChain,
    connect_timeout: Duration,
    channels: Mutex<HashMap<Address, Channel>>,
}

impl GreeterClient {
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The currently resolved addresses.
    pub fn addresses(&self) -> Vec<Address> {
        self.balancer.addresses()
    }

    pub fn resolve_now(&self) {
        self.resolver.resolve_now();
    }

    pub async fn say_hello(
        &self,
        name: impl Into<String>,
        opts: CallOptions,
    ) -> Result<CallOutcome> {
        let addr = self.balancer.pick()?;

        let mut request = Request::new(HelloRequest { name: name.into() });
        opts.metadata.apply_to(request.metadata_mut())?;
        if let Some(deadline) = opts.deadline {
            request.set_timeout(deadline);
        }

        let deadline = opts.deadline;
        let target = &addr;
        let call = async move {
            let unary = self.unary(target, request);
            match deadline {
                Some(deadline) => match tokio::time::timeout(deadline, unary).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::from(Status::deadline_exceeded("deadline exceeded"))),
                },
                None => unary.await,
            }
        };

        let response = match &opts.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log::debug!("call to {} cancelled", addr);
                        return Err(Status::cancelled("call cancelled").into());
                    }
                    response = call => response?,
                }
            }
            None => call.await?,
        };

        let (metadata, reply, _) = response.into_parts();
        Ok(CallOutcome { reply, metadata })
    }

    /// Releases the resolver. Also done on drop.
    pub fn close(&self) {
        self.resolver.close();
    }

    async fn unary(
        &self,
        addr: &Address,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>> {
        let channel = self.channel(addr).await?;
        let mut client = RawGreeterClient::with_interceptor(channel, self.interceptors.clone());
        Ok(client.say_hello(request).await?)
    }

    async fn channel(&self, addr: &Address) -> Result<Channel> {
        if let Some(channel) = self.channels.lock().await.get(addr) {
            return Ok(channel.clone());
        }

        // The lock is not held while connecting; a racing connect to the
        // same address keeps whichever channel was stored first.
        log::debug!("connecting to {}", addr);
        let channel = self.endpoint(addr)?.connect().await?;
        let mut channels = self.channels.lock().await;
        Ok(channels.entry(addr.clone()).or_insert(channel).clone())
    }

    fn endpoint(&self, addr: &Address) -> Result<Endpoint> {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        let endpoint = Endpoint::from_shared(format!("{}://{}", scheme, addr))
            .map_err(|_| Error::InvalidAddress(addr.to_string()))?
            .connect_timeout(self.connect_timeout);

        match &self.tls {
            Some(tls) => Ok(endpoint.tls_config(tls.config())?),
            None => Ok(endpoint),
        }
    }
}

impl Drop for GreeterClient {
    fn drop(&mut self) {
        self.close();
    }
}
