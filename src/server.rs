use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::{AsciiMetadataKey, MetadataMap};
use tonic::transport::{Identity, Server};
use tonic::{Code, Request, Response, Status};

use crate::config::{ReplyMode, ServerConfig};
use crate::constants::{HANDLER_DELAY_MS, TIMESTAMP_KEY};
use crate::details::status_with_retry_info;
use crate::error::{Error, Result};
use crate::proto::greeter_server::{Greeter, GreeterServer};
use crate::proto::{HelloReply, HelloRequest};

/// What the handler answers once the simulated work is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerMode {
    /// Reply with `Hello <name>`.
    Greet,
    /// Fail with `ABORTED` and a `RetryInfo` detail.
    Abort { retry_delay: Duration },
}

#[derive(Debug, Clone)]
pub struct GreeterService {
    mode: HandlerMode,
    delay: Duration,
    echo_keys: Vec<AsciiMetadataKey>,
}

impl GreeterService {
    pub fn new(mode: HandlerMode) -> Self {
        Self {
            mode,
            delay: Duration::from_millis(HANDLER_DELAY_MS),
            echo_keys: vec![AsciiMetadataKey::from_static(TIMESTAMP_KEY)],
        }
    }

    pub fn from_config(cfg: &ServerConfig) -> Result<Self> {
        let mode = match cfg.mode {
            ReplyMode::Greet => HandlerMode::Greet,
            ReplyMode::Abort => HandlerMode::Abort {
                retry_delay: cfg.retry_delay(),
            },
        };

        Self::new(mode)
            .with_delay(cfg.delay())
            .with_echo_metadata(&cfg.echo_metadata)
    }

    /// Simulated processing time before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Request metadata keys copied back to the caller with the outcome.
    pub fn with_echo_metadata<I, K>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.echo_keys = keys
            .into_iter()
            .map(|key| {
                let key = key.as_ref();
                AsciiMetadataKey::from_bytes(key.as_bytes())
                    .map_err(|_| Error::InvalidMetadata(key.to_owned()))
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn into_server(self) -> GreeterServer<Self> {
        GreeterServer::new(self)
    }

    fn echo(&self, incoming: &MetadataMap) -> MetadataMap {
        let mut echoed = MetadataMap::new();
        for key in &self.echo_keys {
            for value in incoming.get_all(key.as_str()).iter() {
                echoed.append(key.clone(), value.clone());
            }
        }
        echoed
    }
}

#[tonic::async_trait]
impl Greeter for GreeterService {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        // Sent as response headers on success and as trailers on the
        // trailers-only error response.
        let echoed = self.echo(request.metadata());
        let name = request.into_inner().name;
        log::info!("Received: {}", name);

        tokio::time::sleep(self.delay).await;

        match &self.mode {
            HandlerMode::Greet => {
                let mut response = Response::new(HelloReply {
                    message: format!("Hello {}", name),
                });
                *response.metadata_mut() = echoed;
                Ok(response)
            }
            HandlerMode::Abort { retry_delay } => {
                let mut status = status_with_retry_info(Code::Aborted, "aborted", *retry_delay);
                *status.metadata_mut() = echoed;
                Err(status)
            }
        }
    }
}

/// Server identity for TLS.
#[derive(Debug, Clone)]
pub struct ServerTls {
    identity: Identity,
}

impl ServerTls {
    pub fn from_pem(cert: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Self {
        Self {
            identity: Identity::from_pem(cert, key),
        }
    }

    pub fn from_pem_files(cert: &Path, key: &Path) -> Result<Self> {
        let cert = std::fs::read(cert)?;
        let key = std::fs::read(key)?;
        Ok(Self::from_pem(cert, key))
    }
}

/// Serves `service` on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    service: GreeterService,
    tls: Option<ServerTls>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut builder = Server::builder();
    if let Some(tls) = tls {
        let config = tonic::transport::ServerTlsConfig::new().identity(tls.identity);
        builder = builder.tls_config(config)?;
    }

    log::info!("gRPC server listening on {}", listener.local_addr()?);

    builder
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    log::info!("gRPC server stopped");
    Ok(())
}

/// Binds `cfg.listen_addr` and serves until `shutdown` resolves.
pub async fn run<F>(cfg: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let service = GreeterService::from_config(cfg)?;
    let tls = cfg
        .tls
        .as_ref()
        .map(|tls| ServerTls::from_pem_files(&tls.cert, &tls.key))
        .transpose()?;

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    serve(listener, service, tls, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::retry_delay;
    use tonic::metadata::MetadataValue;

    fn request(name: &str, timestamp: Option<&'static str>) -> Request<HelloRequest> {
        let mut req = Request::new(HelloRequest {
            name: name.to_owned(),
        });
        if let Some(ts) = timestamp {
            req.metadata_mut()
                .insert(TIMESTAMP_KEY, MetadataValue::from_static(ts));
        }
        req
    }

    #[tokio::test]
    async fn greet_branch_replies_and_echoes() {
        let svc = GreeterService::new(HandlerMode::Greet).with_delay(Duration::ZERO);

        let resp = svc
            .say_hello(request("World", Some("Jan  2 15:04:05")))
            .await
            .unwrap();

        assert_eq!(
            resp.metadata().get(TIMESTAMP_KEY).unwrap(),
            "Jan  2 15:04:05"
        );
        assert_eq!(resp.into_inner().message, "Hello World");
    }

    #[tokio::test(start_paused = true)]
    async fn abort_branch_waits_then_fails_with_retry_info() {
        let svc = GreeterService::new(HandlerMode::Abort {
            retry_delay: Duration::from_secs(3),
        });

        let started = tokio::time::Instant::now();
        let status = svc.say_hello(request("World", None)).await.unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(status.code(), Code::Aborted);
        assert_eq!(status.message(), "aborted");
        assert_eq!(retry_delay(&status), Some(Duration::from_secs(3)));
        assert!(status.metadata().get(TIMESTAMP_KEY).is_none());
    }

    #[tokio::test]
    async fn echo_keys_are_configurable() {
        let svc = GreeterService::new(HandlerMode::Greet)
            .with_delay(Duration::ZERO)
            .with_echo_metadata(["x-trace"])
            .unwrap();

        let mut req = request("a", Some("ts"));
        req.metadata_mut()
            .insert("x-trace", MetadataValue::from_static("abc"));

        let resp = svc.say_hello(req).await.unwrap();
        assert_eq!(resp.metadata().get("x-trace").unwrap(), "abc");
        assert!(resp.metadata().get(TIMESTAMP_KEY).is_none());
    }

    #[test]
    fn invalid_echo_key_is_rejected() {
        let err = GreeterService::new(HandlerMode::Greet)
            .with_echo_metadata(["not a key"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata(_)));
    }

    #[test]
    fn config_selects_branch() {
        let cfg = ServerConfig {
            mode: ReplyMode::Greet,
            ..Default::default()
        };
        let svc = GreeterService::from_config(&cfg).unwrap();
        assert_eq!(svc.mode, HandlerMode::Greet);

        let svc = GreeterService::from_config(&ServerConfig::default()).unwrap();
        assert_eq!(
            svc.mode,
            HandlerMode::Abort {
                retry_delay: Duration::from_secs(3)
            }
        );
        assert_eq!(svc.delay, Duration::from_secs(3));
    }
}
