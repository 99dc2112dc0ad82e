use std::fmt;
use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{GrpcMethod, Request, Status};

type InterceptFn = dyn Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync;

/// Client interceptors, run in registration order on every call.
///
/// The first interceptor returning an error aborts the call with that status.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<InterceptFn>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, f: F)
    where
        F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(f));
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl Interceptor for InterceptorChain {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        for interceptor in &self.interceptors {
            request = interceptor(request)?;
        }
        Ok(request)
    }
}

/// Logs the method and metadata keys of each outgoing call.
pub fn log_outgoing(request: Request<()>) -> Result<Request<()>, Status> {
    let method = request
        .extensions()
        .get::<GrpcMethod>()
        .map(|m| format!("/{}/{}", m.service(), m.method()))
        .unwrap_or_else(|| "<unknown>".to_owned());

    let keys: Vec<String> = request
        .metadata()
        .keys()
        .map(|key| match key {
            tonic::metadata::KeyRef::Ascii(k) => k.as_str().to_owned(),
            tonic::metadata::KeyRef::Binary(k) => k.as_str().to_owned(),
        })
        .collect();

    log::info!("calling {} with metadata {:?}", method, keys);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    #[test]
    fn interceptors_run_in_order() {
        let mut chain = InterceptorChain::new();
        chain.push(|mut req: Request<()>| {
            req.metadata_mut().append("trace", MetadataValue::from_static("first"));
            Ok(req)
        });
        chain.push(|mut req: Request<()>| {
            req.metadata_mut().append("trace", MetadataValue::from_static("second"));
            Ok(req)
        });
        chain.push(log_outgoing);

        let req = chain.call(Request::new(())).unwrap();
        let trace: Vec<_> = req
            .metadata()
            .get_all("trace")
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(trace, vec!["first", "second"]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn rejecting_interceptor_short_circuits() {
        let mut chain = InterceptorChain::new();
        chain.push(|_req: Request<()>| Err(Status::permission_denied("nope")));
        chain.push(|_req: Request<()>| panic!("must not run"));

        let err = chain.call(Request::new(())).unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
    }
}
