//! Structured error details carried in `grpc-status-details-bin`.
//!
//! The details payload is an encoded `google.rpc.Status` whose `details`
//! field holds `google.protobuf.Any` messages. Only `google.rpc.RetryInfo`
//! is interpreted; everything else is passed through untouched.

use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use prost_types::Any;
use tonic::{Code, Status};

pub const RETRY_INFO_TYPE_URL: &str = "type.googleapis.com/google.rpc.RetryInfo";

/// `google.rpc.Status`
#[derive(Clone, PartialEq, Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<Any>,
}

/// `google.rpc.RetryInfo`
#[derive(Clone, PartialEq, Message)]
pub struct RetryInfo {
    #[prost(message, optional, tag = "1")]
    pub retry_delay: Option<prost_types::Duration>,
}

impl RetryInfo {
    pub fn new(delay: Duration) -> Self {
        Self {
            retry_delay: Some(prost_types::Duration {
                seconds: i64::try_from(delay.as_secs()).unwrap_or(i64::MAX),
                nanos: i32::try_from(delay.subsec_nanos()).unwrap_or(0),
            }),
        }
    }

    /// The suggested delay, `None` if absent or negative.
    pub fn delay(&self) -> Option<Duration> {
        let d = self.retry_delay.as_ref()?;
        let secs = u64::try_from(d.seconds).ok()?;
        let nanos = u32::try_from(d.nanos).ok()?;
        Some(Duration::new(secs, nanos))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    RetryInfo(RetryInfo),
    Other(Any),
}

/// Builds a failure status with a single `RetryInfo` detail attached.
pub fn status_with_retry_info(code: Code, message: &str, retry_delay: Duration) -> Status {
    let info = RetryInfo::new(retry_delay);
    let rpc_status = RpcStatus {
        code: code as i32,
        message: message.to_owned(),
        details: vec![Any {
            type_url: RETRY_INFO_TYPE_URL.to_owned(),
            value: info.encode_to_vec(),
        }],
    };

    Status::with_details(code, message, Bytes::from(rpc_status.encode_to_vec()))
}

/// Decodes the details attached to `status`.
///
/// Returns an empty list when there are no details or they cannot be decoded.
pub fn error_details(status: &Status) -> Vec<ErrorDetail> {
    if status.details().is_empty() {
        return Vec::new();
    }

    let rpc_status = match RpcStatus::decode(status.details()) {
        Ok(rpc_status) => rpc_status,
        Err(err) => {
            log::warn!("undecodable status details: {}", err);
            return Vec::new();
        }
    };

    rpc_status
        .details
        .into_iter()
        .map(|any| {
            if any.type_url == RETRY_INFO_TYPE_URL {
                if let Ok(info) = RetryInfo::decode(any.value.as_slice()) {
                    return ErrorDetail::RetryInfo(info);
                }
            }
            ErrorDetail::Other(any)
        })
        .collect()
}

/// The first `RetryInfo` delay attached to `status`.
pub fn retry_delay(status: &Status) -> Option<Duration> {
    error_details(status).into_iter().find_map(|detail| match detail {
        ErrorDetail::RetryInfo(info) => info.delay(),
        ErrorDetail::Other(_) => None,
    })
}
