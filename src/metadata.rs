use chrono::{DateTime, Local, TimeZone};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

use crate::constants::TIMESTAMP_KEY;
use crate::error::{Error, Result};

/// Ordered key/value pairs attached to an outgoing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends every pair onto `map`, keeping repeated keys.
    pub fn apply_to(&self, map: &mut MetadataMap) -> Result<()> {
        for (key, value) in self.iter() {
            let k = AsciiMetadataKey::from_bytes(key.as_bytes())
                .map_err(|_| Error::InvalidMetadata(key.to_owned()))?;
            let v = AsciiMetadataValue::try_from(value)
                .map_err(|_| Error::InvalidMetadata(key.to_owned()))?;
            map.append(k, v);
        }
        Ok(())
    }
}

/// Formats `time` as `Jan _2 15:04:05`.
pub fn format_stamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%b %e %H:%M:%S").to_string()
}

/// A single `timestamp` pair carrying the current local time.
pub fn timestamp() -> Metadata {
    Metadata::pairs([(TIMESTAMP_KEY, format_stamp(&Local::now()))])
}

/// Reads `key` from `map` as a string, if present and printable.
pub fn get_str<'a>(map: &'a MetadataMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(|v| v.to_str().ok())
}
