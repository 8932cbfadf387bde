use crate::common::{Error, Result, SchemaError};
use crate::payload::PayloadSource;
use crate::schema::SchemaSource;
use core::time::Duration;
use tonic::metadata::{
    AsciiMetadataKey, AsciiMetadataValue, BinaryMetadataKey, BinaryMetadataValue, MetadataMap,
};

/// Whether requesters from one factory share a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    /// Every requester dials its own connection.
    #[default]
    Dedicated,
    /// All requesters multiplex over one connection, dialed on first use.
    Shared,
}

impl ConnectionPolicy {
    pub fn from_shared(shared: bool) -> Self {
        if shared { Self::Shared } else { Self::Dedicated }
    }
}

/// Everything a [`GrpcRequesterFactory`](crate::GrpcRequesterFactory) needs,
/// validated at construction.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// `host:port`, or a full URI.
    pub target: String,
    /// `package.Service/Method`.
    pub call: String,
    pub schema: SchemaSource,
    pub payload: PayloadSource,
    /// Static headers attached to every call.
    pub headers: MetadataMap,
    pub connection: ConnectionPolicy,
    /// Per-call deadline.
    pub timeout: Option<Duration>,
}

impl FactoryConfig {
    pub fn builder(target: impl Into<String>, call: impl Into<String>) -> FactoryConfigBuilder {
        FactoryConfigBuilder {
            target: target.into(),
            call: call.into(),
            schema: None,
            payload: PayloadSource::default(),
            headers: MetadataMap::new(),
            connection: ConnectionPolicy::default(),
            timeout: None,
        }
    }
}

#[derive(Debug)]
pub struct FactoryConfigBuilder {
    target: String,
    call: String,
    schema: Option<SchemaSource>,
    payload: PayloadSource,
    headers: MetadataMap,
    connection: ConnectionPolicy,
    timeout: Option<Duration>,
}

impl FactoryConfigBuilder {
    pub fn schema(mut self, schema: SchemaSource) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn payload(mut self, payload: PayloadSource) -> Self {
        self.payload = payload;
        self
    }

    pub fn connection(mut self, connection: ConnectionPolicy) -> Self {
        self.connection = connection;
        self
    }

    /// Adds static headers from string pairs. See [`parse_headers`].
    pub fn headers<I, K, V>(mut self, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        insert_headers(&mut self.headers, headers)?;
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// # Errors
    ///
    /// - [`Error::Config`] if the target or call is empty, or the timeout is
    ///   zero.
    /// - [`SchemaError::MissingSource`] if no schema was given.
    pub fn build(self) -> Result<FactoryConfig> {
        if self.target.trim().is_empty() {
            return Err(Error::Config {
                reason: "target address is empty".to_owned(),
            });
        }
        if self.call.trim().is_empty() {
            return Err(Error::Config {
                reason: "method identifier is empty".to_owned(),
            });
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config {
                reason: "request timeout must be greater than zero".to_owned(),
            });
        }
        let schema = self.schema.ok_or(SchemaError::MissingSource)?;

        Ok(FactoryConfig {
            target: self.target,
            call: self.call,
            schema,
            payload: self.payload,
            headers: self.headers,
            connection: self.connection,
            timeout: self.timeout,
        })
    }
}

/// Validates string header pairs into gRPC metadata.
///
/// Keys are lowercased. Keys ending in `-bin` carry the value's raw bytes,
/// which the transport base64-encodes on the wire; all other values must be
/// visible ASCII.
pub fn parse_headers<I, K, V>(headers: I) -> Result<MetadataMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut map = MetadataMap::new();
    insert_headers(&mut map, headers)?;
    Ok(map)
}

fn insert_headers<I, K, V>(map: &mut MetadataMap, headers: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (key, value) in headers {
        let key = key.as_ref().to_ascii_lowercase();
        let value = value.as_ref();
        let invalid = |reason: &str| Error::Config {
            reason: format!("header `{key}`: {reason}"),
        };

        if key.ends_with("-bin") {
            let name = BinaryMetadataKey::from_bytes(key.as_bytes())
                .map_err(|_| invalid("not a valid metadata key"))?;
            map.insert_bin(name, BinaryMetadataValue::from_bytes(value.as_bytes()));
        } else {
            let name = AsciiMetadataKey::from_bytes(key.as_bytes())
                .map_err(|_| invalid("not a valid metadata key"))?;
            let value = AsciiMetadataValue::try_from(value)
                .map_err(|_| invalid("value must be visible ASCII"))?;
            map.insert(name, value);
        }
    }
    Ok(())
}
