use crate::common::{Error, Result};
use crate::transport::Transport;
use core::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Establishes connections to a target address.
///
/// The factory calls this once per factory when connections are shared, or
/// once per requester otherwise.
pub trait Connector: Send + Sync + 'static {
    type Connection: Transport + Clone + Send + Sync + 'static;

    fn connect(&self, target: &str) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// Dials plaintext HTTP/2 channels with tonic.
///
/// Targets without a scheme are treated as `http://host:port`.
#[derive(Clone, Debug, Default)]
pub struct TonicConnector {
    connect_timeout: Option<Duration>,
}

impl TonicConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Connector for TonicConnector {
    type Connection = Channel;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn connect(&self, target: &str) -> Result<Channel> {
        let transport_error = |e: tonic::transport::Error| Error::Transport {
            target: target.to_owned(),
            source: Box::new(e),
        };

        let mut endpoint = Endpoint::from_shared(with_scheme(target)).map_err(transport_error)?;
        if let Some(timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        let channel = endpoint.connect().await.map_err(transport_error)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Connected");

        Ok(channel)
    }
}

fn with_scheme(target: &str) -> String {
    if target.contains("://") {
        target.to_owned()
    } else {
        format!("http://{target}")
    }
}
