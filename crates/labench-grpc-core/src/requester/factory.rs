use crate::common::{Error, Result};
use crate::payload::{PayloadMessage, build_payload};
use crate::requester::{ConnectionPolicy, FactoryConfig, GrpcRequester, RequesterFactory};
use crate::schema::resolve_method;
use crate::transport::{Connector, MethodRoute, TonicConnector};
use prost_reflect::MethodDescriptor;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tonic::metadata::MetadataMap;

/// Builds [`GrpcRequester`]s that share one method descriptor, one payload
/// and, under [`ConnectionPolicy::Shared`], one connection.
///
/// Each shared resource lives in a compute-once cell: the first caller
/// resolves it while concurrent callers wait, later callers read it without
/// locking. A failed resolution leaves the cell empty so the next caller
/// tries again.
pub struct GrpcRequesterFactory<C: Connector = TonicConnector> {
    config: FactoryConfig,
    headers: Arc<MetadataMap>,
    connector: C,
    method: OnceCell<ResolvedMethod>,
    payload: OnceCell<Arc<PayloadMessage>>,
    connection: OnceCell<C::Connection>,
}

/// A method descriptor together with the route every call to it uses.
struct ResolvedMethod {
    descriptor: MethodDescriptor,
    route: MethodRoute,
}

impl GrpcRequesterFactory<TonicConnector> {
    pub fn new(config: FactoryConfig) -> Self {
        Self::with_connector(config, TonicConnector::new())
    }
}

impl<C: Connector> GrpcRequesterFactory<C> {
    pub fn with_connector(config: FactoryConfig, connector: C) -> Self {
        Self {
            headers: Arc::new(config.headers.clone()),
            config,
            connector,
            method: OnceCell::new(),
            payload: OnceCell::new(),
            connection: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The resolved method descriptor, resolving it on first use.
    pub async fn method(&self) -> Result<&MethodDescriptor> {
        Ok(&self.resolved().await?.descriptor)
    }

    async fn resolved(&self) -> Result<&ResolvedMethod> {
        self.method
            .get_or_try_init(|| async {
                let descriptor = resolve_method(&self.config.call, &self.config.schema)?;
                let route = MethodRoute::new(&descriptor)?;
                Ok::<_, Error>(ResolvedMethod { descriptor, route })
            })
            .await
    }

    /// The built request payload, building it on first use.
    pub async fn payload(&self) -> Result<Arc<PayloadMessage>> {
        let method = self.method().await?;
        self.payload
            .get_or_try_init(|| async {
                build_payload(&method.input(), &self.config.payload)
                    .map(Arc::new)
                    .map_err(Error::from)
            })
            .await
            .cloned()
    }

    async fn connection(&self) -> Result<C::Connection> {
        match self.config.connection {
            ConnectionPolicy::Dedicated => self.connector.connect(&self.config.target).await,
            ConnectionPolicy::Shared => self
                .connection
                .get_or_try_init(|| self.connector.connect(&self.config.target))
                .await
                .cloned(),
        }
    }
}

impl<C: Connector> RequesterFactory for GrpcRequesterFactory<C> {
    type Requester = GrpcRequester<C::Connection>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(target = %self.config.target)))]
    async fn get_requester(&self, worker: u64) -> Result<Self::Requester> {
        let ResolvedMethod { descriptor, route } = self.resolved().await?;
        let payload = self.payload().await?;
        let transport = self.connection().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(policy = ?self.config.connection, "Requester created");

        Ok(GrpcRequester::new(
            worker,
            transport,
            descriptor.clone(),
            route.clone(),
            payload,
            Arc::clone(&self.headers),
            self.config.timeout,
        ))
    }
}
