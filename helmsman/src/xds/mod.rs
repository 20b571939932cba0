pub mod cache;
pub mod callbacks;
pub(crate) mod resources;
pub(crate) mod server;
pub mod snapshot;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::service::{Routes, RoutesBuilder};
use tracing::{info, warn};
use xds_api::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;

use crate::kubernetes::store::Store;
use crate::xds::cache::SnapshotCache;
use crate::xds::callbacks::StreamCallbacks;
use crate::xds::server::AdsService;
use crate::{Error, Result};

pub const ADS_SERVICE_NAME: &str = "envoy.service.discovery.v3.AggregatedDiscoveryService";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub enable_reflection: bool,
    pub enable_channelz: bool,
}

pub struct Server {
    listener: TcpListener,
    routes: Routes,
}

impl Server {
    /// Binds the ADS listener. The snapshot cache is injected so reconcilers
    /// and streams share one store of truth; a bind failure aborts startup.
    pub async fn new<S: Store>(cache: SnapshotCache, store: S, config: &Config) -> Result<Server> {
        let callbacks = Arc::new(StreamCallbacks::new(store, cache.clone()));
        let ads = AdsService::new(cache, callbacks);

        let mut builder = RoutesBuilder::default();
        builder.add_service(AggregatedDiscoveryServiceServer::new(ads));

        if config.enable_reflection {
            let reflection = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(xds_api::FILE_DESCRIPTOR_SET)
                .with_service_name(ADS_SERVICE_NAME)
                .build()
                .map_err(|e| Error::ReflectionError(e.to_string()))?;
            builder.add_service(reflection);
        }
        if config.enable_channelz {
            warn!("gRPC channelz was requested but is not supported; ignoring");
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr).await?;
        info!("xDS listening on {}", addr);

        Ok(Server {
            listener,
            routes: builder.routes(),
        })
    }

    /// Serves until the token is cancelled.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        let stream = TcpListenerStream::new(self.listener);

        tonic::transport::Server::builder()
            .add_routes(self.routes)
            .serve_with_incoming_shutdown(stream, shutdown(cancel))
            .await?;

        Ok(())
    }
}

async fn shutdown(cancel: CancellationToken) {
    cancel.cancelled().await
}
