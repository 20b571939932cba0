pub mod config;
pub mod http;
pub mod kubernetes;
pub mod metrics;
pub mod xds;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("crd error: {0}")]
    CrdError(#[from] helmsman_crds::Error),

    #[error("failed to create store: {0}")]
    StoreCreation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("invalid config on {kind} {name}: {source}")]
    InvalidConfig {
        kind: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("reflection error: {0}")]
    ReflectionError(String),
}

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::IoError(_) => "io",
            Error::KubeError(_) => "kube",
            Error::CrdError(_) => "crd",
            Error::StoreCreation(_) => "store_creation",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Timeout(_) => "timeout",
            Error::NotFound { .. } => "not_found",
            Error::InvalidConfig { .. } => "invalid_config",
            Error::TransportError(_) => "transport",
            Error::ReflectionError(_) => "reflection",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
