use std::net::SocketAddr;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    /// Run the control plane
    Serve(ServeArgs),
    /// Print the CustomResourceDefinition manifests to stdout
    CrdGen,
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Port for the xDS ADS listener
    #[arg(long, env = "XDS_PORT", default_value_t = 18000)]
    pub xds_port: u16,

    /// Metrics and readiness listener
    #[arg(long, env = "METRICS_ADDRESS", default_value = "0.0.0.0:9090")]
    pub metrics_address: SocketAddr,

    /// Enable gRPC server reflection on the xDS listener
    #[arg(long, env = "ENABLE_GRPC_REFLECTION")]
    pub enable_grpc_reflection: bool,

    /// Enable gRPC channelz on the xDS listener
    #[arg(long, env = "ENABLE_GRPC_CHANNELZ")]
    pub enable_grpc_channelz: bool,
}
