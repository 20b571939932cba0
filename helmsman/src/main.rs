use clap::Parser;
use helmsman::config::{Cli, Commands, ServeArgs};
use helmsman::xds::cache::SnapshotCache;
use helmsman::{http, kubernetes, xds, Result};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => {
            setup_subscriber();
            serve(args).await?;
        }
        Commands::CrdGen => {
            helmsman_crds::crd_gen_all()?;
        }
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let client = kube::Client::try_default().await?;
    let cache = SnapshotCache::new();
    let (store, watches) = kubernetes::new_store(&client);

    let config = xds::Config {
        port: args.xds_port,
        enable_reflection: args.enable_grpc_reflection,
        enable_channelz: args.enable_grpc_channelz,
    };
    let server = xds::Server::new(cache.clone(), store.clone(), &config).await?;

    let (synced_tx, synced_rx) = watch::channel(false);
    let cancel = CancellationToken::new();

    let mut metrics_handle = tokio::spawn(http::serve(
        args.metrics_address,
        synced_rx,
        cancel.child_token(),
    ));
    let mut kubernetes_handle = tokio::spawn(kubernetes::start(
        store,
        watches,
        cache,
        synced_tx,
        cancel.child_token(),
    ));
    let mut xds_handle = tokio::spawn(server.start(cancel.child_token()));
    let mut shutdown_handle = tokio::spawn(async move { shutdown_signal().await });

    // watch for shutdown and errors
    tokio::select! {
        h = &mut metrics_handle => exit("metrics", h),
        h = &mut kubernetes_handle => exit("kubernetes", h),
        h = &mut xds_handle => exit("xds", h),
        _ = &mut shutdown_handle => {
            cancel.cancel();
            let (metrics, kubernetes, xds) = tokio::join!(metrics_handle, kubernetes_handle, xds_handle);
            if let Err(m) = metrics {
                error!("metrics exited with error: {}", m.to_string());
            }
            if let Err(k) = kubernetes {
                error!("kubernetes exited with error: {}", k.to_string());
            }
            if let Err(x) = xds {
                error!("xds exited with error: {}", x.to_string());
            }
        },
    };
    info!("Exiting...");
    Ok(())
}

fn setup_subscriber() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helmsman=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {
          info!("captured ctrl_c signal");
        },
        _ = terminate => {},
    }
}

fn exit(task: &str, out: Result<Result<()>, JoinError>) {
    match out {
        Ok(Ok(_)) => {
            info!("{task} exited")
        }
        Ok(Err(e)) => {
            error!("{task} failed with error: {e}")
        }
        Err(e) => {
            error!("{task} task failed to complete: {e}")
        }
    }
}
