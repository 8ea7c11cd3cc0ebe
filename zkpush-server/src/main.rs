use envconfig::Envconfig;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use zkpush::config::Config;
use zkpush::server::{serve, ShutdownOutcome};

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    // nodemon-style restarts
    let mut restart = signal::unix::signal(signal::unix::SignalKind::user_defined2())
        .expect("failed to register SIGUSR2 handler");

    tokio::select! {
        _ = term.recv() => tracing::info!("SIGTERM signal received"),
        _ = interrupt.recv() => tracing::info!("SIGINT signal received"),
        _ = restart.recv() => tracing::info!("SIGUSR2 signal received"),
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("Invalid configuration:");

    // stdout with a level configured by the RUST_LOG envvar (default=LOG_LEVEL)
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(config.log_level).into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .expect("could not bind port");

    tracing::info!("configure devices to push to http://{}/api/zkpush", config.bind());

    match serve(config, listener, shutdown()).await {
        ShutdownOutcome::Graceful => tracing::info!("shutdown completed"),
        ShutdownOutcome::Forced => {
            tracing::error!("forcing process exit after shutdown timeout");
            std::process::exit(1);
        }
    }
}
