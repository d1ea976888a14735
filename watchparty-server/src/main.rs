//! WatchParty - Watch Party Server
//!
//! Serves one video file with byte-range support and keeps every
//! connected browser in step with the host's playback.
//!
//! Usage:
//!   cargo run --release -- --video-path movie.mp4
//!   NGROK_AUTHTOKEN=... cargo run --release   # Also open a public tunnel

mod config;
mod error;
mod handlers;
mod lan;
mod metrics;
mod server;
mod tunnel;
mod ws;

use clap::Parser;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("watchparty=info".parse()?)
                .add_directive("watchparty_core=info".parse()?)
                .add_directive("tower_http=warn".parse()?),
        )
        .init();

    let config = Config::parse();
    server::run(config).await
}
