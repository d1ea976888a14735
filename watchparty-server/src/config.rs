//! Server configuration from command-line flags and environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

/// Local API of a running ngrok agent
pub const DEFAULT_NGROK_API_URL: &str = "http://127.0.0.1:4040/api/tunnels";

#[derive(Debug, Clone, Parser)]
#[command(name = "watchparty")]
#[command(about = "Watch a video together: one host drives playback, everyone else follows")]
pub struct Config {
    /// Port to listen on (0 picks a free port)
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Video file to serve (can be changed at runtime via /admin/video-path)
    #[arg(long, env = "VIDEO_PATH")]
    pub video_path: Option<PathBuf>,

    /// ngrok auth token; enables the public tunnel
    #[arg(long, env = "NGROK_AUTHTOKEN", hide_env_values = true)]
    pub ngrok_authtoken: Option<String>,

    /// Set to false to skip the tunnel even when a token is present
    #[arg(
        long,
        env = "ENABLE_NGROK",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub enable_ngrok: bool,

    /// ngrok agent executable
    #[arg(long, env = "NGROK_BIN", default_value = "ngrok")]
    pub ngrok_bin: String,

    /// ngrok agent API endpoint listing active tunnels
    #[arg(long, env = "NGROK_API_URL", default_value = DEFAULT_NGROK_API_URL)]
    pub ngrok_api_url: String,

    /// Directory with the browser client, served for unmatched paths
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Token to start the tunnel with, if the tunnel is wanted at all
    pub fn tunnel_token(&self) -> Option<&str> {
        if !self.enable_ngrok {
            return None;
        }
        self.ngrok_authtoken
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}
