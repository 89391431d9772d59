//! Command-line configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

/// Publish bytes over HTTP; every blob is deleted 24 hours after it was
/// published.
#[derive(Debug, Parser)]
#[command(name = "publish", version, about)]
pub struct Cli {
    /// TCP port to listen on.
    pub port: u16,

    /// Interface address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Directory holding live blobs. Created if missing.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
