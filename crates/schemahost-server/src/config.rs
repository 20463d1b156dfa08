use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Schema host settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Directory published under `/schemas`.
    pub schema_dir: PathBuf,
    /// Base URL used for links in the index. Defaults to `http://<bound addr>`.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            schema_dir: PathBuf::from("schemas"),
            public_url: None,
        }
    }
}
