//! Command-line flags and environment variables the server accepts,
//! layered onto `collab_core::Config`'s defaults.
use clap::Parser;
use collab_core::Config;

#[derive(Debug, Parser)]
#[command(name = "collab-server", about = "Real-time diagram collaboration hub")]
pub struct Cli {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "COLLAB_BIND_ADDR", default_value = "127.0.0.1:8080")]
    pub bind_addr: String,

    /// Seconds of inactivity before an idle session is torn down.
    #[arg(long, env = "COLLAB_INACTIVITY_TIMEOUT_SECONDS")]
    pub inactivity_timeout_seconds: Option<u64>,

    /// Seconds between hub sweeps over all live sessions.
    #[arg(long, env = "COLLAB_CLEANUP_INTERVAL_SECONDS")]
    pub cleanup_interval_seconds: Option<u64>,

    /// Seconds between server-initiated WebSocket pings.
    #[arg(long, env = "COLLAB_PING_INTERVAL_SECONDS")]
    pub ping_interval_seconds: Option<u64>,

    /// Seconds to wait for a client frame before treating the read as dead.
    #[arg(long, env = "COLLAB_READ_DEADLINE_SECONDS")]
    pub read_deadline_seconds: Option<u64>,

    /// Seconds to wait for a write to flush before treating it as dead.
    #[arg(long, env = "COLLAB_WRITE_DEADLINE_SECONDS")]
    pub write_deadline_seconds: Option<u64>,

    /// Maximum accepted size, in bytes, of a single inbound WebSocket frame.
    #[arg(long, env = "COLLAB_MAX_MESSAGE_BYTES")]
    pub max_message_bytes: Option<usize>,

    /// Depth of the per-session undo/redo stacks.
    #[arg(long, env = "COLLAB_HISTORY_DEPTH")]
    pub history_depth: Option<usize>,

    /// Comma-separated list of origins allowed to open a WebSocket
    /// connection. Empty means same-origin only.
    #[arg(long, env = "COLLAB_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
}

impl Cli {
    pub fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            inactivity_timeout_seconds: self
                .inactivity_timeout_seconds
                .unwrap_or(defaults.inactivity_timeout_seconds),
            cleanup_interval_seconds: self
                .cleanup_interval_seconds
                .unwrap_or(defaults.cleanup_interval_seconds),
            ping_interval_seconds: self.ping_interval_seconds.unwrap_or(defaults.ping_interval_seconds),
            read_deadline_seconds: self.read_deadline_seconds.unwrap_or(defaults.read_deadline_seconds),
            write_deadline_seconds: self
                .write_deadline_seconds
                .unwrap_or(defaults.write_deadline_seconds),
            max_message_bytes: self.max_message_bytes.unwrap_or(defaults.max_message_bytes),
            history_depth: self.history_depth.unwrap_or(defaults.history_depth),
            allowed_origins: if self.allowed_origins.is_empty() {
                defaults.allowed_origins
            } else {
                self.allowed_origins
            },
        }
        .normalized()
    }
}
