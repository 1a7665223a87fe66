use std::net::SocketAddr;

use chrono::FixedOffset;
use clap::{Args, Parser, Subcommand};

use crate::{clock::parse_utc_offset, relay::RelaySettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, accepting TCP and optionally WebSocket connections.
    Serve(ServeArgs),
    /// Join a room on a running relay from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address for the line-protocol listener. Use port 0 for an ephemeral port.
    #[arg(long, env = "CHAT_RELAY_LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Socket address for the HTTP listener serving `/ws` and `/health`.
    #[arg(long, env = "CHAT_RELAY_HTTP_LISTEN")]
    pub http_listen: Option<SocketAddr>,

    /// UTC offset used for message timestamps, e.g. `+07:00` or `-5`.
    #[arg(
        long,
        env = "CHAT_RELAY_UTC_OFFSET",
        default_value = "+07:00",
        value_parser = parse_utc_offset,
        allow_hyphen_values = true
    )]
    pub utc_offset: FixedOffset,
}

impl ServeArgs {
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            utc_offset: self.utc_offset,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Name shown to the other members of the room.
    #[arg(long)]
    pub username: String,

    /// Room to join.
    #[arg(long)]
    pub room: String,

    /// Address of the relay's line-protocol listener.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}
