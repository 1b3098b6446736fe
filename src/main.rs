// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! foliochat - Portfolio assistant chat service
//!
//! Long-running HTTP service exposing the assistant chat endpoint. The Gemini
//! API key is read from the `GEMINI_API_KEY` environment variable; running
//! without one is supported and serves a configuration notice instead.

use anyhow::Result;
use clap::Parser;

use foliochat::server::Server;

const DEFAULT_PORT: u16 = 8080;

#[derive(Parser)]
#[command(
    name = "foliochat",
    version,
    about = "Portfolio assistant chat API. Rate-limited, cached, Gemini-backed."
)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind to (use 0.0.0.0 to expose on the network)
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    Server::new(cli.port)
        .with_bind_address(cli.bind)
        .start()
        .await
}
