// simplechat server binary

use anyhow::Context;
use clap::Parser;
use simplechat::chat::{ChatDisplay, ChatServer, ConsoleDisplay, Flow, ServerArgs};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the console display
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simplechat=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = ServerArgs::parse();
    let display = Arc::new(ConsoleDisplay);
    let mut server = ChatServer::new(args.into_config(), display.clone());

    if let Err(e) = server.listen().await {
        tracing::warn!("Initial listen failed: {}", e);
        display.display("ERROR - Could not listen for clients!");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.context("Failed to read from console")?;
                let flow = match line {
                    Some(line) => server.handle_console_line(&line).await,
                    None => server.handle_console_line("#quit").await,
                };
                if flow == Flow::Quit {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                server.quit().await;
                break;
            }
        }
    }

    Ok(())
}
