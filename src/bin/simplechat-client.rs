// simplechat client binary

use anyhow::Context;
use clap::Parser;
use simplechat::chat::{ChatClient, ClientArgs, ConsoleDisplay, Flow};
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

    let args = ClientArgs::parse();
    let (config, port_fell_back) = match args.into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    };

    if port_fell_back {
        println!("ERROR - Invalid port number.  Using default.");
    }

    let mut client = match ChatClient::connect(config, Arc::new(ConsoleDisplay)).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Startup connection failed: {}", e);
            println!("ERROR - Could not connect!  Terminating client.");
            std::process::exit(1);
        }
    };

    let terminated = client.terminated();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = terminated.cancelled() => break,
            line = lines.next_line() => {
                let line = line.context("Failed to read from console")?;
                let flow = match line {
                    Some(line) => client.handle_console_line(&line).await,
                    None => client.handle_console_line("#quit").await,
                };
                if flow == Flow::Quit {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Lets the disconnect notice print before the process exits
    client.quit().await;

    Ok(())
}
