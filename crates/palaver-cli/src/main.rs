//! # palaver
//!
//! Terminal chat client. Joins the configured server, prints every message
//! and presence change as it arrives and posts each line typed on stdin.
//!
//! Stops on Ctrl+C or end of input.

mod render;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use palaver_client::{ClientConfig, MessageStore, SyncClient, SyncState, UserStore};

use crate::render::OutputFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG), on stderr so it doesn't
    //    interleave with chat output
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("palaver_client=info,palaver_cli=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting palaver v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    let format = OutputFormat::from_env();
    info!(?config, ?format, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Stores and printers
    // -----------------------------------------------------------------------
    let messages = MessageStore::new();
    let users = UserStore::with_policy(config.duplicate_joins);

    messages
        .subscribe(move |record| match render::render_message(record, format) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to render message"),
        })
        .detach();

    if format == OutputFormat::Text {
        let roster = users.clone();
        users
            .subscribe(move |_| println!("{}", render::render_roster(&roster.snapshot())))
            .detach();
    }

    // -----------------------------------------------------------------------
    // 4. Start syncing
    // -----------------------------------------------------------------------
    let client = SyncClient::connect(&config, messages, users)?;
    let handle = client.spawn();
    let sender = handle.sender();
    let mut states = handle.state_updates();

    // -----------------------------------------------------------------------
    // 5. Forward stdin until interrupted
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = states.wait_for(|s| *s == SyncState::Stopped) => {
                // The client gave up on its own; stop() reports why.
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if !text.is_empty() {
                        sender.send(text);
                    }
                }
                Ok(None) => {
                    info!("Input closed, shutting down");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read input");
                    break;
                }
            },
        }
    }

    handle.stop().await?;
    info!("Bye");
    Ok(())
}
