//! Backend Status Example
//!
//! Connects to a Reef server, prints connection status the way a status
//! bar would ("reconnecting in N seconds"), and issues a `TAG_LIST` request
//! every time the connection opens.
//!
//! Run with: `RUST_LOG=reef_gateway=debug cargo run -p reef-gateway --example backend_status [url]`

use reef_gateway::{Gateway, GatewayConfig, GatewayEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| reef_gateway::DEFAULT_URL.to_string());
    let gateway = Gateway::connect_default(GatewayConfig::new(url))?;

    gateway.add_event_listener(|event| match event {
        GatewayEvent::Connecting => println!("[status] connecting..."),
        GatewayEvent::Opened { .. } => println!("[status] connected"),
        GatewayEvent::Closed { countdown, .. } | GatewayEvent::Countdown(countdown) => {
            println!("[status] disconnected, reconnecting in {countdown}s");
        }
        GatewayEvent::MessageReceived(message) => {
            println!("[message] {} {}", message.message_type, message.payload);
        }
    });

    let mut events = gateway.events();
    gateway.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(GatewayEvent::Opened { epoch }) => {
                    info!(%epoch, "Requesting tag list");
                    match gateway.request("TAG_LIST", &()).await {
                        Ok(tags) => info!(%tags, "Tag list acknowledged"),
                        Err(e) => warn!(error = %e, "TAG_LIST failed"),
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    gateway.stop().await;
    Ok(())
}
