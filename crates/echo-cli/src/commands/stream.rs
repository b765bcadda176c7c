//! Stream command - server-streaming echo

use std::time::Duration;

use anyhow::Result;
use streamcall_client::echo::{EchoClient, EchoRequest};
use streamcall_client::Status;
use tracing::debug;

use crate::output::OutputContext;

/// Echo `message` and print every event until the call ends
///
/// Ctrl+C and the optional timeout cancel the call. Returns its final status.
pub async fn stream(
    client: &EchoClient,
    message: &str,
    repeat: Option<u32>,
    timeout: Option<u64>,
    ctx: &OutputContext,
) -> Result<Status> {
    let request = EchoRequest {
        message: message.to_string(),
        repeat,
    };

    let mut events = client.echo_stream(&request);
    let call = events.call().clone();
    debug!(call = %call.id(), "Echo call started");
    ctx.info("Press Ctrl+C to stop");

    // Set up Ctrl+C handler
    {
        let call = call.clone();
        ctrlc::set_handler(move || {
            call.cancel();
        })?;
    }

    if let Some(secs) = timeout {
        let call = call.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if call.cancel() {
                debug!(call = %call.id(), secs, "Cancelled after timeout");
            }
        });
    }

    while let Some(event) = events.next().await {
        ctx.print_event(&event);
    }

    let status = call.status().await;
    if status.code == streamcall_client::Code::Cancelled {
        ctx.warn("Call cancelled");
    }
    Ok(status)
}
