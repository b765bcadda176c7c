//! Say command - unary echo

use anyhow::Result;
use streamcall_client::echo::{EchoClient, EchoRequest};
use streamcall_client::Status;

use crate::output::OutputContext;

pub async fn say(client: &EchoClient, message: &str, ctx: &OutputContext) -> Result<Status> {
    match client.say(&EchoRequest::new(message)).await {
        Ok(response) => {
            ctx.print_reply(&response);
            Ok(Status::ok())
        }
        Err(status) => {
            ctx.print_status(&status);
            Ok(status)
        }
    }
}
