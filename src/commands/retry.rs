use async_trait::async_trait;

use super::{Command, CommandResult, Session};
use crate::channel::Phase;

pub struct RetryCommand;

#[async_trait]
impl Command for RetryCommand {
    fn name(&self) -> &str {
        "/retry"
    }

    fn aliases(&self) -> &[&str] {
        &["/reconnect"]
    }

    fn description(&self) -> &str {
        "start a reconnect loop in the background"
    }

    async fn execute(&self, _args: &[&str], session: &Session<'_>) -> CommandResult {
        match session.channel.phase() {
            Phase::Disconnected => {
                let channel = session.channel.clone();
                tokio::spawn(async move { channel.reconnect().await });
                println!("  reconnecting…");
            }
            phase => println!("  nothing to do, channel is {phase:?}"),
        }
        CommandResult::Handled
    }
}
