use async_trait::async_trait;

use super::{Command, CommandResult, Session};

pub struct DropCommand;

#[async_trait]
impl Command for DropCommand {
    fn name(&self) -> &str {
        "/drop"
    }

    fn description(&self) -> &str {
        "simulate the server closing the channel"
    }

    async fn execute(&self, _args: &[&str], session: &Session<'_>) -> CommandResult {
        session.channel.handle_server_disconnect();
        println!("  channel dropped, /retry to reconnect");
        CommandResult::Handled
    }
}
