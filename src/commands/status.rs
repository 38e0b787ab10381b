use async_trait::async_trait;

use super::{Command, CommandResult, Session};
use crate::network::NetworkStatus;

pub struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    fn name(&self) -> &str {
        "/status"
    }

    fn description(&self) -> &str {
        "show connection state and subscriptions"
    }

    async fn execute(&self, _args: &[&str], session: &Session<'_>) -> CommandResult {
        let channel = session.channel;
        let network = if session.network.is_online() {
            "online"
        } else {
            "offline"
        };
        println!("  network   {network}");
        println!("  phase     {:?}", channel.phase());
        if channel.is_reconnecting() || channel.max_attempts_reached() {
            println!(
                "  attempt   {}/{}",
                channel.attempt(),
                channel.config().max_reconnect_attempts
            );
        }
        if channel.max_attempts_reached() {
            println!("  gave up, /retry to try again");
        }
        let rooms = channel.subscriptions();
        if rooms.is_empty() {
            println!("  rooms     none");
        }
        for room in rooms {
            let state = if channel.is_live(&room) { "live" } else { "pending" };
            println!("  room      {room} ({state})");
        }
        CommandResult::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture;

    #[tokio::test]
    async fn returns_handled() {
        let (channel, network) = fixture();
        channel.join_auction("A1");
        let session = Session {
            channel: &channel,
            network: &network,
        };
        assert_eq!(
            StatusCommand.execute(&[], &session).await,
            CommandResult::Handled
        );
    }
}
