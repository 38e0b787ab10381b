use async_trait::async_trait;

use super::{Command, CommandResult, Session};

pub struct LeaveCommand;

#[async_trait]
impl Command for LeaveCommand {
    fn name(&self) -> &str {
        "/leave"
    }

    fn usage(&self) -> &str {
        "<auction-id>"
    }

    fn description(&self) -> &str {
        "unsubscribe from an auction"
    }

    async fn execute(&self, args: &[&str], session: &Session<'_>) -> CommandResult {
        let [auction_id] = args else {
            eprintln!("  ✗ usage: /leave <auction-id>");
            return CommandResult::Handled;
        };
        session.channel.leave_auction(auction_id);
        println!("  ✓ left {auction_id}");
        CommandResult::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture;

    #[tokio::test]
    async fn forgets_room() {
        let (channel, network) = fixture();
        let session = Session {
            channel: &channel,
            network: &network,
        };
        channel.join_auction("A1");
        channel.join_auction("A2");
        LeaveCommand.execute(&["A1"], &session).await;
        assert_eq!(channel.subscriptions(), vec!["A2"]);
    }
}
