use async_trait::async_trait;

use super::{Command, CommandResult, Session};

pub struct JoinCommand;

#[async_trait]
impl Command for JoinCommand {
    fn name(&self) -> &str {
        "/join"
    }

    fn usage(&self) -> &str {
        "<auction-id>"
    }

    fn description(&self) -> &str {
        "subscribe to an auction (deferred while disconnected)"
    }

    async fn execute(&self, args: &[&str], session: &Session<'_>) -> CommandResult {
        let [auction_id] = args else {
            eprintln!("  ✗ usage: /join <auction-id>");
            return CommandResult::Handled;
        };
        session.channel.join_auction(auction_id);
        if session.channel.is_live(auction_id) {
            println!("  ✓ joined {auction_id}");
        } else {
            println!("  … {auction_id} will go live on the next connect");
        }
        CommandResult::Handled
    }
}
