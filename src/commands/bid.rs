use async_trait::async_trait;

use super::{Command, CommandResult, Session};
use crate::consts::format_amount;

pub struct BidCommand;

#[async_trait]
impl Command for BidCommand {
    fn name(&self) -> &str {
        "/bid"
    }

    fn usage(&self) -> &str {
        "<auction-id> <amount>"
    }

    fn description(&self) -> &str {
        "simulate a bid pushed by the server"
    }

    async fn execute(&self, args: &[&str], session: &Session<'_>) -> CommandResult {
        let [auction_id, amount] = args else {
            eprintln!("  ✗ usage: /bid <auction-id> <amount>");
            return CommandResult::Handled;
        };
        let amount: u64 = match amount.parse() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("  ✗ invalid amount: {amount}");
                return CommandResult::Handled;
            }
        };
        if !session.channel.simulate_new_bid(auction_id, amount) {
            eprintln!("  ✗ {auction_id} is not live, bid of {} dropped", format_amount(amount));
        }
        CommandResult::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture;
    use crate::events::EventKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn publishes_on_live_room() {
        let (channel, network) = fixture();
        network.set_online(true);
        channel.connect().await.unwrap();
        channel.join_auction("A1");

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        channel.on(EventKind::NewBid, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let session = Session {
            channel: &channel,
            network: &network,
        };
        BidCommand.execute(&["A1", "7000"], &session).await;
        BidCommand.execute(&["A1", "lots"], &session).await;
        BidCommand.execute(&["A2", "7000"], &session).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
