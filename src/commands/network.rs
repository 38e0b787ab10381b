use async_trait::async_trait;

use super::{Command, CommandResult, Session};

pub struct OnlineCommand;

#[async_trait]
impl Command for OnlineCommand {
    fn name(&self) -> &str {
        "/online"
    }

    fn description(&self) -> &str {
        "bring the network back"
    }

    async fn execute(&self, _args: &[&str], session: &Session<'_>) -> CommandResult {
        if !session.network.set_online(true) {
            println!("  network already online");
        }
        CommandResult::Handled
    }
}

pub struct OfflineCommand;

#[async_trait]
impl Command for OfflineCommand {
    fn name(&self) -> &str {
        "/offline"
    }

    fn description(&self) -> &str {
        "take the network down"
    }

    async fn execute(&self, _args: &[&str], session: &Session<'_>) -> CommandResult {
        if !session.network.set_online(false) {
            println!("  network already offline");
        }
        CommandResult::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture;
    use crate::network::NetworkStatus;

    #[tokio::test]
    async fn toggles_network() {
        let (channel, network) = fixture();
        let session = Session {
            channel: &channel,
            network: &network,
        };
        OnlineCommand.execute(&[], &session).await;
        assert!(network.is_online());
        OfflineCommand.execute(&[], &session).await;
        assert!(!network.is_online());
    }
}
