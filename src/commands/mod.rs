//! REPL commands prefixed with `/`.
//!
//! Commands implement the [`Command`] trait and are registered in a
//! [`CommandRegistry`], which handles dispatch, alias resolution and help
//! generation. Extra commands can be added with
//! `registry.register(Arc::new(MyCommand))`.

mod bid;
mod drop;
mod help;
mod join;
mod leave;
mod network;
mod quit;
mod retry;
mod status;

use async_trait::async_trait;
use std::sync::Arc;

use crate::channel::Channel;
use crate::network::ManualNetwork;

/// What commands get to act on.
pub struct Session<'a> {
    pub channel: &'a Channel,
    /// The network the channel watches; `/online` and `/offline` flip it.
    pub network: &'a ManualNetwork,
}

/// What the REPL should do after a command runs.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Not a command.
    NotACommand,
    /// Command handled, continue the REPL loop.
    Handled,
    /// Exit the REPL.
    Quit,
}

#[async_trait]
pub trait Command: Send + Sync {
    /// Primary name, e.g. `"/join"`.
    fn name(&self) -> &str;

    fn aliases(&self) -> &[&str] {
        &[]
    }

    /// Argument synopsis for `/help`, e.g. `"<auction-id>"`.
    fn usage(&self) -> &str {
        ""
    }

    /// One-line description for `/help`.
    fn description(&self) -> &str;

    async fn execute(&self, args: &[&str], session: &Session<'_>) -> CommandResult;
}

pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a registry with all built-in commands.
    pub fn new() -> Self {
        let commands: Vec<Arc<dyn Command>> = vec![
            Arc::new(help::HelpCommand),
            Arc::new(join::JoinCommand),
            Arc::new(leave::LeaveCommand),
            Arc::new(bid::BidCommand),
            Arc::new(network::OnlineCommand),
            Arc::new(network::OfflineCommand),
            Arc::new(drop::DropCommand),
            Arc::new(retry::RetryCommand),
            Arc::new(status::StatusCommand),
            Arc::new(quit::QuitCommand),
        ];
        Self { commands }
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.push(command);
    }

    /// Dispatch input to a matching command, or return `NotACommand`.
    pub async fn dispatch(&self, input: &str, session: &Session<'_>) -> CommandResult {
        let mut words = input.split_whitespace();
        let Some(cmd) = words.next() else {
            return CommandResult::NotACommand;
        };
        let args: Vec<&str> = words.collect();

        for command in &self.commands {
            if cmd == command.name() || command.aliases().contains(&cmd) {
                // /help needs the registry itself
                if command.name() == "/help" {
                    print!("{}", self.help_text());
                    return CommandResult::Handled;
                }
                return command.execute(&args, session).await;
            }
        }

        if cmd.starts_with('/') {
            println!("unknown command: {cmd}");
            println!("type /help for available commands");
            return CommandResult::Handled;
        }

        CommandResult::NotACommand
    }

    /// Generate help text from all registered commands.
    pub fn help_text(&self) -> String {
        let entries: Vec<(String, &str)> = self
            .commands
            .iter()
            .map(|c| (format_label(c.name(), c.aliases(), c.usage()), c.description()))
            .collect();

        let max_width = entries
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(10);

        let mut out = String::new();
        for (label, desc) in &entries {
            out.push_str(&format!("  {label:<max_width$}  {desc}\n"));
        }
        out
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    /// All registered names and aliases (for duplicate detection).
    pub fn all_triggers(&self) -> Vec<&str> {
        let mut triggers = Vec::new();
        for cmd in &self.commands {
            triggers.push(cmd.name());
            triggers.extend_from_slice(cmd.aliases());
        }
        triggers
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn format_label(name: &str, aliases: &[&str], usage: &str) -> String {
    let mut label = name.to_string();
    if !usage.is_empty() {
        label.push(' ');
        label.push_str(usage);
    }
    if !aliases.is_empty() {
        label.push_str(&format!(" ({})", aliases.join(", ")));
    }
    label
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::presence::NoPresence;
    use crate::transport::SimulatedTransport;
    use std::time::Duration;

    /// An offline channel plus its network, with an instant transport.
    pub(crate) fn fixture() -> (Channel, Arc<ManualNetwork>) {
        let network = Arc::new(ManualNetwork::new(false));
        let channel = Channel::builder()
            .network(network.clone())
            .transport(Arc::new(SimulatedTransport::new(Duration::ZERO)))
            .presence(Arc::new(NoPresence))
            .build();
        (channel, network)
    }

    #[test]
    fn all_builtins_registered() {
        let reg = CommandRegistry::new();
        let names = reg.names();
        for name in [
            "/help", "/join", "/leave", "/bid", "/online", "/offline", "/drop", "/retry",
            "/status", "/quit",
        ] {
            assert!(names.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn no_duplicate_triggers() {
        let reg = CommandRegistry::new();
        let triggers = reg.all_triggers();
        let mut seen = Vec::new();
        for t in &triggers {
            assert!(!seen.contains(t), "duplicate trigger: {t}");
            seen.push(t);
        }
    }

    #[test]
    fn help_text_includes_all_commands() {
        let reg = CommandRegistry::new();
        let text = reg.help_text();
        for name in reg.names() {
            assert!(text.contains(name), "help missing: {name}");
        }
        assert!(text.contains("<auction-id>"));
    }

    #[tokio::test]
    async fn dispatch_passes_arguments() {
        let (channel, network) = fixture();
        let session = Session {
            channel: &channel,
            network: &network,
        };
        let reg = CommandRegistry::new();
        assert_eq!(
            reg.dispatch("  /join   A1 ", &session).await,
            CommandResult::Handled
        );
        assert_eq!(channel.subscriptions(), vec!["A1"]);
    }

    #[tokio::test]
    async fn unknown_slash_command_is_handled() {
        let (channel, network) = fixture();
        let session = Session {
            channel: &channel,
            network: &network,
        };
        let reg = CommandRegistry::new();
        assert_eq!(
            reg.dispatch("/foobar", &session).await,
            CommandResult::Handled
        );
    }

    #[tokio::test]
    async fn non_command_passes_through() {
        let (channel, network) = fixture();
        let session = Session {
            channel: &channel,
            network: &network,
        };
        let reg = CommandRegistry::new();
        assert_eq!(
            reg.dispatch("hello", &session).await,
            CommandResult::NotACommand
        );
        assert_eq!(reg.dispatch("   ", &session).await, CommandResult::NotACommand);
    }

    #[tokio::test]
    async fn registered_command_works() {
        struct PingCommand;

        #[async_trait]
        impl Command for PingCommand {
            fn name(&self) -> &str {
                "/ping"
            }
            fn description(&self) -> &str {
                "pong"
            }
            async fn execute(&self, _args: &[&str], _session: &Session<'_>) -> CommandResult {
                CommandResult::Handled
            }
        }

        let (channel, network) = fixture();
        let session = Session {
            channel: &channel,
            network: &network,
        };
        let mut reg = CommandRegistry::new();
        reg.register(Arc::new(PingCommand));
        assert_eq!(reg.dispatch("/ping", &session).await, CommandResult::Handled);
        assert!(reg.help_text().contains("/ping"));
    }

    #[test]
    fn format_label_variants() {
        assert_eq!(format_label("/status", &[], ""), "/status");
        assert_eq!(format_label("/join", &[], "<id>"), "/join <id>");
        assert_eq!(format_label("/help", &["/h", "/?"], ""), "/help (/h, /?)");
    }
}
