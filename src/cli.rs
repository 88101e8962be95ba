use clap::{Parser, Subcommand};

/// KeySentinel — sentinel-token gateway for AI provider keys
#[derive(Parser)]
#[command(name = "keysentinel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (defaults to KEYSENTINEL_PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage stored provider keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Store a provider key and print its sentinel token
    Add {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        name: String,
        /// Provider id, e.g. openai or gemini
        #[arg(long)]
        provider: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        description: Option<String>,
        /// Address that receives usage alerts
        #[arg(long)]
        notify_email: Option<String>,
        #[arg(long, default_value_t = crate::models::credential::DEFAULT_RATE_LIMIT)]
        rate_limit: u64,
    },
    /// List an owner's keys (secrets masked)
    List {
        #[arg(long)]
        user_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_port_is_optional() {
        let cli = Cli::try_parse_from(["keysentinel", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: None })));

        let cli = Cli::try_parse_from(["keysentinel", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9000) })));
    }

    #[test]
    fn test_key_add_defaults_rate_limit() {
        let cli = Cli::try_parse_from([
            "keysentinel", "key", "add", "--user-id", "u1", "--name", "prod", "--provider",
            "openai", "--key", "sk-live",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Key {
                command: KeyCommands::Add { rate_limit, notify_email, .. },
            }) => {
                assert_eq!(rate_limit, 1000);
                assert!(notify_email.is_none());
            }
            _ => panic!("expected key add"),
        }
    }
}
