use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tether_cli::agent::{LocalAgent, NETWORK_DIR, REPLIES_DIR};
use tether_cli::client::ReplyDir;
use tether_cli::context::ClaimContext;
use tether_cli::home::Home;
use tether_cli::output::OutputFormat;
use tether_cli::session::Session;
use tether_cli::shell::Shell;
use tether_cli::wallet::Wallet;

#[derive(Parser)]
#[command(name = "tether", version, about = "Identity-network command shell")]
struct Cli {
    /// Output format for command results.
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Override the Tether home directory.
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a named environment.
    Connect { env: String },
    /// Drop the current environment connection.
    Disconnect,
    /// Show the current connection state.
    Status,
    /// Create an identifying key in the default keyring.
    NewKey,
    /// Load a link invitation from a file.
    Load { file: PathBuf },
    /// Print an invitation file without loading it.
    ShowFile { file: PathBuf },
    /// Link lifecycle operations.
    #[command(subcommand)]
    Link(LinkCommand),
    /// Claim operations.
    #[command(subcommand)]
    Claim(ClaimCommand),
}

#[derive(Subcommand)]
enum LinkCommand {
    /// Synchronize a link against the ledger.
    Sync { name: String },
    /// Accept a link invitation.
    Accept { name: String },
    /// Ping the link's remote endpoint.
    Ping { name: String },
    /// Show a link's stored state.
    Show { name: String },
}

#[derive(Subcommand)]
enum ClaimCommand {
    /// Show a received or offered claim.
    Show { name: String },
    /// Request a claim offered by a link.
    Request { name: String },
    /// Show a claim proof request and make it the current context.
    ShowRequest { name: String },
    /// Set a self-attested attribute in the current context.
    Set { name: String, value: String },
    /// Send a claim proof to a link.
    Send {
        name: String,
        /// Link the proof is addressed to.
        #[arg(long)]
        to: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let home = match &cli.home {
        Some(path) => Home::at(path.clone())?,
        None => Home::resolve()?,
    };
    let root = home.root();

    let wallet = Wallet::open(root)?;
    let session = Session::open(root)?;
    let agent = LocalAgent::open(root, session.clone())?;
    let client = Arc::new(ReplyDir::new(
        root.join(NETWORK_DIR).join(REPLIES_DIR),
    ));
    let mut shell =
        Shell::new(wallet, agent, client, session).with_context(ClaimContext::load(root)?);

    let output = match cli.command {
        Command::Connect { env } => shell.connect(&env)?,
        Command::Disconnect => shell.disconnect()?,
        Command::Status => shell.status()?,
        Command::NewKey => shell.new_key()?,
        Command::Load { file } => shell.load_invitation(&file)?,
        Command::ShowFile { file } => shell.show_file(&file)?,
        Command::Link(command) => match command {
            LinkCommand::Sync { name } => shell.sync_link(&name).await?,
            LinkCommand::Accept { name } => shell.accept_invitation(&name).await?,
            LinkCommand::Ping { name } => shell.ping(&name).await?,
            LinkCommand::Show { name } => shell.show_link(&name)?,
        },
        Command::Claim(command) => match command {
            ClaimCommand::Show { name } => shell.show_claim(&name).await?,
            ClaimCommand::Request { name } => shell.request_claim(&name).await?,
            ClaimCommand::ShowRequest { name } => shell.show_claim_request(&name).await?,
            ClaimCommand::Set { name, value } => shell.set_attribute(&name, &value),
            ClaimCommand::Send { name, to } => shell.send_claim(&name, &to).await?,
        },
    };
    shell.context().store(root)?;
    output.render(cli.output)
}
