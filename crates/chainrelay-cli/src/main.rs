use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chainrelay-cli")]
#[command(about = "CLI client for a chainrelay node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// Node base URL (e.g. http://127.0.0.1:5000)
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    node: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a block from the node's pending transactions
    Mine(Target),
    /// Print the node's full chain
    Chain(Target),
    /// Ask the node to validate its own chain
    Valid(Target),
    /// Queue a transaction for the next block
    Tx {
        #[command(flatten)]
        target: Target,
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        receiver: String,
        /// Amount
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
    },
    /// Register peers with the node
    Connect {
        #[command(flatten)]
        target: Target,
        /// Peer addresses, e.g. http://127.0.0.1:5001
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Run longest-chain resolution against the node's peers
    Replace(Target),
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    receiver: String,
    amount: f64,
}

#[derive(Serialize)]
struct Connect {
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let res = match cli.cmd {
        Command::Mine(target) => client.get(url(&target, "mine_block")).send().await?,
        Command::Chain(target) => client.get(url(&target, "get_chain")).send().await?,
        Command::Valid(target) => client.get(url(&target, "is_valid")).send().await?,
        Command::Tx {
            target,
            sender,
            receiver,
            amount,
        } => {
            let tx = Tx {
                sender,
                receiver,
                amount,
            };
            client
                .post(url(&target, "add_transaction"))
                .json(&tx)
                .send()
                .await?
        }
        Command::Connect { target, nodes } => {
            client
                .post(url(&target, "connect_nodes"))
                .json(&Connect { nodes })
                .send()
                .await?
        }
        Command::Replace(target) => client.get(url(&target, "replace_chain")).send().await?,
    };
    print_response(res).await
}

fn url(target: &Target, route: &str) -> String {
    let url = format!("{}/{route}", target.node.trim_end_matches('/'));
    debug!(%url, "sending request");
    url
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
