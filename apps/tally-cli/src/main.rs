use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tally_client::{RetryPolicy, RpcClient};
use tally_core::{AccountId, Currency};
use tally_transport::udp::UdpAdapter;

type Client = RpcClient<UdpAdapter>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(long, short, default_value = "127.0.0.1:8080", env = "TALLY_ADDR")]
    server: String,
    /// Milliseconds to wait for a reply before retransmitting
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    /// Sends per request, including the first
    #[arg(long, default_value_t = 3)]
    attempts: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Credentials {
    #[arg(long)]
    name: String,
    #[arg(long)]
    password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new account
    Open {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long, default_value = "USD")]
        currency: Currency,
        #[arg(long, default_value_t = 0.0)]
        balance: f64,
    },
    /// Close an account
    Close {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long)]
        account: AccountId,
    },
    /// Deposit into an account
    Deposit {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: f64,
    },
    /// Withdraw from an account
    Withdraw {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: f64,
    },
    /// Show an account's balance
    Balance {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long)]
        account: AccountId,
    },
    /// Move funds to another account
    Transfer {
        #[command(flatten)]
        auth: Credentials,
        #[arg(long)]
        from: AccountId,
        #[arg(long)]
        to: AccountId,
        #[arg(long)]
        amount: f64,
    },
    /// Subscribe and print balance updates until the window closes
    Monitor {
        #[arg(long, default_value_t = 60)]
        seconds: u32,
    },
}

fn monitor(client: &mut Client, seconds: u32) -> Result<()> {
    let ack = client.subscribe(seconds).context("subscribe failed")?;
    println!("{ack}");
    let deadline = Instant::now() + Duration::from_secs(u64::from(seconds));
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if let Some(update) = client.poll_callback(deadline - now) {
            println!(
                "account {} balance {:.2}",
                update.account_id, update.balance
            );
        }
    }
    println!("subscription expired");
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let policy = RetryPolicy {
        attempt_timeout: Duration::from_millis(cli.timeout_ms),
        max_attempts: cli.attempts.max(1),
    };
    let mut client = RpcClient::connect_udp(&cli.server, policy)
        .with_context(|| format!("cannot reach {}", cli.server))?;

    match cli.command {
        Commands::Open {
            auth,
            currency,
            balance,
        } => {
            let id = client.open_account(&auth.name, &auth.password, currency, balance)?;
            println!("opened account {id} ({currency}) with balance {balance:.2}");
        }
        Commands::Close { auth, account } => {
            println!("{}", client.close_account(&auth.name, &auth.password, account)?);
        }
        Commands::Deposit {
            auth,
            account,
            amount,
        } => {
            let balance = client.deposit(&auth.name, &auth.password, account, amount)?;
            println!("balance {balance:.2}");
        }
        Commands::Withdraw {
            auth,
            account,
            amount,
        } => {
            let balance = client.withdraw(&auth.name, &auth.password, account, amount)?;
            println!("balance {balance:.2}");
        }
        Commands::Balance { auth, account } => {
            let balance = client.check_balance(&auth.name, &auth.password, account)?;
            println!("balance {balance:.2}");
        }
        Commands::Transfer {
            auth,
            from,
            to,
            amount,
        } => {
            let balance = client.transfer(&auth.name, &auth.password, from, to, amount)?;
            println!("transferred {amount:.2} to {to}; balance {balance:.2}");
        }
        Commands::Monitor { seconds } => monitor(&mut client, seconds)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let filter = std::env::var("TALLY_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse())
}
