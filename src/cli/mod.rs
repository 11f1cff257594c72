use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::application::{BankService, DEFAULT_PAGE_SIZE};
use crate::domain::{Account, AccountId, Entry, Transfer, format_amount, parse_amount};
use crate::engine::TxContext;
use crate::storage::StoreConfig;

/// Simplebank - ledger-style banking backend
#[derive(Parser)]
#[command(name = "simplebank")]
#[command(about = "Accounts, ledger entries and atomic money transfers on SQLite")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "DB_SOURCE", default_value = "simplebank.db")]
    pub database: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// How long a transfer waits for the database write lock, in milliseconds
    #[arg(long, env = "DB_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Move money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account id
        #[arg(long)]
        from: AccountId,

        /// Destination account id
        #[arg(long)]
        to: AccountId,

        /// Currency both accounts must be held in
        #[arg(long)]
        currency: String,

        /// Abort the transfer if it has not completed within this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List ledger entries of an account
    Entries {
        /// Account id
        account: AccountId,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List transfers
    Transfers {
        /// Only transfers from or to this account
        #[arg(long)]
        account: Option<AccountId>,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Account owner
        #[arg(long)]
        owner: String,

        /// Currency (USD, EUR, CAD)
        #[arg(long)]
        currency: String,

        /// Opening balance (e.g., "100.00")
        #[arg(long, default_value = "0")]
        balance: String,
    },

    /// Show one account
    Show {
        /// Account id
        id: AccountId,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List accounts
    List {
        /// Only accounts of this owner
        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig::for_path(&self.database)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();

        match self.command {
            Commands::Init => {
                BankService::init(&config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Account(cmd) => {
                let service = BankService::connect(&config).await?;
                run_account_command(&service, cmd).await?;
            }

            Commands::Transfer {
                amount,
                from,
                to,
                currency,
                timeout_ms,
                format,
            } => {
                let service = BankService::connect(&config).await?;
                let amount =
                    parse_amount(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

                let mut ctx = TxContext::new();
                if let Some(ms) = timeout_ms {
                    ctx = ctx.with_timeout(Duration::from_millis(ms));
                }

                let result = service
                    .create_transfer(&ctx, from, to, amount, &currency)
                    .await?;

                match format {
                    OutputFormat::Json => print_json(&result)?,
                    OutputFormat::Table | OutputFormat::Csv => {
                        println!(
                            "Transfer {}: {} {} from #{} to #{}",
                            result.transfer.id,
                            format_amount(result.transfer.amount),
                            currency,
                            result.from_account.id,
                            result.to_account.id
                        );
                        println!(
                            "  #{:<6} {:>14}  (entry {})",
                            result.from_account.id,
                            format_amount(result.from_account.balance),
                            result.from_entry.id
                        );
                        println!(
                            "  #{:<6} {:>14}  (entry {})",
                            result.to_account.id,
                            format_amount(result.to_account.balance),
                            result.to_entry.id
                        );
                    }
                }
            }

            Commands::Entries {
                account,
                limit,
                offset,
                format,
            } => {
                let service = BankService::connect(&config).await?;
                let entries = service.list_entries(account, limit, offset).await?;
                print_entries(&entries, format)?;
            }

            Commands::Transfers {
                account,
                limit,
                offset,
                format,
            } => {
                let service = BankService::connect(&config).await?;
                let transfers = service.list_transfers(account, limit, offset).await?;
                print_transfers(&transfers, format)?;
            }
        }

        Ok(())
    }
}

async fn run_account_command(service: &BankService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            owner,
            currency,
            balance,
        } => {
            let opening =
                parse_amount(&balance).context("Invalid balance format. Use '50.00' or '50'")?;
            let account = service.create_account(&owner, &currency, opening).await?;
            println!(
                "Created account #{} for {} ({} {})",
                account.id,
                account.owner,
                format_amount(account.balance),
                account.currency
            );
        }

        AccountCommands::Show { id, format } => {
            let account = service.get_account(id).await?;
            match format {
                OutputFormat::Json => print_json(&account)?,
                OutputFormat::Csv => print_accounts(std::slice::from_ref(&account), format)?,
                OutputFormat::Table => {
                    println!("Account #{}", account.id);
                    println!("  Owner:    {}", account.owner);
                    println!("  Currency: {}", account.currency);
                    println!("  Balance:  {}", format_amount(account.balance));
                    println!(
                        "  Created:  {}",
                        account.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }

        AccountCommands::List {
            owner,
            limit,
            offset,
            format,
        } => {
            let accounts = service
                .list_accounts(owner.as_deref(), limit, offset)
                .await?;
            print_accounts(&accounts, format)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_csv<T: Serialize>(rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_accounts(accounts: &[Account], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(accounts),
        OutputFormat::Csv => print_csv(accounts),
        OutputFormat::Table => {
            if accounts.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }
            println!("{:<8} {:<20} {:>14} {:<8}", "ID", "OWNER", "BALANCE", "CURRENCY");
            println!("{}", "-".repeat(53));
            for account in accounts {
                println!(
                    "{:<8} {:<20} {:>14} {:<8}",
                    account.id,
                    truncate(&account.owner, 20),
                    format_amount(account.balance),
                    account.currency
                );
            }
            Ok(())
        }
    }
}

fn print_entries(entries: &[Entry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(entries),
        OutputFormat::Csv => print_csv(entries),
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No entries found.");
                return Ok(());
            }
            println!("{:<8} {:<20} {:<7} {:>14}", "ID", "DATE", "TYPE", "AMOUNT");
            println!("{}", "-".repeat(52));
            for entry in entries {
                println!(
                    "{:<8} {:<20} {:<7} {:>14}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry_kind(entry),
                    format_amount(entry.amount)
                );
            }
            Ok(())
        }
    }
}

fn print_transfers(transfers: &[Transfer], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(transfers),
        OutputFormat::Csv => print_csv(transfers),
        OutputFormat::Table => {
            if transfers.is_empty() {
                println!("No transfers found.");
                return Ok(());
            }
            println!(
                "{:<8} {:<20} {:>8} {:>8} {:>14}",
                "ID", "DATE", "FROM", "TO", "AMOUNT"
            );
            println!("{}", "-".repeat(62));
            for transfer in transfers {
                println!(
                    "{:<8} {:<20} {:>8} {:>8} {:>14}",
                    transfer.id,
                    transfer.created_at.format("%Y-%m-%d %H:%M:%S"),
                    transfer.from_account_id,
                    transfer.to_account_id,
                    format_amount(transfer.amount)
                );
            }
            Ok(())
        }
    }
}

fn entry_kind(entry: &Entry) -> &'static str {
    if entry.is_debit() { "debit" } else { "credit" }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
