use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;

use crate::application::{LedgerService, Page};
use crate::domain::{Account, AccountId, Entry, Transfer, format_cents, parse_cents};
use crate::storage::{StoreConfig, TxContext};

/// Ledgerbank - transactional transfers between ledger accounts
#[derive(Parser)]
#[command(name = "ledgerbank")]
#[command(about = "Move money between ledger accounts with atomic, deadlock-free transfers")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "LEDGERBANK_DATABASE", default_value = "ledgerbank.db")]
    pub database: String,

    /// Maximum number of pooled database connections
    #[arg(long, env = "LEDGERBANK_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Transfer money between two accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account ID
        #[arg(long)]
        from: AccountId,

        /// Destination account ID
        #[arg(long)]
        to: AccountId,

        /// Currency both accounts must be held in (USD or EUR)
        #[arg(short, long)]
        currency: String,

        /// Give up if the transfer has not committed after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show a single transfer
    #[command(name = "show")]
    ShowTransfer {
        /// Transfer ID
        id: i64,
    },

    /// List transfers from one account or to another
    Transfers {
        /// Transfers leaving this account
        #[arg(long)]
        from: AccountId,

        /// Transfers arriving at this account (defaults to --from)
        #[arg(long)]
        to: Option<AccountId>,

        #[arg(short, long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// List ledger entries of an account
    Entries {
        /// Account ID
        account: AccountId,

        #[arg(short, long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Export the full history of an account as CSV
    Export {
        /// What to export: entries, transfers
        export_type: String,

        /// Account ID
        account: AccountId,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register an account holder
    Create {
        /// Unique username, used as account owner
        username: String,

        /// Full name
        #[arg(long)]
        full_name: String,

        /// Unique email address
        #[arg(long)]
        email: String,
    },

    /// Show user details
    Show {
        /// Username
        username: String,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Owner's username
        owner: String,

        /// Currency code: USD, EUR, CAD
        #[arg(short, long, default_value = "EUR")]
        currency: String,

        /// Opening balance (e.g., "100.00")
        #[arg(short, long)]
        balance: Option<String>,
    },

    /// Show account details
    Show {
        /// Account ID
        id: AccountId,
    },

    /// List accounts of an owner
    List {
        /// Account owner
        owner: String,

        #[arg(short, long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Delete an account with no ledger history
    Delete {
        /// Account ID
        id: AccountId,
    },
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig::for_path(&self.database).with_max_connections(self.max_connections)
    }

    async fn connect(&self) -> Result<LedgerService> {
        LedgerService::connect(&self.store_config())
            .await
            .with_context(|| format!("Failed to open database '{}'", self.database))
    }

    pub async fn run(self) -> Result<()> {
        match &self.command {
            Commands::Init => {
                LedgerService::init(&self.store_config()).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::User(cmd) => {
                let service = self.connect().await?;
                run_user_command(&service, cmd, self.json).await?;
            }

            Commands::Account(cmd) => {
                let service = self.connect().await?;
                run_account_command(&service, cmd, self.json).await?;
            }

            Commands::Transfer {
                amount,
                from,
                to,
                currency,
                timeout,
            } => {
                let service = self.connect().await?;
                let amount =
                    parse_cents(amount).context("Invalid amount format. Use '50.00' or '50'")?;

                let ctx = TxContext::new();
                let ctx = match timeout {
                    Some(secs) => ctx.with_timeout(Duration::from_secs(*secs)),
                    None => ctx,
                };

                // Ctrl-C before the commit rolls the transfer back.
                let interrupt = ctx.cancellation_token().clone();
                let watcher = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        interrupt.cancel();
                    }
                });

                let result = service.transfer(&ctx, *from, *to, amount, currency).await;
                watcher.abort();
                let result = result?;

                if self.json {
                    print_json(&result)?;
                } else {
                    println!(
                        "Transferred {} {} from account {} to account {} (transfer {})",
                        format_cents(result.transfer.amount),
                        currency.to_uppercase(),
                        result.from_account.id,
                        result.to_account.id,
                        result.transfer.id
                    );
                    println!(
                        "  Account {} balance: {}",
                        result.from_account.id,
                        format_cents(result.from_account.balance)
                    );
                    println!(
                        "  Account {} balance: {}",
                        result.to_account.id,
                        format_cents(result.to_account.balance)
                    );
                }
            }

            Commands::ShowTransfer { id } => {
                let service = self.connect().await?;
                let transfer = service.get_transfer(*id).await?;
                if self.json {
                    print_json(&transfer)?;
                } else {
                    print_transfers(&[transfer]);
                }
            }

            Commands::Transfers {
                from,
                to,
                limit,
                offset,
            } => {
                let service = self.connect().await?;
                let page = Page {
                    limit: *limit,
                    offset: *offset,
                };
                let transfers = service
                    .list_transfers(*from, to.unwrap_or(*from), page)
                    .await?;
                if self.json {
                    print_json(&transfers)?;
                } else if transfers.is_empty() {
                    println!("No transfers found.");
                } else {
                    print_transfers(&transfers);
                }
            }

            Commands::Entries {
                account,
                limit,
                offset,
            } => {
                let service = self.connect().await?;
                let page = Page {
                    limit: *limit,
                    offset: *offset,
                };
                let entries = service.list_entries(*account, page).await?;
                if self.json {
                    print_json(&entries)?;
                } else if entries.is_empty() {
                    println!("No entries found.");
                } else {
                    print_entries(&entries);
                }
            }

            Commands::Export {
                export_type,
                account,
                output,
            } => {
                let service = self.connect().await?;
                run_export_command(&service, export_type, *account, output.as_deref()).await?;
            }
        }

        Ok(())
    }
}

async fn run_user_command(service: &LedgerService, cmd: &UserCommands, json: bool) -> Result<()> {
    match cmd {
        UserCommands::Create {
            username,
            full_name,
            email,
        } => {
            let user = service.register_user(username, full_name, email).await?;
            if json {
                print_json(&user)?;
            } else {
                println!("Created user {} <{}>", user.username, user.email);
            }
        }

        UserCommands::Show { username } => {
            let user = service.get_user(username).await?;
            if json {
                print_json(&user)?;
            } else {
                println!("User: {}", user.username);
                println!("  Name:    {}", user.full_name);
                println!("  Email:   {}", user.email);
                println!("  Created: {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
    Ok(())
}

async fn run_account_command(
    service: &LedgerService,
    cmd: &AccountCommands,
    json: bool,
) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            owner,
            currency,
            balance,
        } => {
            let opening_balance = balance
                .as_deref()
                .map(parse_cents)
                .transpose()
                .context("Invalid opening balance format")?
                .unwrap_or(0);
            let account = service
                .open_account(owner, currency, opening_balance)
                .await?;
            if json {
                print_json(&account)?;
            } else {
                println!(
                    "Created account {} for {} ({})",
                    account.id, account.owner, account.currency
                );
            }
        }

        AccountCommands::Show { id } => {
            let account = service.get_account(*id).await?;
            if json {
                print_json(&account)?;
            } else {
                println!("Account: {}", account.id);
                println!("  Owner:    {}", account.owner);
                println!("  Currency: {}", account.currency);
                println!("  Balance:  {}", format_cents(account.balance));
                println!(
                    "  Created:  {}",
                    account.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        AccountCommands::List {
            owner,
            limit,
            offset,
        } => {
            let page = Page {
                limit: *limit,
                offset: *offset,
            };
            let accounts = service.list_accounts(owner, page).await?;
            if json {
                print_json(&accounts)?;
            } else if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                print_accounts(&accounts);
            }
        }

        AccountCommands::Delete { id } => {
            service.close_account(*id).await?;
            if json {
                print_json(&deletion_report(*id))?;
            } else {
                println!("Deleted account {}", id);
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    account: AccountId,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = match export_type {
        "entries" => exporter.export_entries_csv(account, writer).await?,
        "transfers" => exporter.export_transfers_csv(account, writer).await?,
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: entries, transfers",
                export_type
            );
        }
    };

    if output.is_some() {
        eprintln!("Exported {} {}", count, export_type);
    }
    Ok(())
}

fn deletion_report(id: AccountId) -> serde_json::Value {
    serde_json::json!({ "deleted": id })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    println!(
        "{:<8} {:<20} {:<8} {:>15}",
        "ID", "OWNER", "CURRENCY", "BALANCE"
    );
    println!("{}", "-".repeat(54));
    for account in accounts {
        println!(
            "{:<8} {:<20} {:<8} {:>15}",
            account.id,
            account.owner,
            account.currency,
            format_cents(account.balance)
        );
    }
}

fn print_transfers(transfers: &[Transfer]) {
    println!(
        "{:<8} {:<8} {:<8} {:>15}  {}",
        "ID", "FROM", "TO", "AMOUNT", "CREATED"
    );
    println!("{}", "-".repeat(62));
    for transfer in transfers {
        println!(
            "{:<8} {:<8} {:<8} {:>15}  {}",
            transfer.id,
            transfer.from_account_id,
            transfer.to_account_id,
            format_cents(transfer.amount),
            transfer.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn print_entries(entries: &[Entry]) {
    println!("{:<8} {:<8} {:>15}  {}", "ID", "ACCOUNT", "AMOUNT", "CREATED");
    println!("{}", "-".repeat(54));
    for entry in entries {
        println!(
            "{:<8} {:<8} {:>15}  {}",
            entry.id,
            entry.account_id,
            format_cents(entry.amount),
            entry.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
