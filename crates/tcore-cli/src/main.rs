use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tcore")]
#[command(about = "Trading Core operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> tenant overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Inspect trading intents for a tenant
    Intents {
        #[command(subcommand)]
        cmd: IntentsCmd,
    },

    /// Inspect operations for a tenant
    Operations {
        #[command(subcommand)]
        cmd: OperationsCmd,
    },

    /// Inspect the monthly policy state for a tenant
    Policy {
        #[command(subcommand)]
        cmd: PolicyCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum IntentsCmd {
    /// List intents, optionally filtered by status (PENDING|VALIDATED|EXECUTED|FAILED|CANCELLED)
    List {
        #[arg(long)]
        tenant: i64,
        #[arg(long)]
        status: Option<String>,
    },
    /// Fetch a single intent by id
    Get {
        #[arg(long)]
        tenant: i64,
        intent_id: uuid::Uuid,
    },
}

#[derive(Subcommand)]
enum OperationsCmd {
    /// List operations, optionally filtered by status (PLANNED|ACTIVE|CLOSED|CANCELLED)
    List {
        #[arg(long)]
        tenant: i64,
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum PolicyCmd {
    /// Show the policy state for a tenant/month (month format: YYYY-MM)
    Show {
        #[arg(long)]
        tenant: i64,
        #[arg(long)]
        month: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tcore_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tcore_db::status(&pool).await?;
                    println!("db_ok={} has_core_tables={}", s.ok, s.has_core_tables);
                }
                DbCmd::Migrate => {
                    tcore_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = tcore_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Intents { cmd } => {
            let pool = tcore_db::connect_from_env().await?;
            match cmd {
                IntentsCmd::List { tenant, status } => {
                    let intents =
                        tcore_db::list_trading_intents(&pool, tenant, status.as_deref()).await?;
                    for i in intents {
                        println!(
                            "{} {:?} {} {:?} entry={} stop={} qty={} capital={}",
                            i.intent_id,
                            i.side,
                            i.symbol,
                            i.status,
                            i.entry_price,
                            i.stop_price,
                            i.quantity,
                            i.capital,
                        );
                    }
                }
                IntentsCmd::Get { tenant, intent_id } => {
                    let i = tcore_db::fetch_trading_intent(&pool, tenant, intent_id).await?;
                    println!("{}", serde_json::to_string_pretty(&i)?);
                }
            }
        }

        Commands::Operations { cmd } => {
            let pool = tcore_db::connect_from_env().await?;
            match cmd {
                OperationsCmd::List { tenant, status } => {
                    let ops = tcore_db::list_operations(&pool, tenant, status.as_deref()).await?;
                    for op in ops {
                        println!(
                            "{} {:?} {} {:?} entry={} stop={} filled={}",
                            op.id,
                            op.side,
                            op.symbol,
                            op.status,
                            op.weighted_entry_price,
                            op.stop_price,
                            op.filled_quantity,
                        );
                    }
                }
            }
        }

        Commands::Policy { cmd } => {
            let pool = tcore_db::connect_from_env().await?;
            match cmd {
                PolicyCmd::Show { tenant, month } => {
                    match tcore_db::fetch_policy_state(&pool, tenant, &month).await? {
                        Some(p) => println!("{}", serde_json::to_string_pretty(&policy_view(&p))?),
                        None => println!("no policy state for tenant={tenant} month={month}"),
                    }
                }
            }
        }
    }

    Ok(())
}

fn policy_view(p: &tcore_schemas::PolicyState) -> serde_json::Value {
    serde_json::json!({
        "tenant_id": p.tenant_id,
        "month": p.month,
        "status": p.status,
        "starting_capital": p.starting_capital.to_string(),
        "current_capital": p.current_capital.to_string(),
        "realized_pnl": p.realized_pnl.to_string(),
        "unrealized_pnl": p.unrealized_pnl.to_string(),
        "trade_count": p.trade_count,
        "winning_trades": p.winning_trades,
        "max_drawdown_percent": p.max_drawdown_percent,
        "max_trades_per_day": p.max_trades_per_day,
        "paused_at": p.paused_at,
        "pause_reason": p.pause_reason,
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}
