use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use cloudbill_invoices::config::InvoicesConfig;
use cloudbill_invoices::domain::{
    CustomerId, InvoiceManager, InvoiceOperations, ResourceCatalog, ResourceId, ResourceKind,
    ResourceRef,
};
use cloudbill_invoices::storage::{InMemoryLedger, LedgerSnapshot};
use cloudbill_invoices::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
#[command(name = "cloudbill-invoices")]
#[command(about = "Monthly invoicing over a ledger snapshot file")]
struct Args {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Print the default configuration as TOML")]
    gen_config: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print price, tax and totals of every invoice
    Summary {
        #[arg(long)]
        customer: Option<String>,
        #[arg(long, help = "Reference time for current amounts (RFC 3339)")]
        at: Option<DateTime<Utc>>,
    },
    /// Issue last month's invoices and open the current month
    Rollover {
        #[arg(long, help = "Run as of this instant instead of now (RFC 3339)")]
        at: Option<DateTime<Utc>>,
    },
    /// Report an outage of a resource and credit it
    Downtime {
        #[arg(long)]
        kind: ResourceKind,
        #[arg(long)]
        resource: ResourceId,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.gen_config {
        let toml = toml::to_string_pretty(&InvoicesConfig::default())?;
        println!("{}", toml);
        return Ok(());
    }

    let config = InvoicesConfig::load(args.config)?;
    telemetry::init_logging(&args.verbosity, &config.logging)?;

    let command = args
        .command
        .ok_or_else(|| anyhow!("no command given, see --help"))?;

    info!(
        environment = %config.service.environment,
        service_id = %config.service.service_id,
        ledger = %config.ledger.snapshot_path.display(),
        "Loading ledger"
    );
    let snapshot = LedgerSnapshot::load(&config.ledger.snapshot_path)?;
    let catalog = Arc::new(ResourceCatalog::with_resources(snapshot.resources.clone()));
    let ledger = Arc::new(InMemoryLedger::from_snapshot(snapshot)?);
    let manager = InvoiceManager::new(
        ledger.clone(),
        ledger.clone(),
        catalog.clone(),
        config.policy(),
    );

    match command {
        Command::Summary { customer, at } => {
            let customer = customer.map(CustomerId::new);
            print_summary(&manager, customer.as_ref(), at.unwrap_or_else(Utc::now)).await?;
            return Ok(());
        }
        Command::Rollover { at } => {
            let report = manager.rollover(at.unwrap_or_else(Utc::now)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Downtime {
            kind,
            resource,
            start,
            end,
        } => {
            let resource = ResourceRef::new(kind, resource);
            let outcome = manager
                .report_downtime(resource, start, end, Utc::now())
                .await?;
            println!("Accepted downtime {}", outcome.period.id);
            for item in &outcome.compensations {
                println!(
                    "Compensation {} on invoice {}: {}",
                    manager.item_name(item),
                    item.invoice_id,
                    item.price()?.round_dp(2)
                );
            }
        }
    }

    let mut snapshot = ledger.export().await;
    snapshot.resources = catalog.list();
    snapshot.save(&config.ledger.snapshot_path)?;
    Ok(())
}

async fn print_summary(
    manager: &InvoiceManager,
    customer: Option<&CustomerId>,
    now: DateTime<Utc>,
) -> Result<()> {
    for invoice in manager.list_invoices(customer).await? {
        let summary = manager.summary(&invoice.id, now).await?;
        println!(
            "{:>7}  {:<32} {:<9} items={:<3} price={:>10} total={:>10} current={:>10}",
            summary.number,
            invoice.to_string(),
            summary.state.to_string(),
            summary.item_count,
            summary.price.round_dp(2),
            summary.total.round_dp(2),
            summary.total_current.round_dp(2),
        );
    }
    Ok(())
}
