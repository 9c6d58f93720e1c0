//! Ops CLI for gridcore (spec.md §9 "no CLI commands are part of the core"
//! — this binary is ambient tooling around the core, not a core feature).
//! Grounded on the teacher pack's `cli/` package's use of `clap::Parser` for
//! argument parsing, and on `toucan-core`'s use of `prettytable-rs` for
//! debug/ops table dumps.

use clap::{Parser, Subcommand};
use gridcore::config::AppConfig;
use gridcore::db::Db;
use gridcore::planner::types::{GridStatus, OrderState};
use gridcore::repository::{GridRepository, SqlxRepository};
use prettytable::{row, Table};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "gridcore-cli", version, about = "Operator tooling for the gridcore engine")]
struct Cli {
    /// Overrides DATABASE_URL for this invocation only.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Applies pending schema migrations and exits, without starting the
    /// scheduler or HTTP surface.
    Migrate,

    /// Prints a grid's current order ladder as a table.
    Ladder {
        grid_id: Uuid,
    },

    /// Lists grids, optionally filtered by portfolio and status. Read-only;
    /// safe to run against a production datastore.
    List {
        #[arg(long)]
        portfolio_id: Option<Uuid>,
        #[arg(long, value_enum)]
        status: Option<GridStatusArg>,
    },
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum GridStatusArg {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl From<GridStatusArg> for GridStatus {
    fn from(v: GridStatusArg) -> Self {
        match v {
            GridStatusArg::Active => GridStatus::Active,
            GridStatusArg::Paused => GridStatus::Paused,
            GridStatusArg::Completed => GridStatus::Completed,
            GridStatusArg::Cancelled => GridStatus::Cancelled,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();
    gridcore::logger::init_tracing(false);

    let cli = Cli::parse();
    let mut cfg = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    let db = Db::connect(&cfg.database_url).await?;

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            println!("migrations applied");
        }
        Command::Ladder { grid_id } => {
            let repo = SqlxRepository::new(db.pool.clone());
            print_ladder(&repo, grid_id).await?;
        }
        Command::List { portfolio_id, status } => {
            let repo = SqlxRepository::new(db.pool.clone());
            print_grid_list(&repo, portfolio_id, status.map(GridStatus::from)).await?;
        }
    }

    Ok(())
}

async fn print_ladder(repo: &SqlxRepository, grid_id: Uuid) -> anyhow::Result<()> {
    let Some(grid) = repo.fetch_grid(grid_id).await? else {
        anyhow::bail!("no grid with id {grid_id}");
    };
    let orders = repo.fetch_orders(grid_id).await?;

    println!(
        "grid {} ({}), status={:?}, bounds=[{}, {}], levels={}",
        grid.id, grid.symbol, grid.status, grid.lower_price, grid.upper_price, grid.level_count
    );

    let mut table = Table::new();
    table.add_row(row!["level", "side", "price", "quantity", "state"]);
    let mut sorted = orders;
    sorted.sort_by_key(|o| o.level_index);
    for order in &sorted {
        table.add_row(row![
            order.level_index,
            format!("{:?}", order.side),
            order.level_price,
            order.quantity,
            format!("{:?}", order.state),
        ]);
    }
    table.printstd();

    let pending = sorted.iter().filter(|o| o.state == OrderState::Pending).count();
    println!("{pending} pending of {} total orders", sorted.len());

    Ok(())
}

async fn print_grid_list(
    repo: &SqlxRepository,
    portfolio_id: Option<Uuid>,
    status: Option<GridStatus>,
) -> anyhow::Result<()> {
    let grids = repo.list_grids(portfolio_id, None, status).await?;

    let mut table = Table::new();
    table.add_row(row!["id", "symbol", "status", "lower", "upper", "levels"]);
    for grid in &grids {
        table.add_row(row![
            grid.id,
            grid.symbol,
            format!("{:?}", grid.status),
            grid.lower_price,
            grid.upper_price,
            grid.level_count,
        ]);
    }
    table.printstd();
    println!("{} grid(s)", grids.len());

    Ok(())
}
