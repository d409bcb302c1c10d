//! Inspect a converted table directory: dump the schema, per-column file
//! sizes, and sample rows in a human-readable format.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin inspect -- --table-dir data/tpcc.columns/item
//! cargo run --release --bin inspect -- --table-dir data/tpcc.columns/item --sample-rows 10
//! ```

use std::path::PathBuf;

use clap::Parser;
use colfile::view::TableView;
use indicatif::HumanBytes;

#[derive(Parser, Debug)]
#[command(about = "Inspect a converted table directory")]
struct Args {
    /// Path to one table directory (holding `__schema__`).
    #[arg(long)]
    table_dir: PathBuf,

    /// Number of sample rows to dump (0 to skip).
    #[arg(long, default_value_t = 5)]
    sample_rows: usize,
}

const CELL_WIDTH: usize = 18;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let table = TableView::open(&args.table_dir)?;

    let total_bytes: usize = (0..table.num_cols())
        .map(|ci| table.column(ci).byte_len())
        .sum();

    // ── Overview ──────────────────────────────────────────────────────────
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Table: {}", table.dir().display());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Rows:    {:>10}", table.num_rows());
    println!("║  Columns: {:>10}", table.num_cols());
    println!("║  Size:    {:>10}", HumanBytes(total_bytes as u64).to_string());
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ── Columns ──────────────────────────────────────────────────────────
    println!("┌─ Columns");
    for (ci, def) in table.columns().iter().enumerate() {
        let view = table.column(ci);
        println!(
            "│  [{ci}] {} : {}  ({})",
            def.name,
            def.logical_type,
            HumanBytes(view.byte_len() as u64)
        );
    }

    // ── Sample rows ──────────────────────────────────────────────────────
    if args.sample_rows > 0 {
        let n = table.num_rows();
        let show = n.min(args.sample_rows);

        println!("│");
        println!("│  Sample rows (first {show} of {n}):");

        print!("│  {:>6}", "row");
        for def in table.columns() {
            let truncated: String = def.name.chars().take(CELL_WIDTH).collect();
            print!(" │ {truncated:>CELL_WIDTH$}");
        }
        println!();

        print!("│  {:─>6}", "");
        for _ in table.columns() {
            print!("─┼─{:─>CELL_WIDTH$}", "");
        }
        println!();

        for row in 0..show {
            print!("│  {row:>6}");
            for ci in 0..table.num_cols() {
                let cell = table.column(ci).value(row).to_string();
                let truncated: String = cell.chars().take(CELL_WIDTH).collect();
                print!(" │ {truncated:>CELL_WIDTH$}");
            }
            println!();
        }
        if n > show {
            println!("│  ... ({} more rows)", n - show);
        }
    }
    println!("└──────────────────────────────────────────────────────────────");

    Ok(())
}
