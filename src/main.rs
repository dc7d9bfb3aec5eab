use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::info;

use merch_storefront::{
    category_distribution, get_all_products, get_products_by_category, insert_products, load_csv,
    logging, setup_database, verify_count, CategoryReconciler, Settings, SqliteProductRepository,
};

#[derive(Parser)]
#[command(name = "merch-storefront")]
#[command(about = "Catalog maintenance for the merch storefront")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog tables
    Init,
    /// Import products from a CSV file (id,name,category,description,brand,image_url)
    Import {
        csv: PathBuf,
    },
    /// List products
    Products {
        /// Only products in this category ("" for uncategorized)
        #[arg(long)]
        category: Option<String>,
    },
    /// Show how many products each category holds
    Categories,
    /// Print the category mapping in use
    Taxonomy,
    /// Normalize every product's category against the mapping
    Reconcile {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.settings.log_json);

    match &cli.command {
        Commands::Init => run_init(&cli.settings),
        Commands::Import { csv } => run_import(&cli.settings, csv),
        Commands::Products { category } => run_products(&cli.settings, category.as_deref()),
        Commands::Categories => run_categories(&cli.settings),
        Commands::Taxonomy => run_taxonomy(&cli.settings),
        Commands::Reconcile { dry_run } => run_reconcile(&cli.settings, *dry_run),
    }
}

fn open_database(settings: &Settings) -> Result<Connection> {
    if !settings.db.exists() {
        anyhow::bail!(
            "Database not found at {:?} (run `merch-storefront init` first)",
            settings.db
        );
    }

    Connection::open(&settings.db)
        .with_context(|| format!("Failed to open database {:?}", settings.db))
}

fn run_init(settings: &Settings) -> Result<()> {
    let conn = Connection::open(&settings.db)
        .with_context(|| format!("Failed to create database {:?}", settings.db))?;
    setup_database(&conn)?;

    println!("✓ Database initialized at {:?}", settings.db);
    Ok(())
}

fn run_import(settings: &Settings, csv_path: &Path) -> Result<()> {
    println!("📂 Loading {:?}...", csv_path);
    let products = load_csv(csv_path)?;
    println!("✓ Loaded {} products from CSV", products.len());

    let conn = Connection::open(&settings.db)
        .with_context(|| format!("Failed to open database {:?}", settings.db))?;
    setup_database(&conn)?;

    let inserted = insert_products(&conn, &products)?;
    let count = verify_count(&conn)?;

    println!("✓ Inserted: {} products", inserted);
    println!("✓ Skipped duplicates: {}", products.len() - inserted);
    println!("✓ Database contains {} products", count);
    Ok(())
}

fn run_products(settings: &Settings, category: Option<&str>) -> Result<()> {
    let conn = open_database(settings)?;

    let products = match category {
        Some(label) => get_products_by_category(&conn, label)?,
        None => get_all_products(&conn)?,
    };

    for product in &products {
        println!(
            "{:<38} {:<40} {}",
            product.id,
            product.name,
            match product.category_label() {
                "" => "(empty)",
                label => label,
            }
        );
    }
    println!("\n{} products", products.len());
    Ok(())
}

fn run_categories(settings: &Settings) -> Result<()> {
    let conn = open_database(settings)?;

    println!("📂 Category distribution");
    println!("{}", "━".repeat(40));
    for row in category_distribution(&conn)? {
        let label = if row.category.is_empty() { "(empty)" } else { row.category.as_str() };
        println!("   {:<24} {:>6}", label, row.count);
    }
    Ok(())
}

fn run_taxonomy(settings: &Settings) -> Result<()> {
    let mapping = settings.category_mapping()?;

    println!("🏷️  Category mapping ({} entries)", mapping.len());
    println!("{}", "━".repeat(40));
    for (from, to) in mapping.iter() {
        println!("   {:<24} → {}", from, to);
    }
    println!("\n   Default category: {}", mapping.default_category());
    Ok(())
}

fn run_reconcile(settings: &Settings, dry_run: bool) -> Result<()> {
    let mapping = settings.category_mapping()?;
    let conn = open_database(settings)?;
    let repo = SqliteProductRepository::new(&conn);
    let reconciler = CategoryReconciler::new(mapping);

    let report = if dry_run {
        reconciler.dry_run(&repo)?
    } else {
        reconciler.reconcile(&repo)?
    };

    print!("{}", report.render());

    if report.has_failures() {
        println!("\n⚠️  {} products could not be updated (see log)", report.failed_count);
    } else {
        println!("\n✅ Reconciliation complete");
    }
    info!(summary = %report.summary(), "done");

    Ok(())
}
