use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use catalog_sync::RestCatalogPublisher;
use clap::Parser;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::DynObjectStore;
use tracing_subscriber::EnvFilter;
use url::Url;

use snaptable::catalog::CatalogSyncStatus;
use snaptable::engine::default::DefaultEngine;
use snaptable::options::{
    CATALOG_SYNC_ENABLED_KEY, CATALOG_SYNC_URL_KEY, PARTITIONPATH_FIELD_KEY, PATH_KEY,
    PRECOMBINE_FIELD_KEY, RECORDKEY_FIELD_KEY, TABLE_NAME_KEY,
};
use snaptable::schema::{DataType, StructField, StructType};
use snaptable::table::{committed_transactions, read_table_config, TableLayout};
use snaptable::value::{Row, RowBatch, Scalar};
use snaptable::{DataSource, Engine, Error, SaveMode, TableResult, WriteStatus};

/// An example program that writes generated orders to a snaptable table, creating it if
/// necessary.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the table, a local path or a `file://` / `memory://` url
    path: String,

    /// Name of the table
    #[arg(long, short, default_value = "orders")]
    table_name: String,

    /// What to do if the table already exists: error_if_exists, ignore, overwrite or append
    #[arg(long, short, default_value_t = SaveMode::Append)]
    mode: SaveMode,

    /// Number of rows to generate
    #[arg(long, short, default_value = "10")]
    num_rows: usize,

    /// Extra write options. Specify as "key=value", and pass multiple times to set more than one
    /// option.
    #[arg(long)]
    option: Vec<String>,

    /// Publish the table to the catalog at this url after committing
    #[arg(long)]
    catalog_url: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{e:#?}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> TableResult<()> {
    let cli = Cli::parse();
    let url = snaptable::try_parse_uri(&cli.path)?;
    println!("Using table at: {url}");

    let engine = DefaultEngine::new(object_store_for(&url)?);
    let options = write_options(&cli)?;
    let mut source = DataSource::new(&engine);
    if cli.catalog_url.is_some() {
        source = source.with_catalog_publisher(Arc::new(RestCatalogPublisher::new()));
    }

    let relation =
        source.create_write_relation(&options, cli.mode, sample_orders(cli.num_rows)?)?;
    match &relation.status {
        WriteStatus::Committed {
            commit,
            catalog_sync,
        } => {
            println!(
                "✓ Committed transaction {} with {} rows",
                commit.transaction_id, cli.num_rows
            );
            match catalog_sync {
                CatalogSyncStatus::Disabled => {}
                CatalogSyncStatus::Synced => println!("✓ Synced table to catalog"),
                CatalogSyncStatus::Failed(cause) => println!("✗ Catalog sync failed: {cause}"),
            }
        }
        WriteStatus::CommitRejected(commit) => {
            println!("✗ Commit of {} was rejected", commit.transaction_id)
        }
        WriteStatus::Failed(failure) => println!("✗ {failure}"),
        WriteStatus::Skipped => println!("Table exists, nothing written"),
    }

    let storage = engine.storage_handler();
    let layout = TableLayout::new(relation.relation.base_path.clone());
    let config = read_table_config(storage.as_ref(), &layout)?;
    let commits = committed_transactions(storage.as_ref(), &layout)?;
    println!(
        "Table '{}' ({}) has {} committed transactions",
        config.name,
        config.storage_type,
        commits.len()
    );
    relation.into_result().map(|_| ())
}

fn object_store_for(url: &Url) -> TableResult<Arc<DynObjectStore>> {
    match url.scheme() {
        "file" => Ok(Arc::new(LocalFileSystem::new())),
        "memory" => Ok(Arc::new(InMemory::new())),
        scheme => Err(Error::unsupported(format!(
            "The example only writes to local or in-memory tables, not '{scheme}'"
        ))),
    }
}

fn write_options(cli: &Cli) -> TableResult<HashMap<String, String>> {
    let mut options = HashMap::from([
        (PATH_KEY.to_string(), cli.path.clone()),
        (TABLE_NAME_KEY.to_string(), cli.table_name.clone()),
        (RECORDKEY_FIELD_KEY.to_string(), "id".to_string()),
        (PARTITIONPATH_FIELD_KEY.to_string(), "region".to_string()),
        (PRECOMBINE_FIELD_KEY.to_string(), "ts".to_string()),
    ]);
    if let Some(catalog_url) = &cli.catalog_url {
        options.insert(CATALOG_SYNC_ENABLED_KEY.to_string(), "true".to_string());
        options.insert(CATALOG_SYNC_URL_KEY.to_string(), catalog_url.clone());
    }
    for option in &cli.option {
        let (key, value) = option.split_once('=').ok_or_else(|| {
            Error::configuration(format!("Invalid option '{option}', expected key=value"))
        })?;
        options.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(options)
}

fn sample_orders(num_rows: usize) -> TableResult<RowBatch> {
    let schema = Arc::new(StructType::try_new([
        StructField::not_null("id", DataType::STRING),
        StructField::not_null("ts", DataType::LONG),
        StructField::nullable("region", DataType::STRING),
        StructField::nullable("amount", DataType::DOUBLE),
    ])?);
    let regions = ["eu", "us", "apac"];
    let rows = (0..num_rows)
        .map(|i| {
            Row::from(vec![
                Scalar::from(format!("order-{i}")),
                Scalar::Long(i as i64),
                Scalar::from(regions[i % regions.len()]),
                Scalar::Double(10.0 + i as f64 * 0.25),
            ])
        })
        .collect();
    RowBatch::try_new(schema, rows)
}
