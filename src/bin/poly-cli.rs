use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use poly_web::cache::Caches;
use poly_web::config::{load_config, AppConfig};
use poly_web::db::{DataSources, SchemaCache};
use poly_web::routing::Router;
use poly_web::shell::{Args, ShellError, Tasks};

#[derive(Parser)]
#[command(name = "poly-cli")]
#[command(about = "Development CLI for Poly applications", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config/poly.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Print a cached value
    Get { key: String },
    /// Remove a cached value
    Delete { key: String },
}

#[derive(Subcommand)]
enum Commands {
    /// Match a path against the configured routes
    Routes { path: String },
    /// Describe a table's columns
    Schema {
        table: String,
        #[arg(long, default_value = "default")]
        db: String,
    },
    /// Inspect a cache configuration
    Cache {
        #[arg(long, default_value = "default")]
        name: String,
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Fetch a path from a running server
    Request {
        path: String,
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
    /// Run an application task with positional arguments
    Task {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn load(path: &PathBuf) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(load_config(path)?)
    } else {
        eprintln!("warning: {} not found, using defaults", path.display());
        Ok(AppConfig::default())
    }
}

fn tasks(config: AppConfig) -> Tasks {
    let mut tasks = Tasks::new();
    tasks.register("schema:evict", move |args: &Args| -> Result<(), ShellError> {
        let table = args.require(0, "table")?;
        let db = args.get(1).unwrap_or("default");
        let caches = Caches::new(config.cache.clone());
        let store = caches
            .get("default")
            .map_err(|e| ShellError::Failed(e.to_string()))?;
        SchemaCache::with_store(store)
            .evict(db, table)
            .map_err(|e| ShellError::Failed(e.to_string()))?;
        println!("evicted schema of {}.{}", db, table);
        Ok(())
    });
    tasks
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Routes { path } => {
            let config = load(&cli.config)?;
            let router = Router::from_config(&config.routes, &config.router)?;
            match router.match_path(&path) {
                Some(found) => println!("{}", serde_json::to_string_pretty(&found)?),
                None => {
                    eprintln!("No route matches '{}'", path);
                    std::process::exit(1);
                }
            }
        }
        Commands::Schema { table, db } => {
            let config = load(&cli.config)?;
            let source = DataSources::new(config.databases).get(&db)?;
            let schema = source.describe(&table)?;
            for column in schema.columns() {
                println!(
                    "{:<24} {:<6}{}",
                    column.name,
                    format!("{:?}", column.kind),
                    if column.primary { " primary" } else { "" }
                );
            }
        }
        Commands::Cache { name, command } => {
            let config = load(&cli.config)?;
            let store = Caches::new(config.cache).get(&name)?;
            match command {
                CacheCommand::Get { key } => match store.read(&key)? {
                    Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    None => {
                        eprintln!("'{}' is not cached", key);
                        std::process::exit(1);
                    }
                },
                CacheCommand::Delete { key } => {
                    let existed = store.delete(&key)?;
                    println!("{}", if existed { "deleted" } else { "not found" });
                }
            }
        }
        Commands::Request { path, url } => {
            let res = reqwest::get(format!("{}{}", url.trim_end_matches('/'), path)).await?;
            print_response(res).await?;
        }
        Commands::Task { args } => {
            let config = load(&cli.config)?;
            let code = tasks(config).exit_code(&args);
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(id) = res.headers().get("x-request-id").and_then(|v| v.to_str().ok()) {
        eprintln!("request id: {}", id);
    }
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
