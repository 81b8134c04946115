/// collection-loader: load YAML data files into in-memory collections
///
/// Usage: collection-loader --data-path data authors books=library/books

use clap::{Parser, ValueEnum};
use collection_loader::{Collection, ConsoleObserver, Loader, MemoryCollection, MemoryRepository};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "collection-loader")]
#[command(about = "Loads collection data from YAML files", long_about = None)]
struct Args {
    /// Root directory of the data files
    #[arg(long, env = "LOADER_DATA_PATH", default_value = "data")]
    data_path: PathBuf,

    /// Collections to load, in order, as QUALIFIED_NAME[=RELATIVE_PATH]
    #[arg(value_name = "COLLECTION", required = true)]
    collections: Vec<CollectionSpec>,

    /// Attribute(s) used to match existing entities, overriding options files
    #[arg(long)]
    find_by: Vec<String>,

    /// Dump the loaded collections after loading
    #[arg(long, value_enum, default_value_t = OutputFormat::None)]
    output: OutputFormat,

    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone)]
struct CollectionSpec {
    qualified_name: String,
    relative_path: String,
}

impl FromStr for CollectionSpec {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (qualified_name, relative_path) = match raw.split_once('=') {
            Some((qualified_name, relative_path)) => (qualified_name, relative_path),
            None => (raw, raw),
        };

        if qualified_name.is_empty() || relative_path.is_empty() {
            return Err(format!("invalid collection {raw:?}"));
        }

        Ok(Self {
            qualified_name: qualified_name.to_string(),
            relative_path: relative_path.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    None,
    Json,
    Yaml,
}

/// Log level selected from the number of `-v` flags
#[derive(Debug, Clone, Copy)]
enum LoggingLevel {
    Default,
    Verbose,
    Debug,
}

impl LoggingLevel {
    fn new(num_verbose: u8) -> Self {
        match num_verbose {
            0 => Self::Default,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            Self::Default => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }

    /// Install a stderr subscriber. RUST_LOG wins over `-v` when set.
    fn setup_logging(&self) {
        let filter = match std::env::var("RUST_LOG") {
            Ok(rust_log) => {
                if !matches!(self, Self::Default) {
                    eprintln!("WARNING: Using RUST_LOG='{rust_log}' environment, ignoring -v command line");
                }
                EnvFilter::new(rust_log)
            }
            Err(_) => EnvFilter::new(self.directive()),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    LoggingLevel::new(args.verbose).setup_logging();

    let repository = Arc::new(MemoryRepository::new());
    let collections: Vec<(CollectionSpec, Arc<MemoryCollection>)> = args
        .collections
        .iter()
        .map(|spec| (spec.clone(), repository.build(&spec.qualified_name)))
        .collect();

    let mut loader = Loader::new(args.data_path.clone())
        .with_repository(repository.clone())
        .with_overrides(find_by_override(&args.find_by));
    loader.add_observer(ConsoleObserver::stdout());

    let mut failed = false;
    for (spec, collection) in &collections {
        match loader.load_from(collection.clone(), &spec.relative_path) {
            Ok(results) if results.is_success() => {}
            Ok(_) | Err(_) => failed = true,
        }
    }

    if let Err(e) = dump(&collections, args.output) {
        error!(error = %e, "failed to write output");
        return ExitCode::FAILURE;
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn find_by_override(find_by: &[String]) -> Map<String, Value> {
    let mut overrides = Map::new();
    match find_by {
        [] => {}
        [key] => {
            overrides.insert("find_by".to_string(), Value::from(key.as_str()));
        }
        keys => {
            overrides.insert("find_by".to_string(), Value::from(keys.to_vec()));
        }
    }
    overrides
}

fn dump(
    collections: &[(CollectionSpec, Arc<MemoryCollection>)],
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if format == OutputFormat::None {
        return Ok(());
    }

    let snapshot: Map<String, Value> = collections
        .iter()
        .map(|(_, collection)| {
            let entities = collection.entities().into_iter().map(Value::Object).collect();
            (collection.qualified_name().to_string(), Value::Array(entities))
        })
        .collect();
    let snapshot = Value::Object(snapshot);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&snapshot)?),
        OutputFormat::None => {}
    }

    Ok(())
}
