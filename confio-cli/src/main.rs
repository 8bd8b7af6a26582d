mod cli;

use std::process;
use std::sync::Arc;

use clap::Parser;
use confio_engine::source::git::GitSource;
use confio_engine::{ConfigRequest, ConfigResponse, ConfigService, Health, route};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Commands, OutputFormat};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args).await {
        error!("{err}");
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "confio=debug,confio_engine=debug"
    } else {
        "confio=warn,confio_engine=warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = args.settings()?;
    let source = Arc::new(GitSource::new(&settings));
    let service = ConfigService::new(source, settings);

    match &args.command {
        Commands::Lookup {
            application,
            profiles,
            label,
        } => {
            let mut request = ConfigRequest::new(application, profiles.clone());
            if let Some(label) = label {
                request = request.with_label(label);
            }
            let response = service.lookup(&request).await?;
            render(&response, args.output)?;
        }
        Commands::Path { path } => {
            let request = route::parse_path(path)?;
            let response = service.lookup(&request).await?;
            render(&response, args.output)?;
        }
        Commands::Check => {
            let label = service.settings().default_label.clone();
            let version = service.refresh(&label).await?;
            match service.health() {
                Health::Up => println!("UP {label}@{version}"),
                Health::Down => {
                    println!("DOWN");
                    process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn render(response: &ConfigResponse, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(response)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(response)?),
        OutputFormat::Properties => {
            for (key, value) in response.effective() {
                println!("{key}={value}");
            }
        }
    }
    Ok(())
}
