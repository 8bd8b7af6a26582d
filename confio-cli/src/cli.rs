use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use confio_engine::Settings;

#[derive(Parser, Debug)]
#[command(name = "confio", version, about = "Versioned configuration lookup")]
pub struct Args {
    /// Backing repository (git URI or local path)
    #[arg(long, global = true, env = "CONFIO_REPO")]
    pub repo: Option<String>,

    /// Directory for per-label working copies
    #[arg(long, global = true)]
    pub workdir: Option<PathBuf>,

    /// Label served when a request carries none
    #[arg(long, global = true, default_value = "main")]
    pub default_label: String,

    /// Output rendering of the resolved document
    #[arg(long, short = 'o', global = true, value_enum, default_value = "json")]
    pub output: OutputFormat,

    /// Increase log verbosity
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve one configuration document
    Lookup {
        /// Application name
        application: String,
        /// Profiles, most specific first
        #[arg(value_delimiter = ',', required = true)]
        profiles: Vec<String>,
        /// Branch or tag to serve (defaults to --default-label)
        #[arg(long, short = 'l')]
        label: Option<String>,
    },
    /// Resolve a request given as a /{application}/{profile}[/{label}] path
    Path {
        path: String,
    },
    /// Probe the backing store and report engine readiness
    Check,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Full document as pretty JSON
    Json,
    /// Full document as YAML
    Yaml,
    /// Effective merged view as key=value lines
    Properties,
}

impl Args {
    pub fn settings(&self) -> Result<Settings, String> {
        let repo = self
            .repo
            .clone()
            .ok_or_else(|| "--repo (or CONFIO_REPO) is required".to_owned())?;
        let mut settings = Settings::new(repo);
        settings.default_label = self.default_label.clone();
        if let Some(workdir) = &self.workdir {
            settings.workdir = workdir.clone();
        }
        Ok(settings)
    }
}
