//! Versioned configuration distribution engine.
//!
//! Serves merged configuration documents by `(application, profiles, label)`
//! from a version-controlled backing store. The pieces compose bottom-up:
//! a [`source::ConfigSource`] materializes raw files for a label, the
//! [`resolver::Resolver`] selects and merges the applicable ones in override
//! precedence order, the [`cache::ResponseCache`] memoizes documents (with
//! per-key request coalescing), and the [`service::ConfigService`] ties them
//! together behind a single `lookup` operation.
//!
//! The engine is transport-agnostic: an embedding HTTP layer routes
//! `/{application}/{profile}[/{label}]` through [`route::parse_path`] into
//! [`ConfigService::lookup`](service::ConfigService::lookup) and maps the
//! [`error::ConfigError`] taxonomy onto status codes.

pub mod cache;
pub mod error;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod route;
pub mod service;
pub mod settings;
pub mod source;

pub use error::ConfigError;
pub use model::{ConfigRequest, ConfigResponse, FileFormat, PropertySource, RawFile};
pub use service::{ConfigService, Health};
pub use settings::Settings;
pub use source::{ConfigSource, SourceSnapshot};
