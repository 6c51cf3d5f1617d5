//! # resolve-xml Library
//!
//! A chatty XML-catalog-aware processing library: OASIS XML Catalog
//! resolution with narration of every lookup, document parsing and
//! validation (DTD, XML Schema, RELAX NG) through libxml2, and XSLT
//! transformation through libxslt, with cached local copies of remote
//! resources.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod http_client;
pub mod libxml2;
pub mod lookup;
pub mod output;
pub mod processor;
pub mod resolver;
pub mod xslt;

pub use cache::{CacheConfig, CacheMetadata, CachedResource, DiskCache, ResourceCache};
pub use catalog::{Catalog, CatalogManager, Entry, Prefer};
pub use cli::{Cli, Command, GlobalOpts, LookupArgs, LookupType, ParseArgs, ShowArgs};
pub use config::{Config, ConfigManager};
pub use error::{AppError, CatalogError, ConfigError, LibXml2Error, Result};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use libxml2::{EntityResolver, LibXml2, ParsedDocument, ValidationResult, XmlSchemaPtr};
pub use output::Output;
pub use resolver::{ChattyResolver, ResolvedResource, Resolver};
pub use xslt::Stylesheet;
