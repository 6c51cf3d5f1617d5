//! The parse command
//!
//! Parses a document with catalog resolution active, then optionally
//! continues with RELAX NG validation, XML Schema validation, and an
//! XSLT transformation, narrating every stage and every resolution.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheConfig, ResourceCache};
use crate::catalog::{self, CatalogManager, Prefer};
use crate::cli::{GlobalOpts, ParseArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{AppError, Result};
use crate::http_client::{AsyncHttpClient, HttpClientConfig};
use crate::libxml2::{self, LibXml2};
use crate::output::Output;
use crate::resolver::{ChattyResolver, Resolver};
use crate::xslt;

/// Build the resolver from configuration, announcing the catalogs and
/// cache it will use. `announce_parse_details` adds the lines that only
/// matter while parsing.
pub fn build_resolver(
    opts: &GlobalOpts,
    config: &Config,
    output: &Arc<Output>,
    announce_parse_details: bool,
) -> Result<Resolver> {
    let catalog_names = ConfigManager::effective_catalogs(config, opts);
    if catalog_names.is_empty() {
        output.say("Using the XML Resolver with no catalogs");
    } else {
        output.say("Using the XML Resolver with the following catalogs:");
        for cat in &catalog_names {
            output.say(&format!("\t{}", cat));
        }
    }

    let mut catalog_urls = Vec::with_capacity(catalog_names.len());
    for name in &catalog_names {
        catalog_urls.push(catalog::to_absolute_url(name)?);
    }

    let prefer = match config.resolver.prefer.as_str() {
        "system" => Prefer::System,
        _ => Prefer::Public,
    };
    let catalogs = CatalogManager::new(catalog_urls, opts.validate, prefer);
    if opts.validate {
        // Malformed catalogs must fail the run up front; an error inside
        // the parser's entity-loader callback has nowhere to go.
        catalogs.preload()?;
    }

    // The resolver always needs somewhere to materialize remote
    // resources; without caching that somewhere is a per-run temporary
    // directory rather than the persistent cache.
    let cache_enabled = config.cache.enabled;
    let directory = if cache_enabled {
        config.cache.directory.clone()
    } else {
        std::env::temp_dir()
            .join("resolve-xml")
            .join(format!("run-{}", std::process::id()))
    };

    if std::fs::create_dir_all(&directory).is_err() && cache_enabled {
        let message = match &opts.cache_dir {
            Some(dir) => format!("Failed to initialize cache: {}", dir.display()),
            None => "Failed to initialize cache".to_string(),
        };
        return Err(AppError::Usage(message));
    }

    if cache_enabled {
        output.say(&format!("Cache location: {}", directory.display()));
    } else if announce_parse_details {
        output.say("The resolver will not cache resources");
    }
    output.say("");

    let cache_config = CacheConfig {
        directory,
        ttl_hours: config.cache.ttl_hours,
        max_memory_entries: config.cache.max_memory_entries,
        memory_ttl_seconds: config.cache.memory_ttl_seconds,
    };
    let http_config = HttpClientConfig {
        timeout_seconds: config.network.timeout_seconds,
        retry_attempts: config.network.retry_attempts,
        retry_delay_ms: config.network.retry_delay_ms,
        ..Default::default()
    };
    let http_client = AsyncHttpClient::new(http_config)?;
    let cache = Arc::new(ResourceCache::new(cache_config, http_client));

    Ok(Resolver::new(catalogs, cache))
}

/// Find the local file for a schema or stylesheet locator: ask the
/// catalogs first, fall back to treating it as a local path.
fn locate_resource(resolver: &ChattyResolver, locator: &str) -> Result<PathBuf> {
    if let Some(resolved) = resolver.resolve_uri(locator, None)? {
        return Ok(resolved.local_path);
    }
    Ok(PathBuf::from(locator))
}

pub fn run_parse(opts: &GlobalOpts, args: &ParseArgs, config: &Config) -> Result<()> {
    let output = Arc::new(Output::new(opts.quiet));

    if args.dtd {
        output.say(&format!(
            "Performing a (DTD) validating parse of {}",
            args.document
        ));
    } else {
        output.say(&format!(
            "Performing a non-validating parse of {}",
            args.document
        ));
    }

    if let Some(grammar) = &args.grammar {
        output.say(&format!(
            "Continuing with RELAX NG validation with {}",
            grammar
        ));
    }

    if !args.schemas.is_empty() {
        output.say("Continuing with XML Schema validation with:");
        for xsd in &args.schemas {
            output.say(&format!("\t{}", xsd));
        }
    }

    if let Some(xsl) = &args.stylesheet {
        output.say(&format!("Continuing with XSLT transformation with {}", xsl));
    }

    // Without a wrapped resolver the chatty decorator still narrates
    // every attempt as a miss
    let resolver = if opts.use_resolver() {
        let inner = build_resolver(opts, config, &output, true)?;
        Arc::new(ChattyResolver::new(Some(inner), output.clone()))
    } else {
        output.say("The XML Resolver *is not* being used!");
        Arc::new(ChattyResolver::new(None, output.clone()))
    };

    libxml2::install_entity_resolver(resolver.clone());
    let result = parse_stages(&output, &resolver, args);
    libxml2::clear_entity_resolver();
    result
}

fn parse_stages(output: &Arc<Output>, resolver: &ChattyResolver, args: &ParseArgs) -> Result<()> {
    let xml = LibXml2::new();
    let document_path = PathBuf::from(&args.document);

    let parsed = xml
        .read_file(&document_path, args.dtd)
        .map_err(|e| AppError::Parse {
            document: args.document.clone(),
            details: e.to_string(),
        })?;

    // Validity problems are reported but do not stop the pipeline; only
    // a malformed document does.
    for message in parsed.error_messages() {
        eprintln!("{}", message);
    }
    output.say("Parse complete");

    if let Some(grammar) = &args.grammar {
        if grammar.to_lowercase().ends_with(".rnc") {
            return Err(AppError::SchemaLoad {
                uri: grammar.clone(),
                details: "RELAX NG compact syntax is not supported".to_string(),
            });
        }

        let grammar_path = locate_resource(resolver, grammar)?;
        let grammar_ptr =
            xml.parse_relaxng_file(&grammar_path)
                .map_err(|e| AppError::SchemaLoad {
                    uri: grammar.clone(),
                    details: e.to_string(),
                })?;

        if xml.validate_with_relaxng(&grammar_ptr, &parsed)?.is_valid() {
            output.say("RELAX NG validation: valid");
        } else {
            output.say("RELAX NG validation: NOT VALID");
        }
    }

    if !args.schemas.is_empty() {
        let mut all_valid = true;
        for xsd in &args.schemas {
            let schema_path = locate_resource(resolver, xsd)?;
            let schema = xml
                .parse_schema_file(&schema_path)
                .map_err(|e| AppError::SchemaLoad {
                    uri: xsd.clone(),
                    details: e.to_string(),
                })?;
            if !xml.validate_with_schema(&schema, &parsed)?.is_valid() {
                all_valid = false;
            }
        }

        if all_valid {
            output.say("XML Schema validation: valid");
        } else {
            output.say("XML Schema validation: NOT VALID");
        }
    }

    if let Some(xsl) = &args.stylesheet {
        let stylesheet_path = locate_resource(resolver, xsl)?;
        let stylesheet =
            xslt::compile_file(&stylesheet_path).map_err(|e| AppError::Transform {
                details: e.to_string(),
            })?;
        let result = stylesheet
            .transform(&parsed)
            .map_err(|e| AppError::Transform {
                details: e.to_string(),
            })?;
        stylesheet
            .write_result(&result, "-")
            .map_err(|e| AppError::Transform {
                details: e.to_string(),
            })?;
        output.say("Done");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn parse_cli(args: &[&str]) -> Cli {
        let mut full = vec!["resolve-xml"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    fn run(dir: &TempDir, cli_args: &[&str]) -> Result<()> {
        let cli = parse_cli(cli_args);
        let mut config = Config::default();
        config.cache.directory = dir.path().join("cache");
        let config = ConfigManager::merge_with_cli(config, &cli.global);
        let args = match &cli.command {
            crate::cli::Command::Parse(args) => args.clone(),
            _ => panic!("expected parse command"),
        };
        run_parse(&cli.global, &args, &config)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_plain_parse() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("doc.xml");
        fs::write(&doc, "<doc>hello</doc>").unwrap();

        run(
            &dir,
            &["--quiet", "--no-system-catalogs", "--no-resolver", "parse", doc.to_str().unwrap()],
        )
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parse_malformed_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("bad.xml");
        fs::write(&doc, "<doc><oops></doc>").unwrap();

        let result = run(
            &dir,
            &["--quiet", "--no-system-catalogs", "--no-resolver", "parse", doc.to_str().unwrap()],
        );
        assert!(matches!(result, Err(AppError::Parse { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dtd_parse_with_catalog_resolution() {
        let dir = TempDir::new().unwrap();
        let dtd = dir.path().join("doc.dtd");
        fs::write(&dtd, "<!ELEMENT doc (#PCDATA)>").unwrap();

        let catalog = dir.path().join("catalog.xml");
        fs::write(
            &catalog,
            r#"<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog">
                 <system systemId="http://example.com/doc.dtd" uri="doc.dtd"/>
               </catalog>"#,
        )
        .unwrap();

        let doc = dir.path().join("doc.xml");
        fs::write(
            &doc,
            r#"<?xml version="1.0"?>
<!DOCTYPE doc SYSTEM "http://example.com/doc.dtd">
<doc>hello</doc>"#,
        )
        .unwrap();

        run(
            &dir,
            &[
                "--quiet",
                "--no-system-catalogs",
                "--catalog",
                catalog.to_str().unwrap(),
                "parse",
                doc.to_str().unwrap(),
                "--dtd",
            ],
        )
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rnc_grammar_is_rejected() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("doc.xml");
        fs::write(&doc, "<doc/>").unwrap();

        let result = run(
            &dir,
            &[
                "--quiet",
                "--no-system-catalogs",
                "--no-resolver",
                "parse",
                doc.to_str().unwrap(),
                "--rng",
                "grammar.rnc",
            ],
        );
        assert!(matches!(result, Err(AppError::SchemaLoad { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parse_with_xsd_validation() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("doc.xml");
        fs::write(&doc, "<doc>hello</doc>").unwrap();
        let xsd = dir.path().join("doc.xsd");
        fs::write(
            &xsd,
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="doc" type="xs:string"/>
               </xs:schema>"#,
        )
        .unwrap();

        run(
            &dir,
            &[
                "--quiet",
                "--no-system-catalogs",
                "--no-resolver",
                "parse",
                doc.to_str().unwrap(),
                "--xsd",
                xsd.to_str().unwrap(),
            ],
        )
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_build_resolver_announces_catalogs() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("catalog.xml");
        fs::write(
            &catalog,
            r#"<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog"/>"#,
        )
        .unwrap();

        let cli = parse_cli(&[
            "--quiet",
                "--no-system-catalogs",
            "--catalog",
            catalog.to_str().unwrap(),
            "parse",
            "doc.xml",
        ]);
        let mut config = Config::default();
        config.cache.directory = dir.path().join("cache");
        let config = ConfigManager::merge_with_cli(config, &cli.global);

        let output = Arc::new(Output::silent());
        let resolver = build_resolver(&cli.global, &config, &output, true).unwrap();
        assert_eq!(resolver.catalogs().catalogs().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_strict_loading_fails_parse_on_malformed_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("catalog.xml");
        fs::write(
            &catalog,
            r#"<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog">
                 <system systemId="http://example.com/a.dtd"/>
               </catalog>"#,
        )
        .unwrap();
        let doc = dir.path().join("doc.xml");
        fs::write(&doc, "<doc>hello</doc>").unwrap();

        let result = run(
            &dir,
            &[
                "--quiet",
                "--no-system-catalogs",
                "--validate",
                "--catalog",
                catalog.to_str().unwrap(),
                "parse",
                doc.to_str().unwrap(),
                "--dtd",
            ],
        );
        assert!(matches!(result, Err(AppError::Catalog(_))));

        // The same catalog is merely skipped without --validate
        let result = run(
            &dir,
            &[
                "--quiet",
                "--no-system-catalogs",
                "--catalog",
                catalog.to_str().unwrap(),
                "parse",
                doc.to_str().unwrap(),
            ],
        );
        assert!(result.is_ok());
    }
}
