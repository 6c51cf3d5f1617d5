//! The lookup and show commands
//!
//! `lookup` queries the catalogs the way a parser would and reports the
//! mapping it finds. `show` lists the entries of every configured
//! catalog, optionally filtered by a regular expression.

use std::sync::Arc;

use regex::RegexBuilder;
use tracing::warn;
use url::Url;

use crate::cli::{GlobalOpts, LookupArgs, LookupType, ShowArgs};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::output::Output;
use crate::processor::build_resolver;

pub fn run_lookup(opts: &GlobalOpts, args: &LookupArgs, config: &Config) -> Result<()> {
    if !opts.use_resolver() {
        return Err(AppError::Usage(
            "The resolver must be enabled for the lookup command".to_string(),
        ));
    }

    let lookup_type = args.effective_type();
    check_options_for_type(lookup_type, args)?;

    let output = Arc::new(Output::new(opts.quiet));
    let resolver = build_resolver(opts, config, &output, false)?;
    let catalogs = resolver.catalogs();

    output.say(&format!("Performing {} lookup...", style_label(lookup_type)));

    let result = match lookup_type {
        LookupType::Namespace => catalogs.lookup_namespace(
            args.uri.as_deref().unwrap_or(""),
            args.nature.as_deref(),
            args.purpose.as_deref(),
        )?,
        LookupType::Uri => catalogs.lookup_uri(args.uri.as_deref().unwrap_or(""))?,
        LookupType::Entity => catalogs.lookup_entity(
            args.name.as_deref(),
            args.system.as_deref(),
            args.public.as_deref(),
        )?,
        LookupType::Public => {
            catalogs.lookup_public(args.system.as_deref(), args.public.as_deref())?
        }
        LookupType::System => match args.system.as_deref() {
            Some(system) => catalogs.lookup_system(system)?,
            None => None,
        },
        LookupType::Doctype => catalogs.lookup_doctype(
            args.name.as_deref(),
            args.system.as_deref(),
            args.public.as_deref(),
        )?,
        LookupType::Notation => catalogs.lookup_notation(
            args.name.as_deref(),
            args.system.as_deref(),
            args.public.as_deref(),
        )?,
        LookupType::Document => catalogs.lookup_document()?,
    };

    match result {
        Some(resolved) => output.say(&format!("Resolves to: {}", display_resolved(&resolved))),
        None => output.say("Failed to find matching catalog entry."),
    }

    Ok(())
}

/// The traditional spelling: "URI" is an initialism, the other styles
/// read as plain words
fn style_label(lookup_type: LookupType) -> String {
    match lookup_type {
        LookupType::Uri => "URI".to_string(),
        other => other.to_string(),
    }
}

/// File URLs read better as plain paths
fn display_resolved(resolved: &Url) -> String {
    if resolved.scheme() == "file" {
        resolved.path().to_string()
    } else {
        resolved.to_string()
    }
}

fn check_options_for_type(lookup_type: LookupType, args: &LookupArgs) -> Result<()> {
    let complaint = match lookup_type {
        LookupType::Namespace if args.name.is_some() => {
            Some("The --name option doesn't apply to namespace queries.")
        }
        LookupType::Public if args.name.is_some() => {
            Some("The --name option doesn't apply to public queries.")
        }
        LookupType::System if args.public.is_some() => {
            Some("The --public option doesn't apply to system queries.")
        }
        LookupType::Document
            if args.name.is_some()
                || args.system.is_some()
                || args.public.is_some()
                || args.uri.is_some()
                || args.nature.is_some()
                || args.purpose.is_some() =>
        {
            Some("Document queries don't take any options")
        }
        _ => None,
    };

    match complaint {
        Some(message) => Err(AppError::Usage(message.to_string())),
        None => Ok(()),
    }
}

pub fn run_show(opts: &GlobalOpts, args: &ShowArgs, config: &Config) -> Result<()> {
    if !opts.use_resolver() {
        return Err(AppError::Usage(
            "The resolver must be enabled for the show command".to_string(),
        ));
    }

    let output = Arc::new(Output::new(opts.quiet));
    let resolver = build_resolver(opts, config, &output, false)?;
    let catalogs = resolver.catalogs();

    let filter = match &args.regex {
        Some(pattern) => {
            output.say(&format!("Showing all catalog entries matching {}", pattern));
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| AppError::Usage(format!("Invalid regular expression: {}", e)))?;
            Some(regex)
        }
        None => None,
    };

    for catalog_url in catalogs.catalogs() {
        output.say(catalog_url.as_str());
        let catalog = match catalogs.load(catalog_url) {
            Ok(catalog) => catalog,
            Err(e) if !opts.validate => {
                warn!("{}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut count = 0usize;
        let mut matched = 0usize;
        for entry in catalog.entries() {
            count += 1;
            let line = entry.to_string();
            let keep = match &filter {
                Some(regex) => regex.is_match(&line),
                None => true,
            };
            if keep {
                matched += 1;
                output.say(&format!("  {}", line));
            }
        }
        if filter.is_some() {
            output.say(&format!("{} of {} matches", matched, count));
        }
    }

    Ok(())
}
