use std::fmt;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

/// XML Catalog resolution demo
///
/// Parses, validates, and transforms XML documents while narrating every
/// catalog resolution on stdout.
#[derive(Parser, Debug, Clone)]
#[command(name = "resolve-xml")]
#[command(about = "Parse, validate, and transform XML documents with chatty XML Catalog resolution")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// XML Catalog file(s) to use for resolution
    #[arg(long = "catalog", value_name = "URI", global = true, action = ArgAction::Append)]
    pub catalogs: Vec<String>,

    /// Validate catalog files while loading (malformed entries become errors)
    #[arg(long, global = true)]
    pub validate: bool,

    /// Do not use the XML resolver during processing
    #[arg(long = "no-resolver", global = true)]
    pub no_resolver: bool,

    /// Ignore XML_CATALOG_FILES and the default system catalog
    #[arg(long = "no-system-catalogs", global = true)]
    pub no_system_catalogs: bool,

    /// Cache remote resolved resources on disk
    #[arg(long, global = true)]
    pub cache: bool,

    /// Directory to use for caching (implies --cache)
    #[arg(long = "cache-dir", value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (suppress resolution narration)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse, validate, and/or transform a document
    Parse(ParseArgs),
    /// Lookup entries in the catalog(s)
    Lookup(LookupArgs),
    /// Show the content of the catalog(s)
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// The document to process
    pub document: String,

    /// Perform a (DTD) validating parse
    #[arg(long)]
    pub dtd: bool,

    /// Perform XML Schema validation with schema(s)
    #[arg(long = "xsd", value_name = "URI", action = ArgAction::Append)]
    pub schemas: Vec<String>,

    /// Perform RELAX NG validation with grammar
    #[arg(long = "rng", value_name = "URI")]
    pub grammar: Option<String>,

    /// Transform the document with the XSL stylesheet
    #[arg(long = "xsl", value_name = "URI")]
    pub stylesheet: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LookupArgs {
    /// Perform lookup of a particular type
    #[arg(long = "type", value_enum, value_name = "TYPE")]
    pub lookup_type: Option<LookupType>,

    /// Specify the doctype or entity name
    #[arg(long)]
    pub name: Option<String>,

    /// Specify the system identifier
    #[arg(long)]
    pub system: Option<String>,

    /// Specify the public identifier
    #[arg(long, allow_hyphen_values = true)]
    pub public: Option<String>,

    /// Specify the URI
    #[arg(long)]
    pub uri: Option<String>,

    /// Specify the namespace nature
    #[arg(long)]
    pub nature: Option<String>,

    /// Specify the namespace purpose
    #[arg(long)]
    pub purpose: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ShowArgs {
    /// A regular expression to filter the entries shown
    #[arg(short = 'r', long)]
    pub regex: Option<String>,
}

/// The query styles the lookup command understands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupType {
    Doctype,
    Document,
    Entity,
    Namespace,
    Notation,
    Public,
    System,
    Uri,
}

impl fmt::Display for LookupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookupType::Doctype => "doctype",
            LookupType::Document => "document",
            LookupType::Entity => "entity",
            LookupType::Namespace => "namespace",
            LookupType::Notation => "notation",
            LookupType::Public => "public",
            LookupType::System => "system",
            LookupType::Uri => "uri",
        };
        f.write_str(name)
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Cross-option consistency checks clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.global.no_resolver && self.global.validate {
            return Err("The resolver must be enabled for the --validate option".to_string());
        }
        Ok(())
    }
}

impl GlobalOpts {
    pub fn use_resolver(&self) -> bool {
        !self.no_resolver
    }

    /// An explicit cache directory implies caching
    pub fn cache_enabled(&self) -> bool {
        self.cache || self.cache_dir.is_some()
    }
}

impl LookupArgs {
    /// Reject option combinations that make no sense together.
    pub fn validate(&self) -> Result<(), String> {
        if self.public.is_none() && self.system.is_none() && self.name.is_none() && self.uri.is_none()
        {
            return Err(
                "You must specify at least one of --uri, --system, --public, or --name".to_string(),
            );
        }
        if (self.public.is_some() || self.system.is_some()) && self.uri.is_some() {
            return Err(
                "You must specify either --system (and optionally --public) or --uri for lookup, not both"
                    .to_string(),
            );
        }
        if self.name.is_some() && self.uri.is_some() {
            return Err("The --name option applies to system identifiers, not uris".to_string());
        }
        Ok(())
    }

    /// Default query-style inference: a URI means a uri query (namespace
    /// when qualified by nature or purpose); identifiers mean an entity
    /// query.
    pub fn effective_type(&self) -> LookupType {
        match self.lookup_type {
            Some(t) => t,
            None => {
                if self.uri.is_some() {
                    if self.nature.is_some() || self.purpose.is_some() {
                        LookupType::Namespace
                    } else {
                        LookupType::Uri
                    }
                } else {
                    LookupType::Entity
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_subcommand() {
        let cli = parse(&["resolve-xml", "parse", "doc.xml", "--dtd", "--xsl", "style.xsl"]);
        match cli.command {
            Command::Parse(ref p) => {
                assert_eq!(p.document, "doc.xml");
                assert!(p.dtd);
                assert_eq!(p.stylesheet.as_deref(), Some("style.xsl"));
                assert!(p.grammar.is_none());
            }
            _ => panic!("expected parse subcommand"),
        }
    }

    #[test]
    fn test_repeatable_options() {
        let cli = parse(&[
            "resolve-xml",
            "--catalog",
            "a.xml",
            "--catalog",
            "b.xml",
            "parse",
            "doc.xml",
            "--xsd",
            "one.xsd",
            "--xsd",
            "two.xsd",
        ]);
        assert_eq!(cli.global.catalogs, vec!["a.xml", "b.xml"]);
        match cli.command {
            Command::Parse(ref p) => assert_eq!(p.schemas, vec!["one.xsd", "two.xsd"]),
            _ => panic!("expected parse subcommand"),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = parse(&["resolve-xml", "show", "--catalog", "cat.xml", "-r", "dtd"]);
        assert_eq!(cli.global.catalogs, vec!["cat.xml"]);
        match cli.command {
            Command::Show(ref s) => assert_eq!(s.regex.as_deref(), Some("dtd")),
            _ => panic!("expected show subcommand"),
        }
    }

    #[test]
    fn test_cache_dir_implies_cache() {
        let cli = parse(&["resolve-xml", "--cache-dir", "/tmp/c", "parse", "doc.xml"]);
        assert!(cli.global.cache_enabled());

        let cli = parse(&["resolve-xml", "parse", "doc.xml"]);
        assert!(!cli.global.cache_enabled());
    }

    #[test]
    fn test_validate_requires_resolver() {
        let cli = parse(&["resolve-xml", "--no-resolver", "--validate", "parse", "doc.xml"]);
        assert!(cli.validate().is_err());

        let cli = parse(&["resolve-xml", "--validate", "parse", "doc.xml"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_lookup_requires_an_identifier() {
        let cli = parse(&["resolve-xml", "lookup"]);
        match cli.command {
            Command::Lookup(ref l) => assert!(l.validate().is_err()),
            _ => panic!("expected lookup subcommand"),
        }
    }

    #[test]
    fn test_lookup_uri_and_system_conflict() {
        let cli = parse(&[
            "resolve-xml",
            "lookup",
            "--uri",
            "http://example.com/",
            "--system",
            "http://example.com/doc.dtd",
        ]);
        match cli.command {
            Command::Lookup(ref l) => {
                let err = l.validate().unwrap_err();
                assert!(err.contains("not both"));
            }
            _ => panic!("expected lookup subcommand"),
        }
    }

    #[test]
    fn test_lookup_type_inference() {
        let args = LookupArgs {
            uri: Some("http://example.com/".into()),
            ..Default::default()
        };
        assert_eq!(args.effective_type(), LookupType::Uri);

        let args = LookupArgs {
            uri: Some("http://example.com/".into()),
            nature: Some("http://www.rddl.org/purposes#schema-validation".into()),
            ..Default::default()
        };
        assert_eq!(args.effective_type(), LookupType::Namespace);

        let args = LookupArgs {
            system: Some("http://example.com/doc.dtd".into()),
            ..Default::default()
        };
        assert_eq!(args.effective_type(), LookupType::Entity);

        let args = LookupArgs {
            system: Some("http://example.com/doc.dtd".into()),
            lookup_type: Some(LookupType::System),
            ..Default::default()
        };
        assert_eq!(args.effective_type(), LookupType::System);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["resolve-xml", "-q", "-v", "parse", "doc.xml"]);
        assert!(result.is_err());
    }
}
