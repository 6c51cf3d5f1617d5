use resolve_xml::cli::{Cli, Command};
use resolve_xml::config::ConfigManager;
use resolve_xml::error::Result;
use resolve_xml::{lookup, processor};

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.global.verbose);

    if let Err(message) = cli.validate() {
        eprintln!("{}", message);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let config = ConfigManager::load_config(&cli.global).await?;

    match &cli.command {
        Command::Parse(args) => processor::run_parse(&cli.global, args, &config),
        Command::Lookup(args) => {
            args.validate().map_err(resolve_xml::error::AppError::Usage)?;
            lookup::run_lookup(&cli.global, args, &config)
        }
        Command::Show(args) => lookup::run_show(&cli.global, args, &config),
    }
}
