mod config;
mod library;
mod loader;
mod normalize;
mod photo;
mod record;
mod remote;
mod sanitize;
mod search;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use config::Config;
use remote::portal::PortalClient;
use remote::Directory;
use search::{QuerySlot, SearchField};

#[derive(Parser, Debug)]
#[command(name = "rostr")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default configuration file
    Init(InitArgs),
    /// List selectable source lists on the portal
    Sources,
    /// Query the roster (prints id, name, role; for scripting)
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Search term (matches name and role)
    query: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Init(args)) = &cli.command {
        return handle_init(cli.config.as_deref(), args.force);
    }

    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Sources) => handle_sources(&config),
        Some(Command::Query(args)) => handle_query(&config, &args),
        Some(Command::Init(_)) => unreachable!("handled before config load"),
        None => run_tui(&config),
    }
}

fn handle_init(path_override: Option<&Path>, force: bool) -> Result<()> {
    let path = match path_override {
        Some(path) => path.to_path_buf(),
        None => config::default_config_path()?,
    };
    config::write_default(&path, force)?;
    println!("Initialized rostr configuration at {}", path.display());
    println!("Edit it to point at your portal, then run `rostr sources`.");
    Ok(())
}

fn portal_client(config: &Config) -> Result<PortalClient> {
    PortalClient::new(&config.portal.base_url, config.portal.auth())
}

fn handle_sources(config: &Config) -> Result<()> {
    let client = portal_client(config)?;
    match client.list_sources() {
        Ok(sources) if sources.is_empty() => {
            println!("No selectable lists found.");
        }
        Ok(sources) => {
            for source in sources {
                println!("{}\t{}", source.id, source.title);
            }
        }
        Err(err) => {
            // Enumeration failure degrades to a sentinel; the command still
            // succeeds so setup tooling is never blocked on it.
            println!("(failed to load lists)");
            eprintln!("warning: {err}");
        }
    }
    Ok(())
}

fn handle_query(config: &Config, args: &QueryArgs) -> Result<()> {
    if config.roster.list.trim().is_empty() {
        eprintln!("warning: no roster.list configured");
    }

    let client = portal_client(config)?;
    let origin = client.origin();
    let (result, warning) = loader::load_roster(
        &client,
        &config.roster.list,
        config.roster.image_library.as_deref(),
        &origin,
    );
    if let Some(warning) = warning {
        eprintln!("warning: {warning}");
    }
    let roster = result.map_err(|message| anyhow::anyhow!(message))?;

    const QUERY_FIELDS: &[SearchField] = &[SearchField::Name, SearchField::Role];
    let slots = [QuerySlot {
        text: &args.query,
        fields: QUERY_FIELDS,
    }];
    let matches = search::filter_indices(&roster, &slots);

    if matches.is_empty() {
        println!("No matches for \"{}\"", args.query);
    } else {
        println!(
            "Found {} profile(s) matching \"{}\"",
            matches.len(),
            args.query
        );
    }
    for idx in matches {
        let record = &roster[idx];
        println!("{}\t{}\t{}", record.id, record.name, record.role);
    }
    Ok(())
}

fn run_tui(config: &Config) -> Result<()> {
    let client = portal_client(config)?;
    let origin = client.origin();
    let site_url = client.site_url();

    let mut app = ui::app::App::new(config, Arc::new(client), origin, site_url);
    app.run()?;

    Ok(())
}
