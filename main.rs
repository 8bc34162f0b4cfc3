use clap::{Parser, Subcommand};
use media_catalog::query;
use media_catalog::{
    Catalog, CatalogConfig, Constraint, Error, MediaUpdate, NewMedia, PersistentCatalog, Result,
    ViewState,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

/// Query and maintain a media catalog.
#[derive(Parser, Debug)]
#[command(name = "media-catalog")]
#[command(version)]
struct Args {
    /// Database file; overrides the configured path
    #[arg(long, env = "MEDIA_CATALOG_DB")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hashes matching a JSON constraint
    Subset {
        constraint: String,
        /// Shuffle the result, drawing a seed unless one is given
        #[arg(long)]
        shuffle: bool,
        #[arg(long)]
        seed: Option<f64>,
    },
    /// Free-text search: an expression when it has operators, else a keyword
    Search { text: String },
    /// The global tag list
    Tags,
    AddTag {
        name: String,
        #[arg(long)]
        hash: Option<String>,
    },
    RemoveTag {
        name: String,
        #[arg(long)]
        hash: Option<String>,
    },
    /// Catalog a new media from its JSON description
    Add { media: String },
    /// Apply a partial JSON update, creating the media if needed
    Update { hash: String, update: String },
    Remove { hash: String },
    Tombstones,
    /// Rebuild the view a session token describes
    Session { token: String },
}

struct AppState {
    catalog: PersistentCatalog,
    config: CatalogConfig,
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn subset(state: &AppState, raw: &str, shuffle: bool, seed: Option<f64>) -> Result<()> {
    let constraint = Constraint::from_json(raw)?;
    let snapshot = state.catalog.snapshot();
    if shuffle || seed.is_some() {
        let (hashes, seed) = query::evaluate_shuffled(&snapshot, &constraint, seed)?;
        print(&json!({ "hashes": hashes, "seed": seed }))
    } else {
        print(&query::evaluate(&snapshot, &constraint)?)
    }
}

fn search(state: &AppState, text: &str) -> Result<()> {
    let constraint = Constraint::from_search_text(text)?;
    print(&query::evaluate(&state.catalog.snapshot(), &constraint)?)
}

fn tags(state: &AppState) -> Result<()> {
    print(&state.catalog.snapshot().tag_names())
}

fn add_tag(state: &AppState, name: &str, hash: Option<&str>) -> Result<()> {
    if !state.catalog.add_tag(name, hash)? {
        log::warn!("Tag '{name}' not added");
    }
    tags(state)
}

fn remove_tag(state: &AppState, name: &str, hash: Option<&str>) -> Result<()> {
    if !state.catalog.remove_tag(name, hash)? {
        log::warn!("Tag '{name}' not removed");
    }
    tags(state)
}

fn add(state: &AppState, raw: &str) -> Result<()> {
    let media: NewMedia = serde_json::from_str(raw).map_err(|e| Error::Validation(e.to_string()))?;
    let hash = media.hash.clone();
    let added = state.catalog.add_media(media)?;
    print(&json!({ "hash": hash, "added": added }))
}

fn update(state: &AppState, hash: &str, raw: &str) -> Result<()> {
    let update: MediaUpdate =
        serde_json::from_str(raw).map_err(|e| Error::Validation(e.to_string()))?;
    let changed = state.catalog.update_media(hash, update)?;
    print(&json!({ "hash": hash, "changed": changed }))
}

fn remove(state: &AppState, hash: &str) -> Result<()> {
    let removed = state.catalog.remove_media(hash)?;
    print(&json!({ "hash": hash, "removed": removed }))
}

fn tombstones(state: &AppState) -> Result<()> {
    print(&state.catalog.snapshot().tombstones())
}

fn session(state: &AppState, token: &str) -> Result<()> {
    let snapshot = state.catalog.snapshot();
    let view = ViewState::restore(&snapshot, token, &state.config.default_constraint)?;
    print(&json!({
        "order": view.order(),
        "position": view.position(),
        "current": view.current(),
        "seed": view.seed(),
        "token": view.to_token()?,
    }))
}

fn run(args: Args) -> Result<()> {
    let mut config = CatalogConfig::load()?;
    if let Some(path) = args.database {
        config.database_path = path;
    }
    let catalog = PersistentCatalog::open(&config)?;
    let state = AppState { catalog, config };

    match &args.command {
        Command::Subset {
            constraint,
            shuffle,
            seed,
        } => subset(&state, constraint, *shuffle, *seed),
        Command::Search { text } => search(&state, text),
        Command::Tags => tags(&state),
        Command::AddTag { name, hash } => add_tag(&state, name, hash.as_deref()),
        Command::RemoveTag { name, hash } => remove_tag(&state, name, hash.as_deref()),
        Command::Add { media } => add(&state, media),
        Command::Update { hash, update: raw } => update(&state, hash, raw),
        Command::Remove { hash } => remove(&state, hash),
        Command::Tombstones => tombstones(&state),
        Command::Session { token } => session(&state, token),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
