//! Sage CLI - personal knowledge graph and review scheduler

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};

use sage_core::clock::{SystemClock, UuidGenerator};
use sage_core::config::Config;
use sage_core::domain::graph::{
    Concept, ConceptGraphStore, ConceptMerger, ConceptUpdate, GraphTraversal, HierarchyOptions,
    NewConcept, PathOptions, RelatedOptions, Relationship, RelationshipType,
};
use sage_core::domain::locking::LockManager;
use sage_core::domain::review::{
    KnowledgeEntry, ReviewResponse, ReviewScheduler, ReviewSession, ReviewSessionManager,
};
use sage_core::infrastructure::graph::SqliteGraphRepository;
use sage_core::infrastructure::review::{
    SqliteKnowledgeEntryRepository, SqliteReviewSessionRepository,
};
use sage_core::storage::{Database, DatabaseConfig};


#[derive(Parser)]
#[command(name = "sage")]
#[command(author, version, about = "Personal knowledge graph and spaced review", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Owner whose graph and entries are used
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    /// Database file (overrides database.path from the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage concepts and relationships
    Concept {
        #[command(subcommand)]
        action: ConceptAction,
    },

    /// Manage knowledge entries
    Entry {
        #[command(subcommand)]
        action: EntryAction,
    },

    /// Run review sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConceptAction {
    /// Create a concept
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Alternative name (repeatable)
        #[arg(short, long = "alias")]
        aliases: Vec<String>,
    },
    /// Show a concept and its relationships
    Show { id: String },
    /// List all concepts
    List,
    /// Update a concept
    Update {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        /// Replace the aliases (repeatable)
        #[arg(short, long = "alias")]
        aliases: Option<Vec<String>>,
    },
    /// Delete a concept and its relationships
    Delete {
        id: String,
        #[arg(long)]
        force: bool,
    },
    /// Create or update a relationship
    Link {
        source: String,
        target: String,
        #[arg(short = 't', long = "type", default_value = "related_to")]
        relationship_type: RelationshipType,
        #[arg(short, long)]
        strength: Option<f64>,
    },
    /// Remove relationships from source to target
    Unlink {
        source: String,
        target: String,
        #[arg(short = 't', long = "type")]
        relationship_type: Option<RelationshipType>,
    },
    /// List relationships touching a concept
    Edges { id: String },
    /// Concepts reachable from a concept
    Related {
        id: String,
        #[arg(short, long)]
        depth: Option<usize>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short = 't', long = "type", value_delimiter = ',')]
        types: Vec<RelationshipType>,
        #[arg(long)]
        min_strength: Option<f64>,
    },
    /// Shortest directed path between two concepts
    Path {
        source: String,
        target: String,
        #[arg(short = 'd', long)]
        max_depth: Option<usize>,
        #[arg(short = 't', long = "type", value_delimiter = ',')]
        types: Vec<RelationshipType>,
    },
    /// Ancestors and descendants along hierarchical relationships
    Hierarchy {
        id: String,
        #[arg(long)]
        ancestors: Option<usize>,
        #[arg(long)]
        descendants: Option<usize>,
    },
    /// Search concepts by name, alias or description
    Find {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Most connected concepts
    Top {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Fold SOURCE into TARGET
    Merge { source: String, target: String },
}

#[derive(Subcommand)]
enum EntryAction {
    /// Add a knowledge entry
    Add { content: String },
    /// List knowledge entries
    List,
    /// Schedule an entry for review now
    Enroll { id: String },
    /// Entries due for review
    Due {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Record a review outside of a session
    Review {
        id: String,
        response: ReviewResponse,
        #[arg(long)]
        time_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Start a session over the given entries (or the due entries)
    Start {
        entry_ids: Vec<String>,
        #[arg(long)]
        due: bool,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the active session
    Active,
    /// Show a session
    Show { id: String },
    /// List sessions, newest first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Record the response to one item
    Answer {
        session_id: String,
        entry_id: String,
        response: ReviewResponse,
        #[arg(long)]
        time_ms: Option<u64>,
    },
    /// Complete a session
    Complete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show config file path
    Path,
}

type GraphRepo = SqliteGraphRepository;
type EntryRepo = SqliteKnowledgeEntryRepository;
type SessionRepo = SqliteReviewSessionRepository;

/// Components wired over one SQLite database
struct App {
    db: Database,
    store: ConceptGraphStore<GraphRepo>,
    traversal: GraphTraversal<GraphRepo>,
    merger: ConceptMerger<GraphRepo>,
    scheduler: Arc<ReviewScheduler<EntryRepo>>,
    sessions: ReviewSessionManager<SessionRepo, EntryRepo>,
}

impl App {
    async fn open(config: &Config, database: Option<PathBuf>) -> anyhow::Result<Self> {
        let db_config = match database {
            Some(path) => DatabaseConfig::with_path(path),
            None => DatabaseConfig::from_settings(&config.database),
        };
        let db = Database::new(db_config)
            .await
            .context("Failed to open the sage database")?;
        debug!(path = %db.path().display(), "Database opened");

        let clock = Arc::new(SystemClock);
        let ids = Arc::new(UuidGenerator);
        let locks = Arc::new(LockManager::new());

        let graph = Arc::new(SqliteGraphRepository::new(db.pool().clone()));
        let entries = Arc::new(SqliteKnowledgeEntryRepository::new(db.pool().clone()));
        let session_repo = Arc::new(SqliteReviewSessionRepository::new(db.pool().clone()));

        let scheduler = Arc::new(ReviewScheduler::new(
            entries,
            locks.clone(),
            clock.clone(),
            ids.clone(),
            config.review.clone(),
        ));

        Ok(Self {
            store: ConceptGraphStore::new(graph.clone(), locks.clone(), clock.clone(), ids.clone()),
            traversal: GraphTraversal::new(graph.clone(), config.graph.clone()),
            merger: ConceptMerger::new(graph, locks.clone(), clock.clone()),
            sessions: ReviewSessionManager::new(
                session_repo,
                scheduler.clone(),
                locks,
                clock,
                ids,
                config.review.clone(),
            ),
            scheduler,
            db,
        })
    }
}

/// Print `value` as JSON, or run `text` for the text format
fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("sage=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Config { action } => cmd_config(action, out),

        Commands::Doctor => cmd_doctor(cli.database, out).await,

        Commands::Concept { action } => {
            let app = App::open(&Config::load()?, cli.database).await?;
            cmd_concept(&app, &cli.owner, action, out).await
        }

        Commands::Entry { action } => {
            let app = App::open(&Config::load()?, cli.database).await?;
            cmd_entry(&app, &cli.owner, action, out).await
        }

        Commands::Session { action } => {
            let app = App::open(&Config::load()?, cli.database).await?;
            cmd_session(&app, &cli.owner, action, out).await
        }
    }
}

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

// ============================================================================
// Formatting
// ============================================================================

fn concept_line(c: &Concept) -> String {
    let mut line = format!("  {} - {}", c.id, c.name);
    if !c.aliases.is_empty() {
        line.push_str(&format!(" (aka {})", c.aliases.join(", ")));
    }
    line
}

fn relationship_line(r: &Relationship) -> String {
    format!(
        "  {} -[{} {:.2}]-> {}",
        r.source_id, r.relationship_type, r.strength, r.target_id
    )
}

fn entry_line(e: &KnowledgeEntry) -> String {
    let next = e
        .next_review_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unscheduled".to_string());
    format!(
        "  {} - {} [retention {:.2}, reviews {}, next {}]",
        e.id, e.content, e.retention_score, e.review_count, next
    )
}

fn print_session(s: &ReviewSession) {
    println!("Session: {}", s.id);
    println!("  Status: {}", s.status().as_str());
    println!("  Started: {}", s.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(done) = s.completed_at {
        println!("  Completed: {}", done.format("%Y-%m-%d %H:%M:%S"));
        println!(
            "  Stats: {}/{} presented, {} correct, {:.0} ms average",
            s.stats.completed_items,
            s.stats.total_items,
            s.stats.correct_count,
            s.stats.average_response_time_ms
        );
    }
    println!("  Items:");
    for item in &s.items {
        let state = match item.response {
            Some(response) => response.as_str(),
            None => "pending",
        };
        println!("    {} [{}]", item.entry_id, state);
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_concept(
    app: &App,
    owner: &str,
    action: ConceptAction,
    out: Output,
) -> anyhow::Result<()> {
    match action {
        ConceptAction::Add {
            name,
            description,
            aliases,
        } => {
            let mut draft = NewConcept::new(owner, name).with_aliases(aliases);
            draft.description = description;
            let concept = app.store.create_concept(draft).await?;
            emit(out.format, &concept, || {
                if out.quiet {
                    println!("{}", concept.id);
                } else {
                    println!("Concept created: {}", concept.name);
                    println!("  ID: {}", concept.id);
                }
            })?;
        }
        ConceptAction::Show { id } => {
            let concept = app.store.get_concept(&id).await?;
            let edges = app.store.list_relationships(&id).await?;
            let value = serde_json::json!({ "concept": concept, "relationships": edges });
            emit(out.format, &value, || {
                println!("Concept: {}", concept.name);
                println!("  ID: {}", concept.id);
                if let Some(desc) = &concept.description {
                    println!("  Description: {}", desc);
                }
                if !concept.aliases.is_empty() {
                    println!("  Aliases: {}", concept.aliases.join(", "));
                }
                println!("  Entries: {}", concept.entry_count);
                println!("  Created: {}", concept.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!("  Updated: {}", concept.updated_at.format("%Y-%m-%d %H:%M:%S"));
                if !edges.is_empty() {
                    println!("  Relationships:");
                    for edge in &edges {
                        println!("  {}", relationship_line(edge));
                    }
                }
            })?;
        }
        ConceptAction::List => {
            let concepts = app.store.list_concepts(owner).await?;
            emit(out.format, &concepts, || {
                if concepts.is_empty() {
                    if !out.quiet {
                        println!("No concepts found.");
                        println!("\nCreate one with: sage concept add <name>");
                    }
                    return;
                }
                if !out.quiet {
                    println!("Concepts:");
                }
                for c in &concepts {
                    println!("{}", concept_line(c));
                }
            })?;
        }
        ConceptAction::Update {
            id,
            name,
            description,
            clear_description,
            aliases,
        } => {
            let update = ConceptUpdate {
                name,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                aliases,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update. Pass --name, --description or --alias.");
            }
            let concept = app.store.update_concept(&id, update).await?;
            emit(out.format, &concept, || {
                if !out.quiet {
                    println!("Concept '{}' updated.", concept.id);
                }
            })?;
        }
        ConceptAction::Delete { id, force } => {
            if !force && !out.quiet {
                println!(
                    "Warning: This will delete concept '{}' and all of its relationships.",
                    id
                );
                println!("Use --force to confirm deletion.");
                return Ok(());
            }
            app.store.delete_concept(&id).await?;
            if !out.quiet {
                println!("Concept '{}' deleted.", id);
            }
        }
        ConceptAction::Link {
            source,
            target,
            relationship_type,
            strength,
        } => {
            let edge = app
                .store
                .create_relationship(&source, &target, relationship_type, strength)
                .await?;
            emit(out.format, &edge, || {
                if !out.quiet {
                    println!("Linked:{}", relationship_line(&edge));
                }
            })?;
        }
        ConceptAction::Unlink {
            source,
            target,
            relationship_type,
        } => {
            let removed = app
                .store
                .remove_relationship(&source, &target, relationship_type)
                .await?;
            emit(out.format, &serde_json::json!({ "removed": removed }), || {
                if !out.quiet {
                    println!("Removed {} relationship(s).", removed);
                }
            })?;
        }
        ConceptAction::Edges { id } => {
            let edges = app.store.list_relationships(&id).await?;
            emit(out.format, &edges, || {
                if edges.is_empty() && !out.quiet {
                    println!("No relationships.");
                }
                for edge in &edges {
                    println!("{}", relationship_line(edge));
                }
            })?;
        }
        ConceptAction::Related {
            id,
            depth,
            limit,
            types,
            min_strength,
        } => {
            let options = RelatedOptions {
                types: (!types.is_empty()).then_some(types),
                depth,
                limit,
                min_strength,
            };
            let related = app.traversal.get_related(&id, options).await?;
            emit(out.format, &related, || {
                if related.is_empty() && !out.quiet {
                    println!("No related concepts.");
                }
                for r in &related {
                    println!(
                        "{} [{} {:.2}]",
                        concept_line(&r.concept),
                        r.relationship_type,
                        r.strength
                    );
                }
            })?;
        }
        ConceptAction::Path {
            source,
            target,
            max_depth,
            types,
        } => {
            let options = PathOptions {
                max_depth,
                relationship_types: (!types.is_empty()).then_some(types),
            };
            let path = app.traversal.find_path(&source, &target, options).await?;
            emit(out.format, &path, || match &path {
                Some(path) => {
                    let names: Vec<&str> = path.nodes.iter().map(|n| n.name.as_str()).collect();
                    println!("{}", names.join(" -> "));
                    if !out.quiet {
                        println!("Length: {}", path.length);
                    }
                }
                None => println!("No path found."),
            })?;
        }
        ConceptAction::Hierarchy {
            id,
            ancestors,
            descendants,
        } => {
            let options = HierarchyOptions {
                ancestor_depth: ancestors,
                descendant_depth: descendants,
            };
            let hierarchy = app.traversal.get_hierarchy(&id, options).await?;
            emit(out.format, &hierarchy, || {
                println!("Concept: {}", hierarchy.concept.name);
                println!("Ancestors:");
                for c in &hierarchy.ancestors {
                    println!("{}", concept_line(c));
                }
                println!("Descendants:");
                for c in &hierarchy.descendants {
                    println!("{}", concept_line(c));
                }
            })?;
        }
        ConceptAction::Find { query, limit } => {
            let found = app.traversal.find_concepts(&query, owner, limit).await?;
            emit(out.format, &found, || {
                if found.is_empty() && !out.quiet {
                    println!("No concepts match '{}'.", query);
                }
                for c in &found {
                    println!("{}", concept_line(c));
                }
            })?;
        }
        ConceptAction::Top { limit } => {
            let top = app.traversal.get_top_concepts(owner, limit).await?;
            emit(out.format, &top, || {
                for t in &top {
                    println!(
                        "{} [{} connections, avg {:.2}]",
                        concept_line(&t.concept),
                        t.connection_count,
                        t.avg_relationship_strength
                    );
                }
            })?;
        }
        ConceptAction::Merge { source, target } => {
            let merged = app.merger.merge_concepts(&source, &target).await?;
            emit(out.format, &merged, || {
                if !out.quiet {
                    println!("Merged '{}' into '{}'.", source, merged.name);
                }
            })?;
        }
    }
    Ok(())
}

async fn cmd_entry(app: &App, owner: &str, action: EntryAction, out: Output) -> anyhow::Result<()> {
    match action {
        EntryAction::Add { content } => {
            let entry = app.scheduler.add_entry(owner, &content).await?;
            emit(out.format, &entry, || {
                if out.quiet {
                    println!("{}", entry.id);
                } else {
                    println!("Entry added.");
                    println!("  ID: {}", entry.id);
                    println!("\nSchedule it with: sage entry enroll {}", entry.id);
                }
            })?;
        }
        EntryAction::List => {
            let entries = app.scheduler.list_entries(owner).await?;
            emit(out.format, &entries, || {
                if entries.is_empty() && !out.quiet {
                    println!("No entries found.");
                }
                for e in &entries {
                    println!("{}", entry_line(e));
                }
            })?;
        }
        EntryAction::Enroll { id } => {
            let entry = app.scheduler.enroll_entry(&id).await?;
            emit(out.format, &entry, || {
                if !out.quiet {
                    println!("Entry '{}' scheduled.", entry.id);
                }
            })?;
        }
        EntryAction::Due { limit } => {
            let due = app.scheduler.find_due_for_review(owner, limit).await?;
            emit(out.format, &due, || {
                if due.is_empty() && !out.quiet {
                    println!("Nothing is due for review.");
                }
                for e in &due {
                    println!("{}", entry_line(e));
                }
            })?;
        }
        EntryAction::Review {
            id,
            response,
            time_ms,
        } => {
            let entry = app.scheduler.record_review(&id, response, time_ms).await?;
            emit(out.format, &entry, || {
                if !out.quiet {
                    println!("Recorded '{}'.", response);
                    println!("{}", entry_line(&entry));
                }
            })?;
        }
    }
    Ok(())
}

async fn cmd_session(
    app: &App,
    owner: &str,
    action: SessionAction,
    out: Output,
) -> anyhow::Result<()> {
    match action {
        SessionAction::Start {
            mut entry_ids,
            due,
            limit,
        } => {
            if due {
                let due_entries = app.scheduler.find_due_for_review(owner, limit).await?;
                entry_ids.extend(due_entries.into_iter().map(|e| e.id));
            }
            let session = app.sessions.create_session(owner, entry_ids).await?;
            emit(out.format, &session, || {
                if out.quiet {
                    println!("{}", session.id);
                } else {
                    println!("Session started with {} item(s).", session.items.len());
                    println!("  ID: {}", session.id);
                }
            })?;
        }
        SessionAction::Active => {
            let active = app.sessions.find_active_session(owner).await?;
            emit(out.format, &active, || match &active {
                Some(session) => print_session(session),
                None => println!("No active session."),
            })?;
        }
        SessionAction::Show { id } => {
            let session = app.sessions.get_session(&id).await?;
            emit(out.format, &session, || print_session(&session))?;
        }
        SessionAction::List { limit } => {
            let sessions = app.sessions.list_sessions(owner, limit).await?;
            emit(out.format, &sessions, || {
                if sessions.is_empty() && !out.quiet {
                    println!("No sessions found.");
                }
                for s in &sessions {
                    println!(
                        "  {} [{}] {} item(s), started {}",
                        s.id,
                        s.status().as_str(),
                        s.items.len(),
                        s.started_at.format("%Y-%m-%d %H:%M")
                    );
                }
            })?;
        }
        SessionAction::Answer {
            session_id,
            entry_id,
            response,
            time_ms,
        } => {
            let session = app
                .sessions
                .record_item_response(&session_id, &entry_id, response, time_ms)
                .await?;
            emit(out.format, &session, || {
                if !out.quiet {
                    let pending = session.items.iter().filter(|i| !i.presented).count();
                    println!("Recorded '{}' for {}.", response, entry_id);
                    println!("  {} item(s) remaining.", pending);
                }
            })?;
        }
        SessionAction::Complete { id } => {
            let session = app.sessions.complete_session(&id).await?;
            emit(out.format, &session, || print_session(&session))?;
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !out.quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for key in Config::keys() {
                println!("{} = {}", key, config.get(key)?);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<PathBuf>, out: Output) -> anyhow::Result<()> {
    if !out.quiet {
        println!("Sage Health Check");
        println!("=================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !out.quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !out.quiet {
                println!("[!!] Configuration: Error - {:#}", e);
            }
            Config::default()
        }
    };

    match App::open(&config, database).await {
        Ok(app) => {
            if !out.quiet {
                println!("[OK] Database: {}", app.db.path().display());
            }
            let status = app.db.migration_status().await?;
            if !out.quiet {
                println!(
                    "[OK] Schema: version {} of {}",
                    status.current_version, status.target_version
                );
            }
            match app.store.health_check().await {
                Ok(()) => {
                    if !out.quiet {
                        println!("[OK] Storage: Reachable");
                    }
                }
                Err(e) => {
                    all_ok = false;
                    warn!(error = %e, "Storage health check failed");
                    if !out.quiet {
                        println!("[!!] Storage: {} ({})", e, e.code());
                    }
                }
            }
            app.db.close().await;
        }
        Err(e) => {
            all_ok = false;
            if !out.quiet {
                println!("[!!] Database: Error - {:#}", e);
            }
        }
    }

    if !out.quiet {
        println!();
        if all_ok {
            println!("All checks passed.");
        } else {
            println!("Some checks failed.");
        }
    }

    if all_ok {
        Ok(())
    } else {
        Err(anyhow::anyhow!("health check failed"))
    }
}
