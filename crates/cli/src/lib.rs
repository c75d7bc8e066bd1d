use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use govsync_assembler::{AssembleOptions, SyncEngine};
use govsync_protocol::{LedgerSnapshot, MemoryLedger};
use govsync_ranker::RankingConfig;
use govsync_store::SyncConfig;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "govsync")]
#[command(about = "Materialized views over a governance ledger", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ledger snapshot (JSON) to read records and chunks from
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// TOML config file; missing keys keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local state directory (overrides config and GOVSYNC_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Parallel ledger fetches, 1-10 (overrides config and GOVSYNC_FETCH_CONCURRENCY)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank candidate topics and pick the next voting area
    Rank(RankArgs),

    /// Assemble one or more proposal views
    Proposal(ProposalArgs),

    /// Assemble every proposal filed under a topic
    Topic(TopicArgs),

    /// Print the flattened taxonomy (topic, priority) in ranking order
    Taxonomy,

    /// Show one citizen's rating and complaints on a proposal
    Feedback(FeedbackArgs),

    /// Show a voter's active vote on a topic
    #[command(name = "prior-vote")]
    PriorVote(PriorVoteArgs),

    /// Fold the vote at an index of the current vote contract into the rollups
    #[command(name = "apply-vote")]
    ApplyVote(ApplyVoteArgs),

    /// Rebuild the rollups from every vote on the ledger
    #[command(name = "sync-votes")]
    SyncVotes,

    /// Print per-topic vote counts
    Counts,
}

#[derive(Args)]
struct RankArgs {
    /// TOML file with rank bands / max_priority overrides
    #[arg(long)]
    ranking: Option<PathBuf>,
}

#[derive(Args)]
struct ProposalArgs {
    /// Proposal ids, e.g. ZTMProposal:v1:3
    #[arg(required = true)]
    ids: Vec<String>,

    /// Resolve each active vote (voter, direction, custom amounts)
    #[arg(long)]
    votes: bool,
}

#[derive(Args)]
struct TopicArgs {
    /// Full slash-separated topic path
    topic: String,

    /// Resolve each active vote (voter, direction, custom amounts)
    #[arg(long)]
    votes: bool,
}

#[derive(Args)]
struct FeedbackArgs {
    /// Proposal id
    proposal: String,

    /// Citizen address
    #[arg(long)]
    citizen: String,
}

fn assemble_options(votes: bool) -> AssembleOptions {
    AssembleOptions {
        with_vote_info: votes,
    }
}

#[derive(Args)]
struct PriorVoteArgs {
    #[arg(long)]
    voter: String,

    #[arg(long)]
    topic: String,
}

#[derive(Args)]
struct ApplyVoteArgs {
    index: u64,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = resolve_config(&cli)?;
    let ledger_path = cli
        .ledger
        .as_deref()
        .context("--ledger <snapshot.json> is required")?;
    let ledger = load_ledger(ledger_path)?;
    let engine = SyncEngine::open(config, ledger)
        .await
        .context("Failed to open local state")?;

    match cli.command {
        Commands::Rank(args) => run_rank(engine, args).await,
        Commands::Proposal(args) => run_proposal(&engine, args).await,
        Commands::Topic(args) => {
            let outcome = engine
                .topic_proposals_with(&args.topic, assemble_options(args.votes))
                .await
                .with_context(|| format!("Failed to list proposals for {}", args.topic))?;
            print_json(&outcome)
        }
        Commands::Taxonomy => {
            let taxonomy = engine.taxonomy().await.context("Failed to load taxonomy")?;
            print_json(&taxonomy.flatten())
        }
        Commands::Feedback(args) => {
            let feedback = engine
                .citizen_feedback(&args.proposal, &args.citizen)
                .await
                .with_context(|| format!("Failed to read feedback on {}", args.proposal))?;
            print_json(&feedback)
        }
        Commands::PriorVote(args) => {
            let vote = engine
                .prior_vote(&args.voter, &args.topic)
                .await
                .context("Failed to read prior vote")?;
            print_json(&vote)
        }
        Commands::ApplyVote(args) => {
            let outcome = engine
                .apply_vote_index(args.index)
                .await
                .with_context(|| format!("Failed to apply vote {}", args.index))?;
            print_json(&outcome)
        }
        Commands::SyncVotes => {
            let outcome = engine.sync_votes().await.context("Vote sync failed")?;
            if !outcome.is_complete() {
                log::warn!("{} votes could not be applied", outcome.failed.len());
            }
            print_json(&outcome)
        }
        Commands::Counts => print_json(&engine.rollup().vote_counts()),
    }
}

fn resolve_config(cli: &Cli) -> Result<SyncConfig> {
    let base = match &cli.config {
        Some(path) => SyncConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SyncConfig::default(),
    };
    let mut config = base.with_env_overrides();
    if let Some(home) = &cli.home {
        config.home.clone_from(home);
    }
    if let Some(concurrency) = cli.concurrency {
        config.fetch_concurrency = concurrency;
    }
    Ok(config.validated()?)
}

fn load_ledger(path: &Path) -> Result<Arc<MemoryLedger>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read ledger snapshot {}", path.display()))?;
    let snapshot: LedgerSnapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("Invalid ledger snapshot {}", path.display()))?;
    let ledger = MemoryLedger::from_snapshot(snapshot)?;
    Ok(Arc::new(ledger))
}

async fn run_rank(engine: SyncEngine, args: RankArgs) -> Result<()> {
    let engine = match &args.ranking {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let ranking: RankingConfig = toml::from_str(&raw)
                .with_context(|| format!("Invalid ranking config {}", path.display()))?;
            engine.with_ranking(ranking)
        }
        None => engine,
    };
    let ranking = engine.rank_topics().await.context("Ranking failed")?;
    if !ranking.is_complete() {
        log::warn!("{} topics could not be checked for proposals", ranking.failed.len());
    }
    print_json(&ranking)
}

async fn run_proposal(engine: &SyncEngine, args: ProposalArgs) -> Result<()> {
    let options = assemble_options(args.votes);
    if let [id] = args.ids.as_slice() {
        let view = engine
            .assemble_proposal_with(id, options)
            .await
            .with_context(|| format!("Failed to assemble {id}"))?;
        return print_json(&view);
    }
    let outcome = engine.assemble_proposals(args.ids, options).await;
    print_json(&outcome)
}
