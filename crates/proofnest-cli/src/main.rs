//! ProofNest CLI: `pn` command.
//!
//! Records agent decisions into a local chain, verifies chains and proof
//! bundles, and anchors chain segments through OpenTimestamps.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use proofnest::anchor::{
    AnchorScheduler, AnchorService, BatchPlanner, EsploraClient, IntervalTrigger, Tick,
};
use proofnest::chain::{Actor, DecisionPayload, RiskLevel};
use proofnest::config::{default_data_dir, ProofnestConfig, ENV_DATA_DIR};
use proofnest::identity::{AgentSigner, KeyOptions};
use proofnest::ledger::validate_agent_name;
use proofnest::storage::{load_signer, read_public_identity, save_signer, ChainStore};
use proofnest::time::{micros_to_rfc3339, SystemClock};
use proofnest::{AnchorStatus, Chain, Ledger, ProofBundle, VerificationReport, Verifier};

/// Environment variable read before prompting for a passphrase.
const ENV_PASSPHRASE: &str = "PROOFNEST_PASSPHRASE";

// ── CLI structure ─────────────────────────────────────────────────────────────

/// ProofNest CLI: tamper-evident decision ledger for AI agents.
#[derive(Parser, Debug)]
#[command(name = "pn", about = "ProofNest decision ledger", version)]
struct Cli {
    /// Data directory (default: ~/.proofnest)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Agent name used in logs and output
    #[arg(long, global = true, default_value = "default")]
    agent: String,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new agent key and data directory
    Init {
        /// Also generate a classical Ed25519 key
        #[arg(long)]
        classical: bool,
    },

    /// Display the agent identity and chain summary
    Show,

    /// Record a decision
    Decide {
        #[arg(long)]
        action: String,

        #[arg(long, default_value = "")]
        reasoning: String,

        /// low, medium, high or critical
        #[arg(long, default_value = "low")]
        risk: String,

        #[arg(long, default_value_t = 1.0)]
        confidence: f64,

        /// Model that produced the decision
        #[arg(long)]
        model: Option<String>,

        /// Rejected option (repeatable)
        #[arg(long = "alternative")]
        alternatives: Vec<String>,
    },

    /// Verify the local chain
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a proof bundle for records [start, end]
    Export {
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Last index (default: chain head)
        #[arg(long)]
        end: Option<u64>,

        #[arg(long, short)]
        output: PathBuf,
    },

    /// Verify a proof bundle offline (or online with --online)
    VerifyBundle {
        path: PathBuf,

        /// Ask the anchoring network to confirm anchors
        #[arg(long)]
        online: bool,

        #[arg(long)]
        json: bool,
    },

    /// Anchor chain segments to Bitcoin
    Anchor {
        #[command(subcommand)]
        subcommand: AnchorCommands,
    },
}

#[derive(Subcommand, Debug)]
enum AnchorCommands {
    /// Poll pending anchors and submit the next batch
    Submit {
        /// Submit a partial batch if a full one is not waiting
        #[arg(long)]
        flush: bool,
    },

    /// Wait for pending anchors to confirm
    Wait {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        #[arg(long, default_value_t = 3600)]
        timeout_secs: u64,
    },

    /// Run the anchoring scheduler until interrupted
    Run,

    /// List stored anchors
    List,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(data_dir: Option<&Path>) -> Result<ProofnestConfig> {
    let dir = data_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(ENV_DATA_DIR).map(PathBuf::from))
        .unwrap_or_else(default_data_dir);
    let mut config = ProofnestConfig::load_or_default(dir.join("config.toml"))
        .context("failed to load configuration")?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir.to_path_buf();
    }
    Ok(config)
}

fn read_passphrase(prompt: &str) -> Result<String> {
    if let Ok(passphrase) = std::env::var(ENV_PASSPHRASE) {
        return Ok(passphrase);
    }
    eprint!("{prompt}");
    let mut passphrase = String::new();
    std::io::stdin()
        .read_line(&mut passphrase)
        .context("failed to read passphrase")?;
    Ok(passphrase.trim().to_string())
}

fn open_signer(config: &ProofnestConfig) -> Result<AgentSigner> {
    let path = config.key_path();
    if !path.exists() {
        bail!("no agent key at {} (run `pn init` first)", path.display());
    }
    let passphrase = read_passphrase("Passphrase: ")?;
    load_signer(&path, &passphrase).context("failed to unlock agent key")
}

fn open_chain(config: &ProofnestConfig) -> Result<(ChainStore, Chain)> {
    let identity =
        read_public_identity(&config.key_path()).context("failed to read agent identity")?;
    let store = ChainStore::open(&config.storage.data_dir)?;
    let chain = store
        .load_chain(identity, Arc::new(SystemClock::new()))
        .context("stored chain failed verification")?;
    Ok((store, chain))
}

fn print_report(report: &VerificationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        match (report.first_index, report.last_index) {
            (Some(first), Some(last)) => println!(
                "Checked {} record(s) [{first}, {last}]",
                report.records_checked
            ),
            _ => println!("Checked 0 records"),
        }
        for anchor in &report.anchors {
            println!(
                "  Anchor {} {}: assurance {:?}{}",
                anchor.range,
                anchor.status,
                anchor.assurance,
                if anchor.reduced_assurance { " (reduced)" } else { "" }
            );
        }
        for issue in &report.issues {
            println!("  FAIL {issue}");
        }
        println!("{}", if report.is_valid() { "VALID" } else { "INVALID" });
    }
    if !report.is_valid() {
        bail!("verification found {} issue(s)", report.issues.len());
    }
    Ok(())
}

fn build_scheduler(
    config: &ProofnestConfig,
    store: ChainStore,
    chain: Arc<RwLock<Chain>>,
) -> Result<AnchorScheduler> {
    let service = AnchorService::from_config(&config.anchor)?;
    let planner = BatchPlanner::from_config(&config.anchor)?;
    let pending = store.pending_anchors()?;
    let mut scheduler = AnchorScheduler::new(chain, service, planner)?.with_store(store);
    scheduler.resume(pending);
    Ok(scheduler)
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// `pn init [--classical]`
fn cmd_init(config: &ProofnestConfig, classical: bool) -> Result<()> {
    let key_path = config.key_path();
    if key_path.exists() {
        bail!("agent key already exists at {}", key_path.display());
    }
    std::fs::create_dir_all(&config.storage.data_dir)
        .context("failed to create data directory")?;

    let passphrase = read_passphrase("Enter passphrase for new agent key: ")?;
    if passphrase.is_empty() {
        bail!("passphrase cannot be empty");
    }
    if std::env::var(ENV_PASSPHRASE).is_err() {
        let confirm = read_passphrase("Confirm passphrase: ")?;
        if passphrase != confirm {
            bail!("passphrases do not match");
        }
    }

    let options = if classical {
        KeyOptions::dual()
    } else {
        KeyOptions::default()
    };
    let signer = AgentSigner::generate(options).context("failed to generate keys")?;
    save_signer(&signer, &key_path, &passphrase).context("failed to save agent key")?;
    if !config.config_path().exists() {
        config.save(config.config_path())?;
    }

    println!("Created agent");
    println!("  DID:     {}", signer.identity().identifier());
    println!(
        "  Schemes: {}",
        signer
            .identity()
            .schemes()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Key:     {}", key_path.display());
    Ok(())
}

/// `pn show`
fn cmd_show(config: &ProofnestConfig, agent: &str) -> Result<()> {
    let (store, chain) = open_chain(config)?;
    println!("Agent: {agent}");
    println!("  DID:      {}", chain.owner().identifier());
    println!("  Records:  {}", chain.len());
    if let Some(head) = chain.head().record() {
        println!("  Head:     #{} {}", head.index(), head.self_hash());
        println!("  Last at:  {}", head.timestamp_rfc3339());
    }
    let anchors = store.load_anchors()?;
    let confirmed = anchors
        .iter()
        .filter(|a| a.status() == AnchorStatus::Confirmed)
        .count();
    println!("  Anchors:  {} ({} confirmed)", anchors.len(), confirmed);
    if let Some(last) = chain.last_anchored_index() {
        println!("  Anchored: through #{last}");
    }
    Ok(())
}

/// `pn decide --action ...`
#[allow(clippy::too_many_arguments)]
fn cmd_decide(
    config: &ProofnestConfig,
    agent: &str,
    action: String,
    reasoning: String,
    risk: &str,
    confidence: f64,
    model: Option<String>,
    alternatives: Vec<String>,
) -> Result<()> {
    let signer = open_signer(config)?;
    let store = ChainStore::open(&config.storage.data_dir)?;
    let mut ledger = Ledger::open(agent, signer, store).context("failed to open ledger")?;

    let risk = risk.parse::<RiskLevel>()?;
    let payload = DecisionPayload::new(Actor::ai(agent, model), action, reasoning, risk)?
        .with_confidence(confidence);
    let record = ledger.decide(&payload, alternatives)?;

    println!("Recorded decision #{}", record.index());
    println!("  ID:        {}", payload.decision_id);
    println!("  Self hash: {}", record.self_hash());
    println!("  At:        {}", record.timestamp_rfc3339());
    Ok(())
}

/// `pn verify`
fn cmd_verify(config: &ProofnestConfig, json: bool) -> Result<()> {
    let identity =
        read_public_identity(&config.key_path()).context("failed to read agent identity")?;
    let store = ChainStore::open(&config.storage.data_dir)?;
    let records = store.load_records()?;
    let report = Verifier::default().verify_records(&identity, &records, &[]);
    print_report(&report, json)
}

/// `pn export --start S --end E -o FILE`
fn cmd_export(config: &ProofnestConfig, start: u64, end: Option<u64>, output: &Path) -> Result<()> {
    let (_, chain) = open_chain(config)?;
    let end = match end {
        Some(end) => end,
        None => chain
            .head()
            .record()
            .map(|r| r.index())
            .ok_or_else(|| anyhow!("chain is empty"))?,
    };
    let bundle = ProofBundle::export(&chain, start, end)?;
    bundle.write_to(output)?;
    println!(
        "Exported records [{start}, {end}] with {} anchor(s) to {}",
        bundle.anchors.len(),
        output.display()
    );
    Ok(())
}

/// `pn verify-bundle FILE [--online]`
async fn cmd_verify_bundle(
    config: &ProofnestConfig,
    path: &Path,
    online: bool,
    json: bool,
) -> Result<()> {
    let bundle = ProofBundle::read_from(path).context("failed to read bundle")?;
    let report = if online {
        let service = AnchorService::from_config(&config.anchor)?;
        let blocks = EsploraClient::new(
            &config.anchor.block_explorer_url,
            Duration::from_secs(config.anchor.request_timeout_secs),
        )?;
        Verifier::default()
            .with_network(service.network())
            .with_block_source(Arc::new(blocks))
            .verify_online(&bundle)
            .await
    } else {
        bundle.verify()
    };
    if !json {
        println!("Bundle by {}", bundle.identity.identifier());
    }
    print_report(&report, json)
}

/// `pn anchor submit [--flush]`
async fn cmd_anchor_submit(config: &ProofnestConfig, flush: bool) -> Result<()> {
    let (store, chain) = open_chain(config)?;
    let chain = Arc::new(RwLock::new(chain));
    let mut scheduler = build_scheduler(config, store, chain)?;

    let tick = if flush { Tick::Flush } else { Tick::Regular };
    let report = scheduler.run_once(tick).await?;
    for range in &report.confirmed {
        println!("Confirmed {range}");
    }
    for range in &report.failed {
        println!("Failed    {range} (will be re-batched)");
    }
    match report.submitted {
        Some(range) => println!("Submitted {range}"),
        None => println!("Nothing to submit"),
    }
    println!("{} anchor(s) pending", scheduler.pending().len());
    Ok(())
}

/// `pn anchor wait`
async fn cmd_anchor_wait(config: &ProofnestConfig, interval: u64, timeout: u64) -> Result<()> {
    let (store, mut chain) = open_chain(config)?;
    let service = AnchorService::from_config(&config.anchor)?;
    let pending = store.pending_anchors()?;
    if pending.is_empty() {
        println!("No pending anchors");
        return Ok(());
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    for anchor in pending {
        let outcome = service
            .wait_for_confirmation(
                &anchor,
                Duration::from_secs(interval),
                cancel_rx.clone(),
                Duration::from_secs(timeout),
            )
            .await;
        let updated = match outcome {
            Ok(updated) => updated,
            Err(e) => {
                println!("Anchor {}: {e}", anchor.range());
                continue;
            }
        };
        store.save_anchor(&updated)?;
        if updated.status() == AnchorStatus::Confirmed {
            chain.attach_anchor(updated.clone())?;
        }
        println!(
            "Anchor {}: {}{}",
            updated.range(),
            updated.status(),
            updated
                .block_height()
                .map(|h| format!(" at block {h}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

/// `pn anchor run`
async fn cmd_anchor_run(config: &ProofnestConfig) -> Result<()> {
    let (store, chain) = open_chain(config)?;
    let chain = Arc::new(RwLock::new(chain));
    let scheduler = build_scheduler(config, store, chain)?;
    let trigger = IntervalTrigger::new(Duration::from_secs(config.anchor.interval_secs));

    println!(
        "Anchoring every {}s (batch size {}), Ctrl-C to stop",
        config.anchor.interval_secs, config.anchor.batch_size
    );
    tokio::select! {
        pending = scheduler.run(trigger) => {
            println!("Scheduler stopped with {} pending anchor(s)", pending.len());
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted");
        }
    }
    Ok(())
}

/// `pn anchor list`
fn cmd_anchor_list(config: &ProofnestConfig) -> Result<()> {
    let store = ChainStore::open(&config.storage.data_dir)?;
    let anchors = store.load_anchors()?;
    if anchors.is_empty() {
        println!("No anchors");
    }
    for anchor in anchors {
        println!(
            "{} {:<9} root {} submitted {}{}",
            anchor.range(),
            anchor.status().to_string(),
            anchor.batch_root(),
            micros_to_rfc3339(anchor.submitted_at()),
            anchor
                .failure()
                .map(|f| format!(" ({f})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

// ── main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    validate_agent_name(&cli.agent)?;
    let config = load_config(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init { classical } => cmd_init(&config, classical),
        Commands::Show => cmd_show(&config, &cli.agent),
        Commands::Decide {
            action,
            reasoning,
            risk,
            confidence,
            model,
            alternatives,
        } => cmd_decide(
            &config,
            &cli.agent,
            action,
            reasoning,
            &risk,
            confidence,
            model,
            alternatives,
        ),
        Commands::Verify { json } => cmd_verify(&config, json),
        Commands::Export { start, end, output } => cmd_export(&config, start, end, &output),
        Commands::VerifyBundle { path, online, json } => {
            cmd_verify_bundle(&config, &path, online, json).await
        }
        Commands::Anchor { subcommand } => match subcommand {
            AnchorCommands::Submit { flush } => cmd_anchor_submit(&config, flush).await,
            AnchorCommands::Wait {
                interval_secs,
                timeout_secs,
            } => cmd_anchor_wait(&config, interval_secs, timeout_secs).await,
            AnchorCommands::Run => cmd_anchor_run(&config).await,
            AnchorCommands::List => cmd_anchor_list(&config),
        },
    }
}
