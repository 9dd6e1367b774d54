//! Offline replay of a subgraph snapshot.
//!
//! Reads an `EventBatch` JSON file (`created`, `lapsed`, `premiums`, `claims`,
//! `underwriters`), folds it exactly as the service would and prints:
//!   the JSON report on stdout
//!   a short human summary on stderr (unless `--quiet`)

use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use cover_analytics::{
    analysis::{assemble, replay_batch},
    config::{FoldOptions, TieBreak},
    events::EventBatch,
    logging,
};

/// Fold a JSON event snapshot into a coverage report
#[derive(Parser, Debug)]
#[command(name = "replay")]
struct ReplayArgs {
    /// Snapshot file
    #[arg(default_value = "events.json")]
    path: PathBuf,

    /// Ordering of same-timestamp events
    #[arg(long, value_enum, default_value_t = TieBreak::FetchOrder)]
    tie_break: TieBreak,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,

    /// Skip the summary
    #[arg(long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = ReplayArgs::parse();
    logging::init(&args.log_level, false);

    // ── Load snapshot ────────────────────────────────────────────────────────
    let file = File::open(&args.path).with_context(|| {
        format!("cannot open {} (export the subgraph collections first)", args.path.display())
    })?;
    let batch: EventBatch = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", args.path.display()))?;
    info!(
        created = batch.created.len(),
        lapsed = batch.lapsed.len(),
        claims = batch.claims.len(),
        premiums = batch.premiums.len(),
        "snapshot loaded"
    );

    // ── Fold ─────────────────────────────────────────────────────────────────
    let options = FoldOptions { tie_break: args.tie_break };
    let ledger = replay_batch(&batch, &options);
    let (ignored_removals, recreated_policies) = (ledger.ignored_removals, ledger.recreated_policies);
    let report = assemble(&batch, ledger);

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }?;
    println!("{json}");

    if !args.quiet {
        eprintln!("=== Replay summary ({:?}) ===", args.tie_break);
        eprintln!("  events replayed      {}", report.active_cover_history.len());
        eprintln!("  policies released    {}", report.lapsed_cover_history.len());
        eprintln!("  ignored removals     {}", ignored_removals);
        eprintln!("  re-created policies  {}", recreated_policies);
        eprintln!("  total active cover   {}", report.total_active_cover);
        eprintln!("  premiums paid        {}", report.total_premiums_paid);
        eprintln!("  claim fees           {}", report.total_claim_fees);
        eprintln!("  policy holders       {}", report.policy_holder_count);
        eprintln!("  underwriters         {}", report.underwriter_count);
    }

    Ok(())
}
