//! CLI binary for gradestamp.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` and prints the run report.

use anyhow::{Context, Result};
use clap::Parser;
use gradestamp::config::{DEFAULT_DESTINATION, DEFAULT_ROSTER_PATH, DEFAULT_SOURCE_PATH};
use gradestamp::{
    inspect, render_stamp, run, BatchConfig, BatchProgressCallback, BatchReport, BatchState,
    BoxSummary, ProgressCallback, StampPlacement,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. The bar counts every record twice, once for
/// stamping and once for writing (or once for a skip in either phase), so
/// it reaches 100% exactly when the batch is done.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading roster…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_records: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} steps  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_records as u64 * 2);
        self.bar.set_style(style);
        self.bar.set_prefix("Stamping");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_records} records…"))
        ));
    }

    fn on_phase(&self, state: BatchState) {
        match state {
            BatchState::Annotated => self.bar.set_prefix("Splitting"),
            BatchState::Done => self.bar.set_prefix("Cleaning up"),
            _ => {}
        }
    }

    fn on_record_stamped(&self, identifier: &str, page_num: u32) {
        self.bar.set_message(format!("{identifier} (page {page_num})"));
        self.bar.inc(1);
    }

    fn on_record_written(&self, identifier: &str, path: &Path, page_count: usize) {
        self.bar.println(format!(
            "  {} {:<20} {}  {}",
            green("✓"),
            identifier,
            dim(&format!("{page_count:>2} p.")),
            dim(&path.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_record_skipped(&self, identifier: &str, error: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {:<20} {}", red("✗"), identifier, red(&msg)));
        // A skipped record never reaches its second step.
        self.bar.inc(2);
    }

    fn on_batch_complete(&self, succeeded: usize, skipped: usize) {
        self.bar.finish_and_clear();
        if skipped == 0 {
            eprintln!(
                "{} {} records written",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} records written  ({} skipped)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                succeeded + skipped,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stamp and split with the default layout under ./data
  gradestamp

  # Explicit paths
  gradestamp -r klasse3b.csv -s scan.pdf -d out/

  # Check the roster without touching any PDF
  gradestamp --preview

  # Render one student's stamp to a PNG
  gradestamp --stamp-only Mueller --png mueller.png

  # Move the stamp to the bottom-left corner of an A4 page
  gradestamp --anchor-x 40 --anchor-y 650 --stamp-width 180

  # Machine-readable report; fail if any record was skipped
  gradestamp --json --strict > report.json

ROSTER FORMAT:
  Semicolon-separated UTF-8 with a header row. Required columns:
    Name (or any column starting with "Nach"), Vorname, Note, Total,
    Titel, Datum, First, Last
  Rows with an empty cell are dropped. First/Last are 1-based page numbers
  into the source PDF. Decimal commas are accepted.

OUTPUT:
  <dest>/<Name>/<Datum>_<Name>_<Titel>.pdf

ENVIRONMENT VARIABLES:
  GRADESTAMP_ROSTER   Roster path
  GRADESTAMP_SOURCE   Source PDF path
  GRADESTAMP_DEST     Destination folder
  RUST_LOG            Log filter (overrides --verbose / --quiet)
"#;

/// Stamp graded exam pages with a class box-plot and split them per student.
#[derive(Parser, Debug)]
#[command(
    name = "gradestamp",
    version,
    about = "Stamp graded exam pages with a class box-plot and split them per student",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// `;`-separated roster file.
    #[arg(short, long, env = "GRADESTAMP_ROSTER", default_value = DEFAULT_ROSTER_PATH)]
    roster: PathBuf,

    /// Multi-page source PDF the page ranges refer to.
    #[arg(short, long, env = "GRADESTAMP_SOURCE", default_value = DEFAULT_SOURCE_PATH)]
    source: PathBuf,

    /// Destination folder; one sub-folder per student is created.
    #[arg(short, long, env = "GRADESTAMP_DEST", default_value = DEFAULT_DESTINATION)]
    dest: PathBuf,

    /// Stamp distance from the left page edge, in points.
    #[arg(long, default_value_t = StampPlacement::default().x)]
    anchor_x: f32,

    /// Stamp distance from the top page edge, in points.
    #[arg(long, default_value_t = StampPlacement::default().y)]
    anchor_y: f32,

    /// Stamp width on the page, in points; height follows the image.
    #[arg(long, default_value_t = StampPlacement::default().max_width)]
    stamp_width: f32,

    /// Number of output files written at the same time.
    #[arg(short, long, env = "GRADESTAMP_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print the run report (or preview) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "GRADESTAMP_NO_PROGRESS")]
    no_progress: bool,

    /// Load and print the normalised roster only; no PDF work.
    #[arg(long, conflicts_with = "stamp_only")]
    preview: bool,

    /// Render the stamp for one identifier instead of running the batch.
    #[arg(long, value_name = "IDENTIFIER", requires = "png")]
    stamp_only: Option<String>,

    /// Target file for `--stamp-only`.
    #[arg(long, value_name = "FILE")]
    png: Option<PathBuf>,

    /// Exit non-zero if any record was skipped.
    #[arg(long)]
    strict: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GRADESTAMP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GRADESTAMP_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters, so library
    // INFO logs are hidden while it is active.
    let batch_mode = !cli.preview && cli.stamp_only.is_none();
    let show_progress = batch_mode && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Preview mode ─────────────────────────────────────────────────────
    if cli.preview {
        let dataset = inspect(&cli.roster)
            .await
            .context("Failed to load roster")?;
        let summary = BoxSummary::from_grades(&dataset.grades());

        if cli.json {
            let json = serde_json::json!({
                "records": dataset.records(),
                "dropped_rows": dataset.dropped_rows(),
                "summary": summary,
                "classification": summary.as_ref().map(BoxSummary::classification),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialise preview")?
            );
        } else {
            println!("Roster:       {}", cli.roster.display());
            println!("Records:      {}", dataset.len());
            println!("Dropped rows: {}", dataset.dropped_rows());
            if let Some(ref s) = summary {
                println!(
                    "Quartiles:    Q1={:.2}  median={:.2}  Q3={:.2}  → {:?}",
                    s.q1,
                    s.median,
                    s.q3,
                    s.classification()
                );
            }
            println!();
            println!(
                "{:<20} {:<14} {:>6} {:>7} {:>7}  {:<12} {}",
                "Name", "Vorname", "Note", "Total", "Pages", "Datum", "Titel"
            );
            for r in dataset.iter() {
                println!(
                    "{:<20} {:<14} {:>6} {:>7} {:>7}  {:<12} {}",
                    r.identifier,
                    r.given_name,
                    r.grade,
                    r.total,
                    r.pages.to_string(),
                    r.date,
                    r.title
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Single-stamp mode ────────────────────────────────────────────────
    if let Some(ref identifier) = cli.stamp_only {
        let png_path = cli
            .png
            .as_ref()
            .context("--stamp-only needs --png <FILE>")?;
        let artifact = render_stamp(&config, identifier)
            .await
            .with_context(|| format!("Failed to render stamp for '{identifier}'"))?;
        tokio::fs::write(png_path, &artifact.png)
            .await
            .with_context(|| format!("Failed to write {}", png_path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} {}×{} stamp for {} → {}",
                green("✔"),
                artifact.width,
                artifact.height,
                identifier,
                bold(&png_path.display().to_string())
            );
        }
        return Ok(());
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let report = run(&config).await.context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, show_progress);
    }

    if cli.strict {
        report.into_result().context("Strict mode")?;
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .roster_path(&cli.roster)
        .source_path(&cli.source)
        .destination(&cli.dest)
        .placement(StampPlacement {
            x: cli.anchor_x,
            y: cli.anchor_y,
            max_width: cli.stamp_width,
        })
        .concurrency(cli.concurrency);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Human-readable report on stderr.
fn print_summary(report: &BatchReport, progress_shown: bool) {
    let stats = &report.stats;
    if !progress_shown {
        for outcome in &report.outcomes {
            match (&outcome.output_path, &outcome.error) {
                (Some(path), None) => eprintln!(
                    "  {} {:<20} {}",
                    green("✓"),
                    outcome.identifier,
                    dim(&path.display().to_string())
                ),
                (_, Some(err)) => eprintln!("  {} {:<20} {}", red("✗"), outcome.identifier, err),
                _ => {}
            }
        }
    }
    eprintln!(
        "{}  {}/{} records  {} source pages  {:?}  {}ms",
        if stats.skipped == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.succeeded,
        stats.total_records,
        stats.source_pages,
        report.classification,
        stats.total_duration_ms,
    );
    if stats.dropped_rows > 0 {
        eprintln!(
            "   {}",
            dim(&format!("{} incomplete roster rows ignored", stats.dropped_rows))
        );
    }
}
