//! CLI entry point for `mbox2eml`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mbox2eml::config::Config;
use mbox2eml::export::verify::{verify, VerifyReport};
use mbox2eml::i18n;
use mbox2eml::model::report::{ConversionReport, Outcome};
use mbox2eml::{batch_existing, convert, ConvertError, ProgressEvent};

#[derive(Parser)]
#[command(name = "mbox2eml", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Language (en, es). Defaults to system locale.
    #[arg(long, value_name = "LANG", global = true)]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an MBOX archive into .eml files
    Convert {
        /// MBOX archive to convert
        path: PathBuf,
        /// Output directory (default from config, then `eml_output`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also lay the files out in import batches
        #[arg(long)]
        batch: bool,
        #[command(flatten)]
        limits: BatchArgs,
        /// Short `00001_subject.eml` names instead of `0001_subject_sender.eml`
        #[arg(long)]
        simple_names: bool,
        /// Write CRLF line endings
        #[arg(long)]
        crlf: bool,
        /// Copy 8-bit bodies byte for byte instead of repairing invalid UTF-8
        #[arg(long)]
        preserve_bytes: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Group existing .eml files into import batches
    Batch {
        /// Directory holding the .eml files
        eml_dir: PathBuf,
        /// Where to create the batch directories
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        limits: BatchArgs,
        #[arg(long)]
        json: bool,
        #[arg(short, long)]
        quiet: bool,
    },
    /// Check batch directories against their manifest
    Verify {
        /// Directory containing manifest.json
        dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Batch limit overrides shared by `convert` and `batch`.
#[derive(clap::Args)]
struct BatchArgs {
    /// Maximum messages per batch
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,
    /// Maximum batch size in MB
    #[arg(long, value_name = "MB")]
    batch_mb: Option<u64>,
    /// Keep archive order instead of packing smallest files first
    #[arg(long)]
    no_sort: bool,
}

impl BatchArgs {
    fn any(&self) -> bool {
        self.batch_size.is_some() || self.batch_mb.is_some() || self.no_sort
    }

    fn apply(&self, config: &mut Config) {
        if let Some(n) = self.batch_size {
            config.batch.max_messages = n;
        }
        if let Some(mb) = self.batch_mb {
            config.batch.max_megabytes = mb;
        }
        if self.no_sort {
            config.batch.sort_by_size = false;
        }
    }
}

/// Detect language early from --lang arg or system env, before clap processes --help.
fn detect_lang_early() -> i18n::Lang {
    let args: Vec<String> = std::env::args().collect();
    for (i, arg) in args.iter().enumerate() {
        if arg == "--lang" {
            if let Some(lang) = args.get(i + 1).and_then(|c| i18n::Lang::from_code(c)) {
                return lang;
            }
        }
        if let Some(lang) = arg.strip_prefix("--lang=").and_then(i18n::Lang::from_code) {
            return lang;
        }
    }
    i18n::detect_system_lang()
}

/// Build a localized clap Command using i18n strings.
fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command()
        .about(i18n::app_about())
        .long_about(i18n::app_long_about())
        .after_help(i18n::app_after_help())
        .mut_arg("verbose", |a| a.help(i18n::help_verbose()))
        .mut_arg("lang", |a| a.help(i18n::help_lang()));

    let localized = [
        ("convert", i18n::help_cmd_convert()),
        ("batch", i18n::help_cmd_batch()),
        ("verify", i18n::help_cmd_verify()),
        ("completions", i18n::help_cmd_completions()),
        ("manpage", i18n::help_cmd_manpage()),
    ];
    for (name, about) in localized {
        cmd = cmd.mut_subcommand(name, |s| s.about(about));
    }
    cmd
}

fn main() -> ExitCode {
    // Detect language BEFORE clap parsing so --help is localized
    i18n::set_lang(detect_lang_early());

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}: {e:#}", i18n::err_prefix());
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<u8> {
    let matches = build_localized_command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let config = mbox2eml::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Convert {
            path,
            output,
            batch,
            limits,
            simple_names,
            crlf,
            preserve_bytes,
            json,
            quiet,
        } => {
            let mut config = config;
            if batch || limits.any() {
                config.batch.enabled = true;
            }
            limits.apply(&mut config);
            if simple_names {
                config.naming.mode = mbox2eml::export::naming::NamingMode::Simple;
            }
            if crlf {
                config.output.line_ending = mbox2eml::export::eml::LineEnding::Crlf;
            }
            if preserve_bytes {
                config.output.text_policy = mbox2eml::export::eml::TextPolicy::Preserve;
            }
            let output = output.unwrap_or_else(|| config.output.default_dir.clone());
            cmd_convert(&path, &output, &config, json, quiet || json)
        }
        Commands::Batch {
            eml_dir,
            output,
            limits,
            json,
            quiet,
        } => {
            let mut config = config;
            limits.apply(&mut config);
            cmd_batch(&eml_dir, &output, &config, json, quiet || json)
        }
        Commands::Verify { dir, json } => cmd_verify(&dir, json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mbox2eml::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mbox2eml.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<u8> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mbox2eml", &mut std::io::stdout());
    Ok(0)
}

fn cmd_manpage() -> anyhow::Result<u8> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(0)
}

fn progress_bar(hidden: bool, label: &str) -> anyhow::Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} {{msg}}"
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Observer that drives a progress bar from driver events.
fn track<'p>(pb: &'p ProgressBar) -> impl FnMut(&ProgressEvent<'_>) + 'p {
    move |event| match event {
        ProgressEvent::Started { total_bytes } => {
            pb.set_length(total_bytes.unwrap_or(0));
        }
        ProgressEvent::MessageWritten {
            counts, position, ..
        }
        | ProgressEvent::MessageFailed {
            counts, position, ..
        } => {
            pb.set_position(*position);
            pb.set_message(format!("{} {}", counts.total, i18n::msg_messages()));
        }
        ProgressEvent::BatchWritten { directory, .. } => {
            pb.set_message(
                directory
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        }
        ProgressEvent::DecodeFallback { .. } => {}
        ProgressEvent::Finished { .. } => pb.finish_and_clear(),
    }
}

fn cmd_convert(
    path: &Path,
    output: &Path,
    config: &Config,
    json: bool,
    quiet: bool,
) -> anyhow::Result<u8> {
    let options = config.convert_options()?;
    let pb = progress_bar(quiet, i18n::msg_converting())?;
    let start = Instant::now();

    let result = convert(path, output, &options, &mut track(&pb));
    pb.finish_and_clear();
    let report = match result {
        Ok(report) => report,
        Err(ConvertError::ArchiveNotFound(p)) => {
            anyhow::bail!("{}: {}", i18n::err_file_not_found(), p.display())
        }
        Err(e) => return Err(e.into()),
    };

    print_report(&report, start.elapsed(), json)?;
    Ok(exit_code(&report))
}

fn cmd_batch(
    eml_dir: &Path,
    output: &Path,
    config: &Config,
    json: bool,
    quiet: bool,
) -> anyhow::Result<u8> {
    let options = config.batch.batch_options()?;
    let pb = progress_bar(quiet, i18n::msg_batching())?;
    let start = Instant::now();

    let result = batch_existing(eml_dir, output, &options, &mut track(&pb));
    pb.finish_and_clear();
    let report = result?;

    print_report(&report, start.elapsed(), json)?;
    Ok(exit_code(&report))
}

fn cmd_verify(dir: &Path, json: bool) -> anyhow::Result<u8> {
    let report = verify(dir)?;
    if json {
        let mut value = serde_json::to_value(&report)?;
        value["ok"] = serde_json::json!(report.is_ok());
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_verify_table(&report);
    }
    Ok(if report.is_ok() { 0 } else { 1 })
}

fn exit_code(report: &ConversionReport) -> u8 {
    // Outcome codes are 0..=2
    u8::try_from(report.exit_code()).unwrap_or(2)
}

fn print_report(
    report: &ConversionReport,
    elapsed: std::time::Duration,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let mut value = serde_json::to_value(report)?;
        value["outcome"] = serde_json::to_value(report.outcome())?;
        value["exit_code"] = serde_json::json!(report.exit_code());
        value["elapsed_ms"] = serde_json::json!(elapsed.as_millis() as u64);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let written: u64 = report.files.iter().map(|f| f.size).sum();

    println!();
    println!("  {:<22} {}", i18n::msg_archive(), report.archive.display());
    println!("  {:<22} {}", i18n::msg_output_dir(), report.output_dir.display());
    println!("  {:<22} {}", i18n::msg_total_messages(), report.counts.total);
    println!("  {:<22} {}", i18n::msg_succeeded(), report.counts.succeeded);
    println!("  {:<22} {}", i18n::msg_failed(), report.counts.failed);
    println!("  {:<22} {}", i18n::msg_output_size(), format_size(written, BINARY));
    if report.decode_fallbacks > 0 {
        println!(
            "  {:<22} {}",
            i18n::msg_decode_fallbacks(),
            report.decode_fallbacks
        );
    }
    if !report.batches.is_empty() {
        println!("  {:<22} {}", i18n::msg_batches(), report.batches.len());
        for batch in &report.batches {
            let name = batch
                .directory
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!(
                "    {name:<28} {:>5} {}  {:>10}",
                batch.len(),
                i18n::msg_messages(),
                format_size(batch.total_size, BINARY)
            );
        }
    }
    if let Some(manifest) = &report.manifest {
        println!("  {:<22} {}", i18n::msg_manifest(), manifest.display());
    }
    println!("  {:<22} {:.2?}", i18n::msg_elapsed(), elapsed);
    println!();

    let summary = match report.outcome() {
        Outcome::Complete => i18n::outcome_complete(),
        Outcome::Partial => i18n::outcome_partial(),
        Outcome::Failed => i18n::outcome_failed(),
        Outcome::Empty => i18n::outcome_empty(),
    };
    println!("  {summary}");
    println!();
    Ok(())
}

fn print_verify_table(report: &VerifyReport) {
    println!();
    for batch in &report.batches {
        let mark = if batch.found == batch.expected { "ok" } else { "!!" };
        println!(
            "  {mark} {:<28} {:>5} / {:<5}",
            batch.directory, batch.found, batch.expected
        );
    }
    println!();
    println!("  {:<22} {}", i18n::msg_expected(), report.expected);
    println!("  {:<22} {}", i18n::msg_found(), report.found);
    if !report.unparseable.is_empty() {
        println!("  {:<22} {}", i18n::msg_unparseable(), report.unparseable.len());
        for path in &report.unparseable {
            println!("    {}", path.display());
        }
    }
    if !report.missing_batches.is_empty() {
        println!(
            "  {:<22} {}",
            i18n::msg_missing_batches(),
            report.missing_batches.join(", ")
        );
    }
    println!();
    if report.is_ok() {
        println!("  {}", i18n::verify_ok());
    } else {
        println!("  {}", i18n::verify_mismatch());
    }
    println!();
}
