//! autoprompt entry point.

mod args;
mod builtin;
mod config;
mod engine;
mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use autoprompt_core::pattern::{PatternMatcher, PatternSpec};
use autoprompt_core::response::{EngineContext, Response};
use clap::Parser;
use tracing::{error, info};

use crate::args::{CheckArgs, Cli, Commands, PatternsArgs, RunArgs};
use crate::config::PatternFile;
use crate::engine::policy::{AllowListPolicy, MatchPolicy};
use crate::engine::records::RecordStore;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Patterns(args) => list_patterns(args).map(|()| 0),
        Commands::Check(args) => check(args).map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr (warnings only, so the child's screen stays readable)
/// or to `log_file` at info level. `RUST_LOG` overrides either default.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if log_file.is_some() {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Explicit pattern file, or the default one if it exists.
fn load_pattern_file(explicit: Option<&Path>) -> anyhow::Result<PatternFile> {
    if let Some(path) = explicit {
        return PatternFile::load(path);
    }
    match paths::get_default_patterns_path() {
        Some(path) if path.exists() => {
            info!("Using pattern file {}", path.display());
            PatternFile::load(&path)
        }
        _ => Ok(PatternFile::default()),
    }
}

fn build_matcher(
    file: &PatternFile,
    context: EngineContext,
    no_builtin: bool,
) -> anyhow::Result<PatternMatcher> {
    let mut matcher = PatternMatcher::with_context(context);
    if !no_builtin {
        builtin::register_builtins(&mut matcher)
            .map_err(|e| anyhow::anyhow!("{} ({})", e, e.suggestion()))?;
    }
    file.register(&mut matcher)?;
    Ok(matcher)
}

fn run(args: RunArgs) -> anyhow::Result<i32> {
    let file = load_pattern_file(args.patterns.as_deref())?;

    let mut config = file.engine.clone();
    if let Some(ms) = args.settle_ms {
        config.settle_ms = ms;
    }
    if let Some(indicator) = args.indicator {
        config.indicator = indicator;
    }

    let context = args.vars.into_iter().fold(
        EngineContext::new().with_var("command", args.command.join(" ")),
        |ctx, (key, value)| ctx.with_var(key, value),
    );
    let matcher = build_matcher(&file, context, args.no_builtin)?;
    if matcher.is_empty() {
        anyhow::bail!("No patterns registered (built-ins disabled and no pattern file)");
    }

    let policy: Box<dyn MatchPolicy + Send> = if args.accept_all {
        Box::new(AllowListPolicy::accept_all())
    } else {
        Box::new(AllowListPolicy::new(
            file.accept.iter().cloned().chain(args.accept),
        ))
    };
    let records = RecordStore::new(paths::get_record_path());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let result = runtime.block_on(engine::session::run(
        &args.command,
        matcher,
        policy,
        &config,
        Some(records),
    ));
    // stdin reads park a blocking thread that never returns on its own.
    runtime.shutdown_timeout(Duration::from_millis(100));

    let code = result?;
    Ok(i32::try_from(code).unwrap_or(1))
}

fn describe_response(spec: &PatternSpec) -> serde_json::Value {
    match &spec.response {
        None => serde_json::Value::Null,
        Some(Response::Literal(s)) => serde_json::json!(s),
        Some(Response::Sequence(steps)) => serde_json::json!(steps),
        Some(Response::Computed(_)) => serde_json::json!("<computed>"),
    }
}

fn list_patterns(args: PatternsArgs) -> anyhow::Result<()> {
    let file = load_pattern_file(args.patterns.as_deref())?;
    let matcher = build_matcher(&file, EngineContext::new(), args.no_builtin)?;

    if args.json {
        let patterns: Vec<serde_json::Value> = matcher
            .patterns()
            .map(|spec| {
                serde_json::json!({
                    "id": spec.id,
                    "title": spec.title,
                    "lines": spec.lines,
                    "trigger_text": spec.trigger_text,
                    "kind": spec.kind,
                    "case_sensitive": spec.case_sensitive,
                    "response": describe_response(spec),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&patterns)?);
        return Ok(());
    }

    for spec in matcher.patterns() {
        let kind = spec.kind.map_or_else(|| "-".to_string(), |k| k.to_string());
        println!("{:<16} {:<10} {}", spec.id, kind, spec.title);
        for line in &spec.lines {
            println!("    {}", line);
        }
    }
    Ok(())
}

fn check(args: CheckArgs) -> anyhow::Result<()> {
    let path: PathBuf = args.patterns;
    let file = PatternFile::load(&path)?;
    let mut matcher = PatternMatcher::new();
    file.register(&mut matcher)?;
    println!(
        "{}: {} pattern(s) OK, {} accepted",
        path.display(),
        matcher.len(),
        file.accept.len()
    );
    Ok(())
}
