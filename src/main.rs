use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use contact_scout::features::results::{filter_pending, load_completed, CsvSink, JsonlSink, ResultSink};
use contact_scout::features::session_store::StorageStateGate;
use contact_scout::scraping::browser_manager::BrowserSession;
use contact_scout::scraping::OwaPage;
use contact_scout::tools::{dedup_identifiers, BatchControl, BatchOrchestrator};
use contact_scout::{config, setup, BatchEvent, ScoutError};

const USAGE: &str = "usage: contact-scout [--input FILE] [--output FILE.jsonl] [--csv FILE] \
[--config FILE] [--headless] [--resume] [--check] [ADDRESS ...]";

#[derive(Debug, Default)]
struct CliArgs {
    input: Option<PathBuf>,
    addresses: Vec<String>,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
    config: Option<PathBuf>,
    headless: bool,
    resume: bool,
    check: bool,
}

/// Accepts both `--flag value` and `--flag=value`.
fn parse_args<I>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(a) = args.next() {
        let (flag, inline) = match a.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (a.clone(), None),
        };
        let mut value = |name: &str| -> anyhow::Result<PathBuf> {
            inline
                .clone()
                .or_else(|| args.next())
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("{} expects a value", name))
        };
        match flag.as_str() {
            "--input" => parsed.input = Some(value("--input")?),
            "--output" => parsed.output = Some(value("--output")?),
            "--csv" => parsed.csv = Some(value("--csv")?),
            "--config" => parsed.config = Some(value("--config")?),
            "--headless" => parsed.headless = true,
            "--resume" => parsed.resume = true,
            "--check" => parsed.check = true,
            "-h" | "--help" => anyhow::bail!("{}", USAGE),
            other if other.starts_with("--") => anyhow::bail!("unknown flag {}\n{}", other, USAGE),
            _ => parsed.addresses.push(a),
        }
    }
    Ok(parsed)
}

/// One address per line; blank lines and `#` comments are skipped.
fn read_address_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading address list {}", path.display()))?;
    Ok(parse_address_lines(&contents))
}

fn parse_address_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Prints records to stdout when no `--output` is given.
struct StdoutSink;

impl ResultSink for StdoutSink {
    fn write(&mut self, record: &contact_scout::ContactRecord) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string(record)?);
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn open_sinks(args: &CliArgs) -> anyhow::Result<Vec<Box<dyn ResultSink>>> {
    let mut sinks: Vec<Box<dyn ResultSink>> = Vec::new();
    match &args.output {
        Some(path) => sinks.push(Box::new(JsonlSink::append(path)?)),
        None => sinks.push(Box::new(StdoutSink)),
    }
    if let Some(path) = &args.csv {
        sinks.push(Box::new(CsvSink::append(path)?));
    }
    Ok(sinks)
}

fn log_event(event: &BatchEvent) {
    match event {
        BatchEvent::ItemCompleted { record } => {
            debug!("event: {} -> {}", record.identifier(), record.status)
        }
        BatchEvent::Progress {
            processed,
            total,
            counts,
        } => info!(
            "📊 progress: {}/{} (success={}, not_found={}, error={})",
            processed, total, counts.success, counts.not_found, counts.error
        ),
        BatchEvent::StateChanged { state } => info!("batch state: {:?}", state),
        BatchEvent::Finished { summary } => match serde_json::to_string(summary) {
            Ok(json) => info!("summary: {}", json),
            Err(e) => warn!("summary: could not serialize: {}", e),
        },
    }
}

/// `pause` / `resume` / `stop` on stdin steer the run. Runs on its own
/// thread so a blocked read never holds up shutdown.
fn read_control_lines(control: Arc<BatchControl>) {
    use std::io::BufRead;
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("control: stdin closed: {}", e);
                break;
            }
        };
        match line.trim().to_ascii_lowercase().as_str() {
            "pause" | "p" => control.pause(),
            "resume" | "r" => control.resume(),
            "stop" | "q" => control.stop(),
            "" => {}
            other => warn!("control: unknown command '{}' (pause | resume | stop)", other),
        }
    }
}

fn exit_run_level(e: &ScoutError) -> ! {
    error!("❌ {}", e);
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let mut scout_config = config::load_scout_config(args.config.as_deref());
    if args.headless {
        scout_config.browser.headless = true;
    }

    // Pre-flight only
    if args.check {
        let report = setup::check_all(&scout_config, args.output.as_deref());
        println!("{}", report);
        report.log_action_required();
        if report.has_failures() {
            std::process::exit(2);
        }
        return Ok(());
    }

    let mut addresses = Vec::new();
    if let Some(path) = &args.input {
        addresses.extend(read_address_file(path)?);
    }
    addresses.extend(args.addresses.iter().cloned());
    let mut addresses = dedup_identifiers(addresses);

    if args.resume {
        match &args.output {
            Some(path) => {
                let completed = load_completed(path)?;
                let before = addresses.len();
                addresses = filter_pending(addresses, &completed);
                info!(
                    "resume: skipping {} already recorded, {} pending",
                    before - addresses.len(),
                    addresses.len()
                );
                if addresses.is_empty() && before > 0 {
                    info!("resume: nothing left to do");
                    return Ok(());
                }
            }
            None => warn!("--resume has no effect without --output"),
        }
    }
    if addresses.is_empty() {
        exit_run_level(&ScoutError::Configuration(format!(
            "no addresses given\n{}",
            USAGE
        )));
    }

    let issues = scout_config.validate();
    if !issues.is_empty() {
        exit_run_level(&ScoutError::Configuration(issues.join("; ")));
    }

    // Session gate before paying for a browser launch
    let Some(session_file) = scout_config.resolve_session_file() else {
        exit_run_level(&ScoutError::Session(
            "no session file configured".to_string(),
        ));
    };
    let gate = StorageStateGate::new(&session_file);
    if let Err(e) = gate.check() {
        exit_run_level(&e);
    }

    let mut sinks = open_sinks(&args)?;

    info!("Starting contact-scout with {} addresses", addresses.len());
    let session = BrowserSession::open(&scout_config, Some(session_file.as_path())).await?;
    if let Some(url) = session.current_url().await {
        if url.contains("login.") {
            warn!("browser: landed on {}; the stored session was not accepted", url);
        } else {
            info!("browser: ready at {}", url);
        }
    }
    let page = OwaPage::new(
        session.page.clone(),
        scout_config.selectors.clone(),
        scout_config.wait_times.clone(),
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (orchestrator, control) = match BatchOrchestrator::new(page, &scout_config, Arc::new(gate)) {
        Ok(pair) => pair,
        Err(e) => {
            session.shutdown().await;
            exit_run_level(&e);
        }
    };
    let orchestrator = orchestrator.with_events(events_tx);
    let control = Arc::new(control);

    let event_logger = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            log_event(&event);
        }
    });
    let stdin_control = control.clone();
    std::thread::spawn(move || read_control_lines(stdin_control));
    let ctrl_c_control = control.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 interrupt received, stopping after the current item");
            ctrl_c_control.stop();
        }
    });

    let mut records = match orchestrator.run(addresses).await {
        Ok(stream) => stream,
        Err(e) => {
            session.shutdown().await;
            exit_run_level(&e);
        }
    };

    while let Some(record) = records.next().await {
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.write(&record) {
                warn!("results: failed to write {}: {}", record.identifier(), e);
            }
        }
    }
    drop(records);

    for sink in sinks.iter_mut() {
        if let Err(e) = sink.finish() {
            warn!("results: failed to flush: {}", e);
        }
    }

    ctrl_c.abort();
    let _ = event_logger.await;
    session.shutdown().await;
    info!("contact-scout finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_both_flag_forms_and_positionals() {
        let args = parse_args(argv(&[
            "--input",
            "list.txt",
            "--output=out.jsonl",
            "--headless",
            "a@x.com",
            "--resume",
            "b@x.com",
        ]))
        .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("list.txt")));
        assert_eq!(args.output, Some(PathBuf::from("out.jsonl")));
        assert!(args.headless);
        assert!(args.resume);
        assert!(!args.check);
        assert_eq!(args.addresses, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn rejects_unknown_flags_and_missing_values() {
        assert!(parse_args(argv(&["--bogus"])).is_err());
        assert!(parse_args(argv(&["--csv"])).is_err());
    }

    #[test]
    fn address_lines_skip_comments_and_blanks() {
        let parsed = parse_address_lines("# team\n a@x.com \n\nb@x.com\n#c@x.com\n");
        assert_eq!(parsed, vec!["a@x.com", "b@x.com"]);
    }
}
