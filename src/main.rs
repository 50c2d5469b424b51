use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use qarun::{
    logging, BackendClient, ClientCfg, LogEvent, OrchestratorParams, RunOrchestrator, RunOutcome,
    RunRequestBuilder, ScenarioSelection, TestCatalog,
};

#[derive(Parser)]
#[command(name = "qarun", version, about = "Launch generated browser tests and follow them live")]
struct Cli {
    /// YAML client config
    #[arg(long, global = true, env = "QARUN_CONFIG")]
    config: Option<PathBuf>,
    /// Overrides base_url from config/env
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate and run a single test
    Run {
        #[arg(long)]
        url: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
    },
    /// List generated scenarios, optionally running a selection of them as one batch
    Scenarios {
        #[arg(long)]
        url: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Run only these scenario ids (default: all)
        #[arg(long = "select")]
        select: Vec<String>,
        /// Leave these scenario ids out
        #[arg(long = "deselect")]
        deselect: Vec<String>,
        /// Print preconditions, steps and expected results too
        #[arg(long)]
        details: bool,
        #[arg(long)]
        run: bool,
    },
    /// Re-run a test's saved spec file
    Rerun {
        name: String,
        /// Open a visible browser on the backend host
        #[arg(long)]
        headed: bool,
    },
    /// Record a test interactively with Playwright codegen on the backend host
    Codegen {
        name: String,
        /// Page to open (default: the test's last application URL)
        #[arg(long)]
        url: Option<String>,
    },
    /// List known tests
    Tests,
    /// Show one test's metadata, code and last report
    Show { name: String },
    /// Replace a test's code with the contents of a file
    Save {
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut cfg = ClientCfg::load(cli.config.as_deref())?;
    if let Some(url) = cli.base_url {
        cfg.base_url = url;
    }
    let client = BackendClient::new(&cfg).context("Failed to build backend client")?;
    dispatch(cli.cmd, client, &cfg).await.map_err(|e| {
        match e.downcast_ref::<qarun::Error>() {
            Some(err) if err.is_transport() => e.context(format!("Request to backend at {} failed", cfg.base_url)),
            _ => e,
        }
    })
}

async fn dispatch(cmd: Cmd, client: BackendClient, cfg: &ClientCfg) -> Result<()> {
    let catalog = TestCatalog::new(client.clone());
    let orchestrator =
        RunOrchestrator::new(client.clone(), OrchestratorParams::from(&cfg.stream)).with_catalog(catalog.clone());

    match cmd {
        Cmd::Run { url, name, description } => {
            let request = RunRequestBuilder::new(url, name, description).build()?;
            let pb = spinner();
            let outcome = orchestrator
                .execute_with(request, |evt| print_event(&pb, evt))
                .await;
            pb.finish_and_clear();
            report(outcome?)
        }
        Cmd::Scenarios { url, name, description, select, deselect, details, run } => {
            let mut selection = ScenarioSelection::load(&client, &name, &url, &description).await?;
            if !select.is_empty() {
                selection.toggle_all(false);
                for id in &select {
                    if !selection.toggle_one(id, true) {
                        tracing::warn!(id = %id, "no scenario with this id");
                    }
                }
            }
            for id in &deselect {
                selection.toggle_one(id, false);
            }
            print_scenarios(&selection, details);
            if !run {
                return Ok(());
            }
            let pb = spinner();
            let outcome = selection
                .run_selected_with(&orchestrator, |evt| print_event(&pb, evt))
                .await;
            pb.finish_and_clear();
            report(outcome?)
        }
        Cmd::Rerun { name, headed } => {
            let pb = spinner();
            pb.set_message(format!("running {}", qarun::scenario::spec_path(&name)));
            let outcome = orchestrator.rerun(&name, headed).await;
            pb.finish_and_clear();
            let spec_run = outcome?;
            println!("Command: {}\nStatus: {} (code {:?})\n\n{}", spec_run.ran, spec_run.status, spec_run.returncode, spec_run.stdout);
            if !spec_run.stderr.is_empty() {
                println!("--- stderr ---\n{}", spec_run.stderr);
            }
            if !spec_run.passed() {
                bail!("{} failed", spec_run.spec);
            }
            Ok(())
        }
        Cmd::Codegen { name, url } => {
            let launch = client.start_codegen(&name, url.as_deref()).await?;
            if !launch.launched {
                bail!("backend did not launch codegen for {name}");
            }
            println!(
                "codegen recording {} on {}",
                launch.spec.as_deref().unwrap_or(&name),
                launch.url.as_deref().unwrap_or("a blank page")
            );
            Ok(())
        }
        Cmd::Tests => {
            let tests = catalog.refresh().await?;
            for t in tests.iter() {
                println!(
                    "{:<32} {:<8} {}",
                    t.name,
                    t.last_status.as_deref().unwrap_or("-"),
                    t.last_run_at.map(|d| d.to_rfc3339()).unwrap_or_else(|| "never".into()),
                );
            }
            Ok(())
        }
        Cmd::Show { name } => {
            let record = client.get_test(&name).await?;
            if let Some(meta) = &record.meta {
                println!("{}", serde_json::to_string_pretty(meta)?);
            }
            println!("--- code ---\n{}", record.code);
            if !record.report_text.is_empty() {
                println!("--- last report ---\n{}", record.report_text);
            }
            Ok(())
        }
        Cmd::Save { name, file } => {
            let code = tokio::fs::read_to_string(&file)
                .await
                .context(format!("Failed to read {}", file.display()))?;
            let saved = client.save_test_code(&name, &code).await?;
            println!("saved {} ({})", saved.name.unwrap_or(name), saved.path.unwrap_or_default());
            Ok(())
        }
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("waiting for events");
    pb
}

fn print_event(pb: &ProgressBar, evt: &LogEvent) {
    if let Some(line) = &evt.line {
        pb.println(line);
    }
    if let Some(status) = &evt.status {
        pb.set_message(format!("status: {status}"));
    }
}

fn print_scenarios(selection: &ScenarioSelection, details: bool) {
    for row in selection.rows() {
        let sc = &row.scenario;
        println!(
            "[{}] {:<8} {:<10} {:<8} {}",
            if row.selected { "x" } else { " " },
            sc.id,
            sc.kind.as_deref().unwrap_or("-"),
            sc.priority.as_deref().unwrap_or("-"),
            sc.title,
        );
        if details {
            for line in sc.to_description().lines() {
                println!("             {line}");
            }
        }
    }
    println!("{} of {} selected", selection.selected_count(), selection.rows().len());
}

fn report(outcome: RunOutcome) -> Result<()> {
    let (Some(rec), Some(result)) = (&outcome.reconciliation, outcome.result()) else {
        bail!(
            "run {} ended with an error: {}",
            outcome.run.id,
            outcome.run.error.as_deref().unwrap_or("unknown")
        );
    };
    if !rec.report.is_empty() {
        println!("--- report ---\n{}", rec.report);
    }
    for a in &rec.artifacts {
        println!("artifact: {a}");
    }
    if let Some(url) = &result.report_url {
        println!("report: {url}");
    }
    println!("{}", serde_json::to_string(result)?);
    Ok(())
}
