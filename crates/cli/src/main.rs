use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use hacksmith_engine::{FlowEngine, OUTPUT_STAGE, SessionOutcome, parse_blueprint_file};
use hacksmith_types::BlueprintDocument;
use hacksmith_util::{HacksmithSettings, KeychainSealer, SecretsBackend, expand_tilde};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{Level, debug};

mod terminal;

use terminal::TerminalIo;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => run_blueprint(sub).await,
        Some(("validate", sub)) => validate(sub),
        Some(("flows", sub)) => list_flows(sub),
        Some(("preview", sub)) => preview(sub),
        Some((other, _)) => bail!("unknown subcommand: {other}"),
        None => bail!("a subcommand is required"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn blueprint_arg() -> Arg {
    Arg::new("blueprint")
        .required(true)
        .action(ArgAction::Set)
        .help("Path to a blueprint (.toml, .json, or YAML)")
}

fn build_cli() -> Command {
    Command::new("hacksmith")
        .about("Guided third-party product onboarding from declarative blueprints")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run a blueprint flow interactively")
                .arg(blueprint_arg())
                .arg(Arg::new("flow").long("flow").short('f').action(ArgAction::Set).help("Flow id (defaults to the first flow)"))
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .short('o')
                        .action(ArgAction::Set)
                        .help("Directory for the generated artifacts"),
                )
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .short('y')
                        .action(ArgAction::SetTrue)
                        .help("Allow unencrypted credentials without asking"),
                ),
        )
        .subcommand(Command::new("validate").about("Check a blueprint without running it").arg(blueprint_arg()))
        .subcommand(Command::new("flows").about("List the flows a blueprint declares").arg(blueprint_arg()))
        .subcommand(Command::new("preview").about("Show the blueprint's landing summary").arg(blueprint_arg()))
}

fn load(matches: &ArgMatches) -> Result<BlueprintDocument> {
    let path = matches.get_one::<String>("blueprint").context("missing blueprint path")?;
    parse_blueprint_file(expand_tilde(path)).with_context(|| format!("failed to load blueprint {path}"))
}

async fn run_blueprint(matches: &ArgMatches) -> Result<()> {
    let document = load(matches)?;
    let settings = HacksmithSettings::load().context("failed to load settings")?;
    let provider = document.provider.clone();

    let (event_tx, mut event_rx) = unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "session event");
        }
    });

    let io = Arc::new(TerminalIo::new(matches.get_flag("yes")));
    let mut engine = FlowEngine::new(document, io)?.with_settings(&settings).with_events(event_tx);
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        engine = engine.with_output_dir(expand_tilde(dir));
    }
    if matches!(settings.secrets_backend, SecretsBackend::Keychain) {
        engine = engine.with_sealer(Arc::new(KeychainSealer::new(provider)));
    }

    print_preview(engine.document());
    let mut session = engine.start(matches.get_one::<String>("flow").map(String::as_str))?;
    match engine.run(&mut session).await? {
        SessionOutcome::Completed(report) => {
            println!();
            println!("Onboarding complete. Artifacts:");
            for artifact in &report.artifacts {
                println!("  {:<14} {}", artifact.kind.to_string(), artifact.path.display());
            }
            if report.credentials_withheld {
                println!("Credentials were not written; re-run with --yes or enable encrypt_credentials.");
            }
        }
        SessionOutcome::Aborted { step_id } if step_id == OUTPUT_STAGE => {
            println!();
            println!("Stopped before writing artifacts. Nothing was written.");
        }
        SessionOutcome::Aborted { step_id } => {
            println!();
            println!("Stopped at step '{step_id}'. No artifacts were written.");
        }
    }
    Ok(())
}

fn validate(matches: &ArgMatches) -> Result<()> {
    let document = load(matches)?;
    let steps: usize = document.flows.iter().map(|flow| flow.steps.len()).sum();
    println!(
        "{} ({}): {} variable(s), {} flow(s), {} step(s)",
        document.name,
        document.provider,
        document.variables.len(),
        document.flows.len(),
        steps
    );
    Ok(())
}

fn list_flows(matches: &ArgMatches) -> Result<()> {
    let document = load(matches)?;
    for flow in &document.flows {
        let title = flow.title.as_deref().unwrap_or("");
        println!("{:<20} {:>3} step(s)  {title}", flow.id, flow.steps.len());
    }
    Ok(())
}

fn preview(matches: &ArgMatches) -> Result<()> {
    let document = load(matches)?;
    if !print_preview(&document) {
        println!("{} has no preview.", document.name);
    }
    Ok(())
}

fn print_preview(document: &BlueprintDocument) -> bool {
    let Some(preview) = document.preview.as_ref().filter(|preview| preview.enabled) else {
        return false;
    };
    println!("{}", preview.title.as_deref().unwrap_or(&document.name));
    if let Some(description) = &document.description {
        println!("{description}");
    }
    if let Some(estimate) = &preview.estimated_time {
        println!("Estimated time: {estimate}");
    }
    for (index, step) in preview.steps.iter().enumerate() {
        println!("  {}. {step}", index + 1);
    }
    true
}
