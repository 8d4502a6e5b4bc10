use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Result;
use clap::{Parser, Subcommand};

use aura_brain::client::{HttpLlmClient, LlmClient, LlmError};
use aura_core::{AuraConfig, HybridOrchestrator, Layer};
use aura_osgate::{NativeBoundary, OsBoundary};

/// Success.
const EXIT_OK: u8 = 0;
/// Misuse (also what clap returns on bad arguments).
const EXIT_MISUSE: u8 = 2;
/// An LLM-backed layer was needed but no credentials are configured.
const EXIT_NO_CREDENTIALS: u8 = 3;
/// Internal error.
const EXIT_INTERNAL: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "aura", version, about = "Local-first desktop assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Processes a single utterance and prints the response.
    Run {
        /// The utterance, quoted.
        utterance: Vec<String>,
        /// Print the full response as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Interactive read-eval loop.
    Repl,
    /// Prints the persisted session counters.
    Stats,
    /// Lists promoted capabilities.
    Capabilities,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("aura: failed to start runtime: {err}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };
    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("aura: {err:#}");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config = AuraConfig::from_env();
    match cli.command {
        Commands::Run { utterance, json } => {
            let utterance = utterance.join(" ");
            if utterance.trim().is_empty() {
                eprintln!("aura: empty utterance");
                return Ok(EXIT_MISUSE);
            }
            let orchestrator = bootstrap(config)?;
            let response = orchestrator.process(&utterance).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.text);
            }
            if response.ok {
                Ok(EXIT_OK)
            } else if needs_credentials(&orchestrator, response.source_layer) {
                Ok(EXIT_NO_CREDENTIALS)
            } else {
                Ok(EXIT_INTERNAL)
            }
        }
        Commands::Repl => {
            let orchestrator = bootstrap(config)?;
            repl(&orchestrator).await?;
            Ok(EXIT_OK)
        }
        Commands::Stats => {
            let orchestrator = bootstrap(config)?;
            println!("{}", serde_json::to_string_pretty(&orchestrator.stats())?);
            Ok(EXIT_OK)
        }
        Commands::Capabilities => {
            let orchestrator = bootstrap(config)?;
            let capabilities = orchestrator.capability_store().snapshot();
            if capabilities.is_empty() {
                println!("no promoted capabilities");
            } else {
                println!("{}", serde_json::to_string_pretty(&capabilities)?);
            }
            Ok(EXIT_OK)
        }
    }
}

fn bootstrap(config: AuraConfig) -> Result<HybridOrchestrator> {
    let boundary: Arc<dyn OsBoundary> = Arc::new(NativeBoundary::probe(
        config.files_root(),
        config.shots_dir(),
    ));
    let mut builder = HybridOrchestrator::builder(config, boundary);
    match HttpLlmClient::from_env() {
        Ok(client) => builder = builder.llm(Arc::new(client) as Arc<dyn LlmClient>),
        Err(LlmError::NoCredentials) => {}
        Err(err) => anyhow::bail!("llm client: {err}"),
    }
    builder.build()
}

fn needs_credentials(orchestrator: &HybridOrchestrator, layer: Layer) -> bool {
    !orchestrator.llm_available()
        && matches!(layer, Layer::CodeGen | Layer::Agentic | Layer::Conversation)
}

async fn repl(orchestrator: &HybridOrchestrator) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("aura ready; empty line exits.");
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let response = orchestrator.process(line).await;
        let marker = if response.ok { "" } else { "! " };
        println!("{marker}{}", response.text);
    }
    Ok(())
}
