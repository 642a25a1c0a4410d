#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use chorus_harness::gateway::openai::OpenAiAdapter;
use chorus_harness::gateway::{GatewayConfig, NoopUsageSink, ProviderGateway};
use chorus_harness::sink::TargetPhase;
use chorus_harness::{
    render_comparison_document, ChatPanelSession, EditorContext, PanelSink, PlainFormatter,
    SelectionStore,
};

#[derive(Parser)]
#[command(name = "chorus", version, about = "Side-by-side multi-model chat CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List backend models
    Models {
        /// Only models matching this identifier or pattern
        #[arg(long)]
        filter: Option<String>,
    },
    /// Ask all selected models one question, side by side
    Ask {
        question: String,
        /// Comma-separated model identifiers (saved as the new selection)
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,
        /// Persisted selection file
        #[arg(long, default_value = "chorus-selection.json")]
        selection_file: PathBuf,
    },
    /// Run the lite/pro rewrite comparison for a prompt
    Enhance {
        prompt: String,
        /// Model to run both rewrites against
        #[arg(long)]
        model: Option<String>,
        /// Source file to embed as context
        #[arg(long)]
        context_file: Option<PathBuf>,
        /// Language tag for the context file
        #[arg(long, default_value = "")]
        language: String,
    },
    /// Save a model selection to the selection file
    Select {
        /// Comma-separated model identifiers, in display order
        #[arg(value_delimiter = ',')]
        models: Vec<String>,
        #[arg(long, default_value = "chorus-selection.json")]
        selection_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Models { filter } => {
            let gateway = build_gateway()?;
            let models = gateway.list_models(filter.as_deref()).await?;
            for model in models {
                println!("{model}");
            }
        }
        Commands::Ask {
            question,
            models,
            selection_file,
        } => {
            let gateway = Arc::new(build_gateway()?);
            let sink = Arc::new(PanelSink::new(PlainFormatter));
            let selection = SelectionStore::new(selection_file);
            if !models.is_empty() {
                selection.save(&models)?;
            }

            let session = ChatPanelSession::new(gateway, sink.clone(), selection);

            let cancel = Arc::new(AtomicBool::new(false));
            spawn_ctrl_c(cancel.clone());

            let summary = session.run_chat_turn(&question, Some(cancel.as_ref())).await?;
            eprintln!("{}", summary.status);

            for state in sink.snapshot() {
                if !state.visible {
                    continue;
                }
                let marker = match state.phase {
                    TargetPhase::Failed => " [failed]",
                    _ => "",
                };
                println!("=== {}{} ===", state.name, marker);
                println!("{}\n", state.text);
            }
        }
        Commands::Enhance {
            prompt,
            model,
            context_file,
            language,
        } => {
            let gateway = Arc::new(build_gateway()?);
            let sink = Arc::new(PanelSink::new(PlainFormatter));
            let selection = SelectionStore::new("chorus-selection.json");

            let mut session = ChatPanelSession::new(gateway, sink, selection);
            if let Some(model) = model {
                session = session.with_enhance_model(model);
            }

            let editor_context = match context_file {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)?;
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Some(EditorContext {
                        text,
                        language,
                        file_name,
                    })
                }
                None => None,
            };

            let cancel = Arc::new(AtomicBool::new(false));
            spawn_ctrl_c(cancel.clone());

            let outcome = session
                .run_enhancement(&prompt, editor_context.as_ref(), Some(cancel.as_ref()))
                .await?;
            println!("{}", render_comparison_document(&outcome));
        }
        Commands::Select {
            models,
            selection_file,
        } => {
            let store = SelectionStore::new(&selection_file);
            store.save(&models)?;
            println!(
                "Saved {} model(s) to {}",
                models.len(),
                selection_file.display()
            );
        }
    }

    Ok(())
}

fn build_gateway() -> Result<ProviderGateway<NoopUsageSink>, Box<dyn std::error::Error>> {
    let adapter = OpenAiAdapter::from_env()?;
    Ok(ProviderGateway::with_config(
        adapter,
        Arc::new(NoopUsageSink),
        GatewayConfig::default(),
    ))
}

fn spawn_ctrl_c(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling...");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}
