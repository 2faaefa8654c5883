use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{ActorSpec, ConditionSpec, ExecutionEvent, FlowOutcome, FlowSpec};
use flowruntime::{load_flow, save_flow, ExecuteOptions, FlowRuntime, RuntimeConfig, StopHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Actor flow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to a .json, .yaml or .yml flow description
        #[arg(short, long)]
        file: PathBuf,

        /// Root variable overriding the flow's own, as name=value
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<(String, String)>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build, set up and wrap up a flow without executing it
    Validate {
        /// Path to the flow description
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List available actor and condition types
    Actors,

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.yaml")]
        output: PathBuf,
    },
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", raw)),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn runtime() -> FlowRuntime {
    FlowRuntime::with_registry(
        Arc::new(flowactors::standard_registry()),
        RuntimeConfig::default(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            variables,
            verbose,
        } => {
            init_logging(verbose);
            run_flow(file, variables).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_flow(file).await?;
        }

        Commands::Actors => {
            list_actors();
        }

        Commands::Init { output } => {
            create_example_flow(output).await?;
        }
    }

    Ok(())
}

async fn run_flow(file: PathBuf, variables: Vec<(String, String)>) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());
    let spec = load_flow(&file)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;

    println!("📋 Flow: {}", spec.name);
    println!("   Actors: {}", spec.actors.len());
    println!();

    let runtime = runtime();

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::FlowStarted { name, attempt, .. } => {
                    if attempt == 0 {
                        println!("▶️  Flow '{}' started", name);
                    } else {
                        println!("🔁 Flow '{}' restarted (attempt {})", name, attempt);
                    }
                }
                ExecutionEvent::ActorToken { actor, payload, .. } => {
                    println!("  ⚡ {} -> {}", actor, payload);
                }
                ExecutionEvent::ActorFailed { actor, error, .. } => {
                    println!("  ❌ {} failed: {}", actor, error);
                }
                ExecutionEvent::FlowFinished { outcome, .. } => match outcome {
                    FlowOutcome::Finished => println!("✨ Flow finished"),
                    FlowOutcome::Stopped => println!("⏹️  Flow stopped"),
                    FlowOutcome::Failed(error) => println!("💥 Flow failed: {}", error),
                },
            }
        }
    });

    let stop = StopHandle::new();
    let ctrl_c = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Stop requested");
                stop.stop();
            }
        })
    };

    let mut options = ExecuteOptions::new()
        .with_listener(Arc::new(runtime.event_bus().listener()))
        .with_stop_handle(stop);
    for (name, value) in variables {
        options = options.with_variable(name, value);
    }

    let result = runtime.execute_with(&spec, options).await;
    ctrl_c.abort();

    // Dropping the runtime closes the event channel once every event is printed
    drop(runtime);
    let _ = event_task.await;

    let report = result?;
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!("   Restarts: {}", report.restarts);

    if !report.outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for token in &report.outputs {
            println!("   {}: {}", token.provenance().unwrap_or("-"), token.payload());
        }
    }

    Ok(())
}

async fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let spec = load_flow(&file).await?;
    runtime().validate(&spec).await?;

    println!("✅ Flow is valid:");
    println!("   Name: {}", spec.name);
    println!("   Actors: {}", spec.actors.len());

    Ok(())
}

fn list_actors() {
    println!("📦 Available Actor Types:");
    println!();

    let registry = flowactors::standard_registry();
    for actor_type in registry.list_actor_types() {
        if let Some(metadata) = registry.get_metadata(&actor_type) {
            println!("  • {} ({})", actor_type, metadata.kind);
            if !metadata.description.is_empty() {
                println!("    {}", metadata.description);
            }
            for option in &metadata.options {
                let marker = if option.required { "*" } else { " " };
                println!("      {}{}: {}", marker, option.name, option.description);
            }
        } else {
            println!("  • {}", actor_type);
        }
    }

    println!();
    println!("🔀 Available Conditions:");
    println!();
    for condition_type in registry.list_condition_types() {
        let description = registry
            .condition_description(&condition_type)
            .unwrap_or_default();
        println!("  • {}: {}", condition_type, description);
    }
}

fn example_flow() -> FlowSpec {
    FlowSpec::new("example")
        .with_variable("limit", "3")
        .with_actor(
            ActorSpec::new("source.for_loop")
                .with_name("numbers")
                .with_option("lower", 1)
                .with_option("upper", 5),
        )
        .with_actor(
            ActorSpec::new("control.if_then_else")
                .with_name("classify")
                .with_condition(
                    ConditionSpec::new("numeric")
                        .with_option("operator", "gt")
                        .with_option("value", "@{limit}"),
                )
                .with_children([
                    ActorSpec::new("transformer.format")
                        .with_name("big")
                        .with_option("template", "{payload} is above @{limit}"),
                    ActorSpec::new("transformer.format")
                        .with_name("small")
                        .with_option("template", "{payload} is at most @{limit}"),
                ]),
        )
        .with_actor(
            ActorSpec::new("control.tee")
                .with_name("show")
                .with_child(ActorSpec::new("sink.log").with_option("prefix", "result")),
        )
}

async fn create_example_flow(output: PathBuf) -> Result<()> {
    save_flow(&example_flow(), &output).await?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {} --var limit=2", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_split_on_first_equals() {
        assert_eq!(
            parse_variable("url=http://x?a=b").unwrap(),
            ("url".to_string(), "http://x?a=b".to_string())
        );
        assert!(parse_variable("=value").is_err());
        assert!(parse_variable("novalue").is_err());
    }

    #[tokio::test]
    async fn example_flow_validates() {
        runtime().validate(&example_flow()).await.unwrap();
    }
}
