use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
    Value,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdinMode {
    None,
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Auto,
    Json,
    Text,
}

#[derive(Debug, Clone)]
struct CommandConfig {
    program: String,
    args: Vec<String>,
    stdin_mode: StdinMode,
    output_mode: OutputMode,
    timeout_ms: Option<u64>,
}

impl CommandConfig {
    fn from_options(options: &Options) -> Result<Self, SetupError> {
        let stdin_mode = match options.str_or("stdin_mode", "text") {
            "none" => StdinMode::None,
            "text" => StdinMode::Text,
            "json" => StdinMode::Json,
            other => {
                return Err(SetupError::invalid_option(
                    "stdin_mode",
                    format!("expected none, text or json, got '{}'", other),
                ))
            }
        };

        let output_mode = match options.str_or("output_mode", "auto") {
            "auto" => OutputMode::Auto,
            "json" => OutputMode::Json,
            "text" => OutputMode::Text,
            other => {
                return Err(SetupError::invalid_option(
                    "output_mode",
                    format!("expected auto, json or text, got '{}'", other),
                ))
            }
        };

        let timeout_ms = match options.get("timeout_ms") {
            None => None,
            Some(_) => Some(options.u64_or("timeout_ms", 0)?),
        };

        Ok(Self {
            program: options.require_str("program")?.to_string(),
            args: options.string_list("args")?,
            stdin_mode,
            output_mode,
            timeout_ms,
        })
    }

    fn stdin_data(&self, payload: &Value) -> Result<Vec<u8>, ExecutionError> {
        match self.stdin_mode {
            StdinMode::None => Ok(Vec::new()),
            StdinMode::Text => Ok(payload.to_string().into_bytes()),
            StdinMode::Json => serde_json::to_vec(payload)
                .map_err(|e| ExecutionError::Failed(format!("Failed to encode stdin: {}", e))),
        }
    }

    fn output(&self, stdout: String) -> Result<Value, ExecutionError> {
        match self.output_mode {
            OutputMode::Auto => Ok(serde_json::from_str::<serde_json::Value>(&stdout)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(stdout.trim_end().to_string()))),
            OutputMode::Json => serde_json::from_str::<serde_json::Value>(&stdout)
                .map(Value::from)
                .map_err(|e| {
                    ExecutionError::Failed(format!("Failed to parse JSON output: {}", e))
                }),
            OutputMode::Text => Ok(Value::String(stdout.trim_end().to_string())),
        }
    }
}

/// Runs an external program once per token.
///
/// The payload goes to stdin, stdout becomes the output payload. A non-zero
/// exit status fails the actor; `timeout_ms` kills the child and fails with
/// [`ExecutionError::Timeout`].
pub struct CommandActor;

#[async_trait]
impl Actor for CommandActor {
    fn actor_type(&self) -> &str {
        "transformer.command"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::invalid_input("token", "nothing"))?;
        // Options are expanded per call, so the program line may use variables
        let config = CommandConfig::from_options(ctx.options())?;
        let input_data = config.stdin_data(token.payload())?;

        debug!("{}: running {} {:?}", ctx.name(), config.program, config.args);
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::Failed(format!("Failed to spawn {}: {}", config.program, e))
            })?;

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let stdin_future = async move {
            if let Some(mut stdin) = stdin {
                if !input_data.is_empty() {
                    stdin.write_all(&input_data).await?;
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let stdout_future = async move {
            let mut data = Vec::new();
            if let Some(ref mut stdout) = stdout {
                stdout.read_to_end(&mut data).await?;
            }
            Ok::<_, std::io::Error>(data)
        };
        let stderr_future = async move {
            let mut data = Vec::new();
            if let Some(ref mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut data).await;
            }
            data
        };

        let run = async {
            let (written, stdout, stderr) = tokio::join!(stdin_future, stdout_future, stderr_future);
            // A child that exits without reading stdin closes the pipe early
            if let Err(e) = written {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(ExecutionError::from(e));
                }
            }
            let status = child.wait().await?;
            Ok::<_, ExecutionError>((status, stdout?, stderr))
        };

        let timeout = config.timeout_ms.map(Duration::from_millis);
        let (status, stdout, stderr) = tokio::select! {
            _ = ctx.cancellation().cancelled() => return Err(ExecutionError::Cancelled),
            result = async {
                match timeout {
                    Some(duration) => tokio::time::timeout(duration, run).await.map_err(|_| {
                        ExecutionError::Timeout {
                            millis: duration.as_millis() as u64,
                        }
                    })?,
                    None => run.await,
                }
            } => result?,
        };

        let stderr = String::from_utf8_lossy(&stderr);
        for line in stderr.lines().take(10) {
            warn!("{}: stderr: {}", ctx.name(), line);
        }

        if !status.success() {
            return Err(ExecutionError::Failed(format!(
                "{} exited with code {}: {}",
                config.program,
                status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&stdout).to_string();
        Ok(Token::new(config.output(stdout)?).into())
    }
}

pub struct CommandFactory;

impl ActorFactory for CommandFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        CommandConfig::from_options(options)?;
        Ok(Box::new(CommandActor))
    }

    fn actor_type(&self) -> &str {
        "transformer.command"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Runs an external program on each token".to_string(),
            kind: ActorKind::Transformer,
            options: vec![
                OptionDefinition::required("program", "Executable to run"),
                OptionDefinition::optional("args", "Command line arguments"),
                OptionDefinition::optional("stdin_mode", "none, text (default) or json"),
                OptionDefinition::optional("output_mode", "auto (default), json or text"),
                OptionDefinition::optional("timeout_ms", "Kill the program after this long"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(output_mode: &str) -> CommandConfig {
        let options = Options::new()
            .with("program", "cat")
            .with("output_mode", output_mode);
        CommandConfig::from_options(&options).unwrap()
    }

    #[test]
    fn auto_output_prefers_json() {
        let config = config("auto");
        assert_eq!(
            config.output("[1, 2]\n".to_string()).unwrap(),
            Value::from(vec![1, 2])
        );
        assert_eq!(
            config.output("hello\n".to_string()).unwrap(),
            Value::from("hello")
        );
    }

    #[test]
    fn json_output_must_parse() {
        assert!(config("json").output("not json".to_string()).is_err());
    }

    #[test]
    fn unknown_modes_are_rejected() {
        let options = Options::new()
            .with("program", "cat")
            .with("stdin_mode", "binary");
        assert!(matches!(
            CommandConfig::from_options(&options),
            Err(SetupError::InvalidOption { .. })
        ));
    }
}
