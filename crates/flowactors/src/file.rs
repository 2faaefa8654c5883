use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Writes one line per token payload to `output`.
///
/// Each file is truncated on its first token of a flow run unless `append` is
/// set, later tokens of the same run are appended, even after `output` moved
/// to another path and back. The current handle stays open until wrap up.
pub struct DumpFile {
    append: bool,
    file: Option<(PathBuf, File)>,
    opened: HashSet<PathBuf>,
}

impl DumpFile {
    async fn open(&mut self, path: PathBuf) -> Result<&mut File, ExecutionError> {
        let reopen = match &self.file {
            Some((current, _)) => *current != path,
            None => true,
        };
        if reopen {
            if let Some((_, mut previous)) = self.file.take() {
                previous.flush().await?;
            }
            let keep = self.append || self.opened.contains(&path);
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(keep)
                .truncate(!keep)
                .open(&path)
                .await?;
            self.opened.insert(path.clone());
            self.file = Some((path, file));
        }
        match &mut self.file {
            Some((_, file)) => Ok(file),
            None => Err(ExecutionError::Failed("output file not open".to_string())),
        }
    }
}

#[async_trait]
impl Actor for DumpFile {
    fn actor_type(&self) -> &str {
        "sink.dump_file"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Sink
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::invalid_input("token", "nothing"))?;
        let path = PathBuf::from(ctx.require_str("output")?);
        let line = format!("{}\n", token.payload());

        let file = self.open(path).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(ExecutionOutcome::NoOutput)
    }

    async fn wrap_up(&mut self) {
        self.opened.clear();
        if let Some((path, mut file)) = self.file.take() {
            if let Err(e) = file.flush().await {
                warn!("Failed to flush {}: {}", path.display(), e);
            }
        }
    }
}

pub struct DumpFileFactory;

impl ActorFactory for DumpFileFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require_str("output")?;
        Ok(Box::new(DumpFile {
            append: options.bool_or("append", false)?,
            file: None,
            opened: HashSet::new(),
        }))
    }

    fn actor_type(&self) -> &str {
        "sink.dump_file"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Writes token payloads to a file, one per line".to_string(),
            kind: ActorKind::Sink,
            options: vec![
                OptionDefinition::required("output", "File to write"),
                OptionDefinition::optional("append", "Keep existing content (default false)"),
            ],
        }
    }
}
