use flowcore::{FlowError, FlowSpec};
use std::path::Path;

/// Serialization of a flow description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowFormat {
    Json,
    Yaml,
}

impl FlowFormat {
    /// Picks the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self, FlowError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(FlowFormat::Json),
            Some("yaml") | Some("yml") => Ok(FlowFormat::Yaml),
            _ => Err(FlowError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

pub fn parse_flow(text: &str, format: FlowFormat) -> Result<FlowSpec, FlowError> {
    let spec: FlowSpec = match format {
        FlowFormat::Json => serde_json::from_str(text)?,
        FlowFormat::Yaml => serde_yaml::from_str(text)?,
    };
    Ok(spec)
}

pub fn render_flow(spec: &FlowSpec, format: FlowFormat) -> Result<String, FlowError> {
    let text = match format {
        FlowFormat::Json => serde_json::to_string_pretty(spec)?,
        FlowFormat::Yaml => serde_yaml::to_string(spec)?,
    };
    Ok(text)
}

/// Reads a flow description from a `.json`, `.yaml` or `.yml` file
pub async fn load_flow(path: impl AsRef<Path>) -> Result<FlowSpec, FlowError> {
    let path = path.as_ref();
    let format = FlowFormat::from_path(path)?;
    let text = tokio::fs::read_to_string(path).await?;
    let spec = parse_flow(&text, format)?;
    tracing::debug!("Loaded flow '{}' from {}", spec.name, path.display());
    Ok(spec)
}

pub async fn save_flow(spec: &FlowSpec, path: impl AsRef<Path>) -> Result<(), FlowError> {
    let path = path.as_ref();
    let text = render_flow(spec, FlowFormat::from_path(path)?)?;
    tokio::fs::write(path, text).await?;
    Ok(())
}
