//! Workflow definition parsing, validation, and filesystem load/save.
//!
//! A definition file holds one `WorkflowVersion` (nodes + edges) in YAML or
//! JSON. Parsing and structural validation both happen before any execution
//! is created, so the engine only ever sees well-formed versions.

use std::path::Path;

use terraflow_types::workflow::{EdgeKind, WorkflowVersion};

use super::graph::{GraphError, WorkflowGraph};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a workflow definition.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to parse workflow definition: {0}")]
    Parse(String),

    #[error("invalid workflow definition: {0}")]
    Invalid(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported definition format '{0}' (expected .yaml, .yml, or .json)")]
    UnsupportedFormat(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a workflow version from YAML and validate it.
pub fn parse_version_yaml(content: &str) -> Result<WorkflowVersion, DefinitionError> {
    let version: WorkflowVersion =
        serde_yaml_ng::from_str(content).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_version(&version)?;
    Ok(version)
}

/// Parse a workflow version from JSON and validate it.
pub fn parse_version_json(content: &str) -> Result<WorkflowVersion, DefinitionError> {
    let version: WorkflowVersion =
        serde_json::from_str(content).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_version(&version)?;
    Ok(version)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural validation of one version.
///
/// Checks node ids, edge labels, and DAG shape (non-empty, unique ids,
/// resolvable endpoints, acyclic). Executor-specific config is checked later
/// by `NodeExecutor::validate`.
pub fn validate_version(version: &WorkflowVersion) -> Result<(), DefinitionError> {
    for node in &version.nodes {
        if node.id.trim().is_empty() {
            return Err(DefinitionError::Invalid(
                "node id must not be empty".to_string(),
            ));
        }
    }

    for edge in &version.edges {
        if edge.kind == EdgeKind::Conditional && edge.label.is_none() {
            return Err(DefinitionError::Invalid(format!(
                "conditional edge '{}' -> '{}' is missing a branch label",
                edge.source, edge.target
            )));
        }
    }

    WorkflowGraph::build(version)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem load/save
// ---------------------------------------------------------------------------

/// Load and validate a version from a `.yaml`, `.yml`, or `.json` file.
///
/// The extension is checked before the file is touched, so an unsupported
/// format never surfaces as an io error.
pub fn load_version(path: &Path) -> Result<WorkflowVersion, DefinitionError> {
    let format = extension(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Yaml => parse_version_yaml(&content),
        Format::Json => parse_version_json(&content),
    }
}

/// Validate and write a version to a file; the format follows the extension.
pub fn save_version(path: &Path, version: &WorkflowVersion) -> Result<(), DefinitionError> {
    validate_version(version)?;
    let content = match extension(path)? {
        Format::Yaml => {
            serde_yaml_ng::to_string(version).map_err(|e| DefinitionError::Parse(e.to_string()))?
        }
        Format::Json => serde_json::to_string_pretty(version)
            .map_err(|e| DefinitionError::Parse(e.to_string()))?,
    };
    std::fs::write(path, content)?;
    Ok(())
}

enum Format {
    Yaml,
    Json,
}

fn extension(path: &Path) -> Result<Format, DefinitionError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        other => Err(DefinitionError::UnsupportedFormat(
            other.unwrap_or("").to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
version: "1.0.0"
created_at: "2026-08-01T00:00:00Z"
nodes:
  - id: start
    type: trigger
  - id: load
    type: data-input
    config:
      dataSource: project
  - id: decide
    type: decision
    config:
      conditionType: threshold
      field: load.cloudCover
      operator: less_than
      value: 20
  - id: ndvi
    type: processing
    config:
      processingType: ndvi
      inputNode: load
  - id: publish
    type: output
    config:
      destination: catalog
      inputNode: ndvi
edges:
  - source: start
    target: load
  - source: load
    target: decide
  - source: decide
    target: ndvi
    label: "true"
    kind: conditional
  - source: ndvi
    target: publish
"#;

    #[test]
    fn test_parse_valid_yaml() {
        let version = parse_version_yaml(VALID_YAML).unwrap();
        assert_eq!(version.version, "1.0.0");
        assert_eq!(version.nodes.len(), 5);
        assert_eq!(version.edges.len(), 4);
        assert_eq!(version.nodes[1].config_str("dataSource"), Some("project"));
    }

    #[test]
    fn test_parse_invalid_yaml_syntax() {
        let err = parse_version_yaml("nodes: [").unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }

    #[test]
    fn test_parse_json() {
        let version = parse_version_yaml(VALID_YAML).unwrap();
        let json = serde_json::to_string(&version).unwrap();
        let reparsed = parse_version_json(&json).unwrap();
        assert_eq!(reparsed.nodes.len(), 5);
    }

    #[test]
    fn test_validate_rejects_empty_node_id() {
        let yaml = r#"
version: "1.0.0"
created_at: "2026-08-01T00:00:00Z"
nodes:
  - id: ""
    type: trigger
edges: []
"#;
        let err = parse_version_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("node id"));
    }

    #[test]
    fn test_validate_rejects_unlabeled_conditional_edge() {
        let yaml = r#"
version: "1.0.0"
created_at: "2026-08-01T00:00:00Z"
nodes:
  - id: decide
    type: decision
  - id: next
    type: processing
edges:
  - source: decide
    target: next
    kind: conditional
"#;
        let err = parse_version_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("branch label"));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let yaml = r#"
version: "1.0.0"
created_at: "2026-08-01T00:00:00Z"
nodes:
  - id: a
    type: processing
  - id: b
    type: processing
edges:
  - source: a
    target: b
  - source: b
    target: a
"#;
        let err = parse_version_yaml(yaml).unwrap_err();
        assert!(matches!(err, DefinitionError::Graph(GraphError::Cycle(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let version = parse_version_yaml(VALID_YAML).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("wf.yaml");
        save_version(&yaml_path, &version).unwrap();
        let loaded = load_version(&yaml_path).unwrap();
        assert_eq!(loaded.nodes.len(), 5);

        let json_path = dir.path().join("wf.json");
        save_version(&json_path, &version).unwrap();
        let loaded = load_version(&json_path).unwrap();
        assert_eq!(loaded.edges.len(), 4);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_version(Path::new("wf.toml")).unwrap_err();
        assert!(matches!(err, DefinitionError::UnsupportedFormat(_)));
    }
}
