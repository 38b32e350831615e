//! Stack templates and parameters, and their pre-launch validation.
//!
//! Templates are opaque to the orchestrator. Validation only checks what
//! can be checked without a remote call: the template is non-empty, the
//! stack name is acceptable, parameter keys are sane, and for JSON
//! templates every declared parameter without a default is supplied.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

use crate::errors::ValidationError;

static STACK_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("stack name pattern is valid")
});

/// One template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParameter {
    /// The parameter name.
    #[serde(rename = "ParameterKey")]
    pub key: String,
    /// The parameter value.
    #[serde(rename = "ParameterValue")]
    pub value: String,
}

impl StackParameter {
    /// Creates a new parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A declarative infrastructure template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    /// The template body.
    pub body: String,
    /// Where the body was read from, for diagnostics.
    pub origin: Option<PathBuf>,
}

impl TemplateSource {
    /// Creates a template from an in-memory body.
    #[must_use]
    pub fn inline(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            origin: None,
        }
    }

    /// Reads a template from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::new("template", format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Self {
            body,
            origin: Some(path.to_path_buf()),
        })
    }

    fn label(&self) -> String {
        self.origin
            .as_ref()
            .map_or_else(|| "<inline>".to_string(), |p| p.display().to_string())
    }

    /// Returns the names of declared parameters that have no default.
    ///
    /// `None` if the body is not a JSON object (e.g. YAML), in which case
    /// completeness cannot be checked locally.
    #[must_use]
    pub fn required_parameters(&self) -> Option<Vec<String>> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        let object = value.as_object()?;
        let Some(declared) = object.get("Parameters").and_then(|p| p.as_object()) else {
            return Some(Vec::new());
        };
        Some(
            declared
                .iter()
                .filter(|(_, spec)| spec.get("Default").is_none())
                .map(|(name, _)| name.clone())
                .collect(),
        )
    }

    fn declared_parameters(&self) -> Option<HashSet<String>> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        let declared = value.get("Parameters")?.as_object()?;
        Some(declared.keys().cloned().collect())
    }
}

/// Parses a parameter file.
///
/// Accepts either a list of `{"ParameterKey": .., "ParameterValue": ..}`
/// entries or an object mapping names to scalar values. Array values in
/// the object form are joined with commas.
pub fn parse_parameters(raw: &str) -> Result<Vec<StackParameter>, ValidationError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ValidationError::new("parameters", format!("invalid JSON: {e}")))?;

    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value).map_err(|e| {
            ValidationError::new("parameters", format!("invalid parameter list: {e}"))
        }),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| {
                let value = scalar_to_string(&key, &value)?;
                Ok::<_, ValidationError>(StackParameter::new(key, value))
            })
            .collect(),
        _ => Err(ValidationError::new(
            "parameters",
            "unsupported format, use a JSON list or object",
        )),
    }
}

/// Reads and parses a parameter file.
pub fn load_parameters(path: impl AsRef<Path>) -> Result<Vec<StackParameter>, ValidationError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ValidationError::new("parameters", format!("cannot read {}: {e}", path.display()))
    })?;
    parse_parameters(&raw)
}

fn scalar_to_string(key: &str, value: &serde_json::Value) -> Result<String, ValidationError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
                    ValidationError::new("parameters", format!("{key}: nested values are not supported")),
                ),
                other => scalar_to_string(key, other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(",")),
        serde_json::Value::Null | serde_json::Value::Object(_) => Err(ValidationError::new(
            "parameters",
            format!("{key}: value must be a string, number, boolean, or list"),
        )),
    }
}

/// Validates a stack name.
pub fn validate_stack_name(name: &str) -> Result<(), ValidationError> {
    if STACK_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "stack_name",
            format!("'{name}' must start with a letter and contain only letters, digits, and hyphens (max 128)"),
        ))
    }
}

/// Validates everything `launch` needs before making a remote call.
pub fn validate_launch(
    template: &TemplateSource,
    parameters: &[StackParameter],
    stack_name: &str,
) -> Result<(), ValidationError> {
    validate_stack_name(stack_name)?;

    if template.body.trim().is_empty() {
        return Err(ValidationError::new(
            "template",
            format!("{} is empty", template.label()),
        ));
    }

    let mut seen = HashSet::new();
    for parameter in parameters {
        if parameter.key.trim().is_empty() {
            return Err(ValidationError::new("parameters", "parameter key must not be blank"));
        }
        if !seen.insert(parameter.key.as_str()) {
            return Err(ValidationError::new(
                "parameters",
                format!("duplicate parameter '{}'", parameter.key),
            ));
        }
    }

    let Some(required) = template.required_parameters() else {
        debug!(template = %template.label(), "Template is not JSON, skipping parameter completeness check");
        return Ok(());
    };

    let missing: Vec<_> = required
        .iter()
        .filter(|name| !seen.contains(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::new(
            "parameters",
            format!("missing required parameters: {}", missing.join(", ")),
        ));
    }

    if let Some(declared) = template.declared_parameters() {
        let mut unknown: Vec<_> = seen
            .iter()
            .filter(|key| !declared.contains(**key))
            .map(|key| (*key).to_string())
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(ValidationError::new(
                "parameters",
                format!("parameters not declared by the template: {}", unknown.join(", ")),
            ));
        }
    }

    Ok(())
}
