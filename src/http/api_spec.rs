//! API specification loading.
//!
//! # Responsibilities
//! - Read the OpenAPI document (YAML or JSON) from disk
//! - Extract the declared operations (method + path template)
//! - Reject documents the router could not serve unambiguously
//!
//! # Design Decisions
//! - Only `paths` is interpreted; schemas and components stay opaque
//! - Path parameters are renamed by position, so templates differing only
//!   in parameter names map to the same route
//! - Validation happens here so router construction cannot panic

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use axum::http::Method;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiSpecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid document: {0}")]
    Invalid(String),
}

const METHODS: [(&str, Method); 8] = [
    ("get", Method::GET),
    ("put", Method::PUT),
    ("post", Method::POST),
    ("delete", Method::DELETE),
    ("options", Method::OPTIONS),
    ("head", Method::HEAD),
    ("patch", Method::PATCH),
    ("trace", Method::TRACE),
];

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    info: Info,
    #[serde(default)]
    paths: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct Info {
    title: Option<String>,
    version: Option<String>,
}

/// One declared operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub method: Method,
    /// Path template as written in the document.
    pub path: String,
    /// Router path with positionally named parameters.
    pub route: String,
    pub operation_id: Option<String>,
}

/// The parsed API specification.
#[derive(Debug, Clone)]
pub struct ApiSpec {
    pub title: String,
    pub version: String,
    pub operations: Vec<Operation>,
}

impl ApiSpec {
    /// Load and validate the document at `path`.
    pub fn load(path: &Path) -> Result<Self, ApiSpecError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Result<Self, ApiSpecError> {
        let document: Document = serde_yaml::from_str(source)?;

        if document.paths.is_empty() {
            return Err(ApiSpecError::Invalid("document declares no paths".into()));
        }

        let mut seen = HashSet::new();
        let mut operations = Vec::new();

        for (path, item) in &document.paths {
            let route = route_template(path)?;

            for (name, method) in &METHODS {
                let Some(operation) = item.get(*name) else {
                    continue;
                };

                if !seen.insert((method.clone(), route.clone())) {
                    return Err(ApiSpecError::Invalid(format!(
                        "{} {path} conflicts with another path",
                        method.as_str()
                    )));
                }

                operations.push(Operation {
                    method: method.clone(),
                    path: path.clone(),
                    route: route.clone(),
                    operation_id: operation
                        .get("operationId")
                        .and_then(serde_yaml::Value::as_str)
                        .map(str::to_string),
                });
            }
        }

        if operations.is_empty() {
            return Err(ApiSpecError::Invalid(
                "document declares no operations".into(),
            ));
        }

        Ok(Self {
            title: document.info.title.unwrap_or_default(),
            version: document.info.version.unwrap_or_default(),
            operations,
        })
    }

    /// Whether the document declares `method` on `route`.
    pub fn declares(&self, method: &Method, route: &str) -> bool {
        self.operations
            .iter()
            .any(|op| op.method == *method && op.route == route)
    }
}

/// Convert an OpenAPI path template into a router path.
///
/// `/pipelines/{group}/{name}` becomes `/pipelines/{p1}/{p2}`.
pub fn route_template(path: &str) -> Result<String, ApiSpecError> {
    let invalid = |reason: &str| ApiSpecError::Invalid(format!("path {path:?} {reason}"));

    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };

    let mut route = String::with_capacity(path.len());
    for (index, segment) in rest.split('/').enumerate() {
        route.push('/');

        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !valid {
                return Err(invalid("has a malformed parameter"));
            }
            route.push_str(&format!("{{p{index}}}"));
        } else if segment.contains(['{', '}']) {
            return Err(invalid("mixes literals and parameters in one segment"));
        } else if segment.starts_with([':', '*']) {
            return Err(invalid("has a segment starting with ':' or '*'"));
        } else {
            route.push_str(segment);
        }
    }

    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINES: &str = r#"
openapi: "3.0.0"
info:
  title: Bob API
  version: 1.0.0
paths:
  /can-we-build-it:
    get:
      operationId: HealthCheck
  /pipelines/groups/{group}/names/{name}:
    parameters:
      - name: group
        in: path
    post:
      operationId: PipelineCreate
    delete:
      operationId: PipelineDelete
"#;

    #[test]
    fn parses_operations() {
        let spec = ApiSpec::parse(PIPELINES).unwrap();

        assert_eq!(spec.title, "Bob API");
        assert_eq!(spec.version, "1.0.0");
        assert_eq!(spec.operations.len(), 3);

        let create = spec
            .operations
            .iter()
            .find(|op| op.method == Method::POST)
            .unwrap();
        assert_eq!(create.operation_id.as_deref(), Some("PipelineCreate"));
        assert_eq!(create.route, "/pipelines/groups/{p2}/names/{p4}");
        assert!(spec.declares(&Method::GET, "/can-we-build-it"));
        assert!(!spec.declares(&Method::GET, "/health"));
    }

    #[test]
    fn accepts_json() {
        let spec = ApiSpec::parse(r#"{"paths": {"/status": {"get": {}}}}"#).unwrap();
        assert_eq!(spec.operations[0].operation_id, None);
    }

    #[test]
    fn rejects_empty_paths() {
        assert!(matches!(
            ApiSpec::parse("openapi: 3.0.0\npaths: {}\n"),
            Err(ApiSpecError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ApiSpec::parse("paths: [1, 2"),
            Err(ApiSpecError::Parse(_))
        ));
    }

    #[test]
    fn rejects_templates_that_collide() {
        let source = r#"
paths:
  /pipelines/{id}:
    get: {}
  /pipelines/{name}:
    get: {}
"#;
        assert!(matches!(
            ApiSpec::parse(source),
            Err(ApiSpecError::Invalid(_))
        ));
    }

    #[test]
    fn route_template_validation() {
        assert_eq!(route_template("/").unwrap(), "/");
        assert_eq!(route_template("/a/{x}/b").unwrap(), "/a/{p1}/b");
        assert!(route_template("pipelines").is_err());
        assert!(route_template("/a/{}").is_err());
        assert!(route_template("/a/pre{x}").is_err());
        assert!(route_template("/a/:x").is_err());
        assert!(route_template("/a/{*rest}").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            ApiSpec::load(Path::new("/nonexistent/bob/api.yaml")),
            Err(ApiSpecError::Io(_))
        ));
    }
}
