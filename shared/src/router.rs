use crate::error::DerivativeError;
use std::collections::HashMap;

/// Static project → source bucket table. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProjectRoutes {
    routes: HashMap<String, String>,
}

impl ProjectRoutes {
    pub fn new(routes: HashMap<String, String>) -> Self {
        Self { routes }
    }

    /// Parse a JSON object like `{"geerly":"geerly-media-source"}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let routes: HashMap<String, String> = serde_json::from_str(raw)?;
        Ok(Self::new(routes))
    }

    /// Source bucket for a project
    pub fn resolve(&self, project_id: &str) -> Result<&str, DerivativeError> {
        self.routes
            .get(project_id)
            .map(String::as_str)
            .ok_or_else(|| DerivativeError::UnknownProject(project_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown() {
        let routes = ProjectRoutes::from_json(r#"{"geerly":"geerly-source"}"#).unwrap();
        assert_eq!(routes.resolve("geerly").unwrap(), "geerly-source");
        assert!(matches!(
            routes.resolve("unknownproj"),
            Err(DerivativeError::UnknownProject(p)) if p == "unknownproj"
        ));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(ProjectRoutes::from_json(r#"["geerly"]"#).is_err());
    }
}
