//! Read-only registry of workflow templates

use super::model::WorkflowTemplate;
use crate::config::TemplateConfig;
use crate::service::{ContentService, ServiceError, TemplateCatalogResponse};
use std::collections::HashMap;

/// Available workflow templates, keyed by id
#[derive(Debug, Clone, Default)]
pub struct WorkflowTemplateCatalog {
    templates: HashMap<String, WorkflowTemplate>,
}

impl WorkflowTemplateCatalog {
    pub fn new(templates: impl IntoIterator<Item = WorkflowTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Build from locally declared templates
    pub fn from_config(templates: &HashMap<String, TemplateConfig>) -> Self {
        Self::new(
            templates
                .iter()
                .map(|(id, config)| config.to_template(id)),
        )
    }

    /// Build from the service's catalog response
    pub fn from_response(response: TemplateCatalogResponse) -> Self {
        Self::new(
            response
                .templates
                .into_iter()
                .map(|(id, descriptor)| WorkflowTemplate {
                    id,
                    name: descriptor.name,
                    description: descriptor.description,
                    steps: descriptor.steps,
                    default_options: descriptor.default_options,
                }),
        )
    }

    /// Fetch the remote catalog and merge it in; remote entries win
    pub async fn refresh(&mut self, service: &dyn ContentService) -> Result<usize, ServiceError> {
        let remote = Self::from_response(service.templates().await?);
        let count = remote.len();
        self.merge(remote);
        tracing::debug!(count, "Refreshed template catalog");
        Ok(count)
    }

    /// Merge another catalog into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        self.templates.extend(other.templates);
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(id)
    }

    /// All templates sorted by id
    pub fn list(&self) -> Vec<&WorkflowTemplate> {
        let mut templates: Vec<_> = self.templates.values().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::TemplateDescriptor;
    use crate::service::mock::MockService;
    use serde_json::json;

    fn template(id: &str, name: &str) -> WorkflowTemplate {
        WorkflowTemplate {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            steps: vec!["affirmations".into()],
            default_options: HashMap::new(),
        }
    }

    #[test]
    fn test_list_sorted_by_id() {
        let catalog = WorkflowTemplateCatalog::new(vec![
            template("quick", "Quick"),
            template("full", "Full"),
        ]);

        let ids: Vec<_> = catalog.list().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["full", "quick"]);
        assert_eq!(catalog.get("full").unwrap().name, "Full");
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_from_config() {
        let toml = r#"
            [full]
            name = "Full run"
            steps = ["affirmations", "images", "video"]

            [full.default_options]
            count = 5
        "#;
        let templates: HashMap<String, TemplateConfig> = toml::from_str(toml).unwrap();
        let catalog = WorkflowTemplateCatalog::from_config(&templates);

        let full = catalog.get("full").unwrap();
        assert_eq!(full.steps.len(), 3);
        assert_eq!(full.default_options["count"], json!(5));
    }

    #[tokio::test]
    async fn test_refresh_remote_wins() {
        let mut remote = TemplateCatalogResponse::default();
        remote.templates.insert(
            "full".into(),
            TemplateDescriptor {
                name: "Full (remote)".into(),
                description: "served".into(),
                steps: vec!["affirmations".into(), "images".into(), "video".into()],
                default_options: HashMap::from([("count".to_string(), json!(5))]),
            },
        );
        let service = MockService::new().with_templates(remote);

        let mut catalog = WorkflowTemplateCatalog::new(vec![
            template("full", "Full (local)"),
            template("quick", "Quick"),
        ]);
        let fetched = catalog.refresh(&service).await.unwrap();

        assert_eq!(fetched, 1);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("full").unwrap().name, "Full (remote)");
        assert_eq!(catalog.get("full").unwrap().steps.len(), 3);
    }
}
