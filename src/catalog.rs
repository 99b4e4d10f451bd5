//! Collaborators the core consumes but does not own: checklist template
//! lookup and the privilege predicate used for overrides on completed
//! records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::checklist::ChecklistTemplate;
use crate::error::StoreError;
use crate::state_machine::{Actor, TemplateId};

#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    /// Look up a template. `Ok(None)` means the template does not exist.
    async fn template(&self, id: &TemplateId) -> Result<Option<Arc<ChecklistTemplate>>, StoreError>;
}

/// Templates held in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplates {
    templates: HashMap<TemplateId, Arc<ChecklistTemplate>>,
}

impl InMemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: ChecklistTemplate) -> Self {
        self.insert(template);
        self
    }

    pub fn insert(&mut self, template: ChecklistTemplate) {
        self.templates
            .insert(template.id.clone(), Arc::new(template));
    }
}

#[async_trait]
impl TemplateCatalog for InMemoryTemplates {
    async fn template(&self, id: &TemplateId) -> Result<Option<Arc<ChecklistTemplate>>, StoreError> {
        Ok(self.templates.get(id).cloned())
    }
}

/// Decides whether an actor may edit records after completion.
pub trait PrivilegePolicy: Send + Sync {
    fn is_privileged(&self, actor: &Actor) -> bool;
}

impl<F> PrivilegePolicy for F
where
    F: Fn(&Actor) -> bool + Send + Sync,
{
    fn is_privileged(&self, actor: &Actor) -> bool {
        self(actor)
    }
}

/// Nobody may override.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrivileges;

impl PrivilegePolicy for NoPrivileges {
    fn is_privileged(&self, _actor: &Actor) -> bool {
        false
    }
}

/// A fixed set of actor ids with override rights.
#[derive(Debug, Clone, Default)]
pub struct PrivilegedActors {
    ids: HashSet<String>,
}

impl PrivilegedActors {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl PrivilegePolicy for PrivilegedActors {
    fn is_privileged(&self, actor: &Actor) -> bool {
        self.ids.contains(&actor.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::ChecklistItem;

    #[tokio::test]
    async fn in_memory_lookup() {
        let catalog = InMemoryTemplates::new().with_template(ChecklistTemplate::new(
            "hvac",
            "HVAC quarterly",
            vec![ChecklistItem::new("coils", "Clean coils", true)],
        ));

        let found = catalog.template(&TemplateId::from("hvac")).await.unwrap();
        assert_eq!(found.unwrap().total_items(), 1);
        assert!(catalog
            .template(&TemplateId::from("boiler"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn privilege_policies() {
        let admin = Actor::new("admin-1", "Admin");
        let tech = Actor::new("tech-9", "Tech");

        let listed = PrivilegedActors::new(["admin-1"]);
        assert!(listed.is_privileged(&admin));
        assert!(!listed.is_privileged(&tech));

        assert!(!NoPrivileges.is_privileged(&admin));

        let by_prefix = |actor: &Actor| actor.id.starts_with("admin-");
        assert!(by_prefix.is_privileged(&admin));
        assert!(!by_prefix.is_privileged(&tech));
    }
}
