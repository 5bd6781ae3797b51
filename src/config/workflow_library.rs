use super::{ConfigError, Settings, WorkflowDefinition, WorkflowName, WorkflowRef};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Read-only set of workflow definitions shared between sessions.
#[derive(Debug, Clone, Default)]
pub struct WorkflowLibrary {
    definitions: BTreeMap<WorkflowRef, Arc<WorkflowDefinition>>,
}

impl WorkflowLibrary {
    pub fn load_dir(dir: &Path, settings: &Settings) -> Result<Self, ConfigError> {
        let entries = fs::read_dir(dir).map_err(|source| ConfigError::Read {
            path: dir.display().to_string(),
            source,
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Read {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            let is_definition = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml" | "json")
            );
            if path.is_file() && is_definition {
                paths.push(path);
            }
        }
        paths.sort();

        let mut library = Self::default();
        for path in paths {
            let definition = WorkflowDefinition::from_path(&path)?;
            definition.validate_against(settings)?;
            library.insert(definition)?;
        }
        Ok(library)
    }

    pub fn insert(
        &mut self,
        definition: WorkflowDefinition,
    ) -> Result<Arc<WorkflowDefinition>, ConfigError> {
        definition.validate()?;
        let key = definition.reference();
        if self.definitions.contains_key(&key) {
            return Err(ConfigError::DuplicateWorkflow {
                name: key.name.to_string(),
                version: key.version,
            });
        }
        let shared = Arc::new(definition);
        self.definitions.insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    pub fn get(&self, reference: &WorkflowRef) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(reference).cloned()
    }

    /// Highest version registered under `name`.
    pub fn latest(&self, name: &WorkflowName) -> Option<Arc<WorkflowDefinition>> {
        self.definitions
            .iter()
            .filter(|(key, _)| &key.name == name)
            .max_by_key(|(key, _)| key.version)
            .map(|(_, definition)| Arc::clone(definition))
    }

    pub fn references(&self) -> Vec<WorkflowRef> {
        self.definitions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
