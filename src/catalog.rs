//! Task catalog loading and validation.
//!
//! The catalog supplies the initial ordered list of task specs. Specs use
//! 1-based positions as dependency ids, matching the ids the store will
//! assign on a fresh database. Validation guarantees the scheduler only
//! ever sees a DAG: dependencies must point at earlier entries, and a
//! petgraph cycle check guards the graph as a whole.

use std::path::Path;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Deserialize;

use crate::store::StateStore;
use crate::task::TaskSpec;
use crate::{olog, Error, Result};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "tasks")]
    tasks: Vec<TaskSpec>,
}

/// An ordered, validated set of task specs.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: Vec<TaskSpec>,
}

impl Catalog {
    /// Load and validate a catalog from a TOML file with `[[tasks]]`
    /// entries. A missing file is a configuration error surfaced before
    /// the loop starts.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::CatalogNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let file: CatalogFile = toml::from_str(&raw)?;
        Self::from_specs(file.tasks)
    }

    /// Build a catalog from in-memory specs. Used by tests and embedders.
    pub fn from_specs(specs: Vec<TaskSpec>) -> Result<Self> {
        let catalog = Self { specs };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn specs(&self) -> &[TaskSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Dependency ids must reference earlier entries only (which also rules
    /// out self-references and cycles); the petgraph check is a second
    /// guard for embedders constructing specs programmatically.
    fn validate(&self) -> Result<()> {
        if self.specs.is_empty() {
            return Err(Error::Validation("catalog has no tasks".to_string()));
        }

        for (index, spec) in self.specs.iter().enumerate() {
            let position = (index + 1) as i64;
            for &dep in &spec.deps {
                if dep < 1 || dep >= position {
                    return Err(Error::Validation(format!(
                        "task '{}' (position {position}) has invalid dependency {dep}: \
                         dependencies must reference earlier tasks",
                        spec.name
                    )));
                }
            }
        }

        if is_cyclic_directed(&self.graph()) {
            return Err(Error::Validation(
                "task catalog contains a dependency cycle".to_string(),
            ));
        }
        Ok(())
    }

    fn graph(&self) -> DiGraph<usize, ()> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.specs.len()).map(|i| graph.add_node(i)).collect();
        for (index, spec) in self.specs.iter().enumerate() {
            for &dep in &spec.deps {
                let dep_index = (dep - 1) as usize;
                if dep_index < nodes.len() {
                    graph.add_edge(nodes[dep_index], nodes[index], ());
                }
            }
        }
        graph
    }

    /// Create the catalog's tasks in the store, once.
    ///
    /// Idempotent: a store that already contains tasks is left untouched,
    /// so calling this twice (or resuming an interrupted run) never
    /// duplicates tasks.
    pub fn initialize(&self, store: &StateStore) -> Result<()> {
        if !store.list_tasks()?.is_empty() {
            olog!("Store already initialized, skipping catalog load");
            return Ok(());
        }

        for spec in &self.specs {
            store.create_task(&spec.name, &spec.component, &spec.description, &spec.deps)?;
        }
        store.append_log(
            "tasks_initialized",
            &format!("Created {} tasks", self.specs.len()),
            None,
        )?;
        olog!("Initialized {} tasks from catalog", self.specs.len());
        Ok(())
    }
}
