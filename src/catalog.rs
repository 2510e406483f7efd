use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Employee roster plus the department task/subtask tree.
///
/// Lookups never fail: an unknown employee has no department, an unknown
/// department or task has no tasks or subtasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    employees: BTreeMap<String, String>,
    #[serde(default)]
    departments: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(BUILTIN_CATALOG)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn employees(&self) -> Vec<&str> {
        self.employees.keys().map(String::as_str).collect()
    }

    pub fn contains_employee(&self, employee: &str) -> bool {
        self.employees.contains_key(employee)
    }

    pub fn department_of(&self, employee: &str) -> Option<&str> {
        self.employees.get(employee).map(String::as_str)
    }

    pub fn task_names(&self, department: &str) -> Vec<&str> {
        self.departments
            .get(department)
            .map(|tasks| tasks.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn subtask_names(&self, department: &str, task: &str) -> &[String] {
        self.departments
            .get(department)
            .and_then(|tasks| tasks.get(task))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
