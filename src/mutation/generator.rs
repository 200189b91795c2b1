//! Mutation workload sources.

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use super::mutant::Mutation;

/// Workload generation errors.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Manifest could not be read.
    #[error("failed to read mutation manifest {path}: {source}")]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Manifest is not a JSON array of mutations.
    #[error("failed to parse mutation manifest {path}: {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Two mutations share an id.
    #[error("duplicate mutation id `{0}`")]
    DuplicateId(String),
}

/// Produces the workload of a run. Called once, after a successful baseline.
pub trait MutationGenerator {
    /// Produce the mutations to test.
    fn generate(&mut self) -> Result<Vec<Mutation>, GeneratorError>;
}

impl MutationGenerator for Vec<Mutation> {
    fn generate(&mut self) -> Result<Vec<Mutation>, GeneratorError> {
        let workload = std::mem::take(self);
        ensure_unique_ids(&workload)?;
        Ok(workload)
    }
}

/// Loads mutations from a JSON manifest.
///
/// The manifest is an array of objects with `id`, optional `label`, `selector`
/// and `location: {file, line}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestGenerator {
    path: PathBuf,
    filter: Option<String>,
}

impl ManifestGenerator {
    /// Generator reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filter: None,
        }
    }

    /// Keep only mutations whose id, label or selector contains `filter`.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }

    fn matches(&self, mutation: &Mutation) -> bool {
        match &self.filter {
            Some(filter) => {
                mutation.id.contains(filter.as_str())
                    || mutation.label.contains(filter.as_str())
                    || mutation.selector().contains(filter.as_str())
            }
            None => true,
        }
    }
}

impl MutationGenerator for ManifestGenerator {
    fn generate(&mut self) -> Result<Vec<Mutation>, GeneratorError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| GeneratorError::Io {
            path: self.path.clone(),
            source,
        })?;
        let all: Vec<Mutation> =
            serde_json::from_str(&raw).map_err(|source| GeneratorError::Parse {
                path: self.path.clone(),
                source,
            })?;
        ensure_unique_ids(&all)?;

        let discovered = all.len();
        let workload: Vec<Mutation> = all.into_iter().filter(|m| self.matches(m)).collect();
        debug!(
            manifest = %self.path.display(),
            discovered,
            selected = workload.len(),
            "loaded mutation manifest"
        );
        Ok(workload)
    }
}

fn ensure_unique_ids(workload: &[Mutation]) -> Result<(), GeneratorError> {
    let mut seen = BTreeSet::new();
    for mutation in workload {
        if !seen.insert(mutation.id.as_str()) {
            return Err(GeneratorError::DuplicateId(mutation.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn manifest(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp manifest should be created");
        file.write_all(contents.as_bytes())
            .expect("manifest should be written");
        file
    }

    #[test]
    fn in_memory_workload_is_consumed_once() {
        let mut workload = vec![Mutation::new("a", "first"), Mutation::new("b", "second")];
        assert_eq!(workload.generate().expect("workload should generate").len(), 2);
        assert!(workload.generate().expect("second call should succeed").is_empty());
    }

    #[test]
    fn manifest_loads_optional_fields() {
        let file = manifest(
            r#"[
                {"id": "m1", "label": "replace + with -", "location": {"file": "src/lib.rs", "line": 12}},
                {"id": "m2", "selector": "lib::add::2"}
            ]"#,
        );
        let workload = ManifestGenerator::new(file.path())
            .generate()
            .expect("manifest should load");
        assert_eq!(workload.len(), 2);
        assert_eq!(workload[0].selector(), "m1");
        assert_eq!(
            workload[0].location.as_ref().map(|l| l.line),
            Some(12)
        );
        assert_eq!(workload[1].selector(), "lib::add::2");
        assert!(workload[1].label.is_empty());
    }

    #[test]
    fn filter_matches_id_label_or_selector() {
        let file = manifest(
            r#"[
                {"id": "m1", "label": "negate condition in parse"},
                {"id": "m2", "label": "swap operands", "selector": "parse::swap"},
                {"id": "m3", "label": "remove call"}
            ]"#,
        );
        let workload = ManifestGenerator::new(file.path())
            .with_filter(Some("parse".to_string()))
            .generate()
            .expect("manifest should load");
        let ids: Vec<_> = workload.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);

        let all = ManifestGenerator::new(file.path())
            .with_filter(Some(String::new()))
            .generate()
            .expect("manifest should load");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let file = manifest(r#"[{"id": "m1"}, {"id": "m1"}]"#);
        let err = ManifestGenerator::new(file.path())
            .generate()
            .expect_err("duplicates should fail");
        assert!(matches!(err, GeneratorError::DuplicateId(id) if id == "m1"));
    }

    #[test]
    fn missing_or_malformed_manifest_is_an_error() {
        let err = ManifestGenerator::new("/definitely/not/here.json")
            .generate()
            .expect_err("missing manifest should fail");
        assert!(matches!(err, GeneratorError::Io { .. }));

        let file = manifest("{not json");
        let err = ManifestGenerator::new(file.path())
            .generate()
            .expect_err("malformed manifest should fail");
        assert!(matches!(err, GeneratorError::Parse { .. }));
    }
}
