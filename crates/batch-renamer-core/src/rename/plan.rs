use super::validate::{validate_file_name, validate_target, NameLimits};
use crate::error::{Error, ValidationError};
use crate::paths;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStatus {
    Ready,
    /// Target equals the source; nothing to do.
    Unchanged,
    Invalid(ValidationError),
    /// Something else already exists at the target. Resolved at execute time.
    FilesystemConflict,
    /// Shares its target with the listed entries. Blocks execution.
    BatchConflict { others: Vec<usize> },
}

impl PlanStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PlanStatus::Ready => "ready",
            PlanStatus::Unchanged => "unchanged",
            PlanStatus::Invalid(_) => "invalid",
            PlanStatus::FilesystemConflict => "exists",
            PlanStatus::BatchConflict { .. } => "duplicate target",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub status: PlanStatus,
    /// Set when the generated name itself was illegal (e.g. contained a path
    /// separator). Such an entry stays invalid until retargeted.
    pub name_error: Option<ValidationError>,
}

/// Target shared by more than one plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConflictGroup {
    pub target: PathBuf,
    pub entries: Vec<usize>,
}

/// Ordered old → new pairs with their preview status. Execution follows the
/// entry order.
#[derive(Debug, Clone)]
pub struct RenamePlan {
    entries: Vec<PlanEntry>,
    limits: NameLimits,
}

impl RenamePlan {
    /// Build a plan from explicit pairs. Paths are normalized and every
    /// status is computed against the current filesystem.
    pub fn from_pairs<I>(pairs: I, limits: NameLimits) -> Self
    where
        I: IntoIterator<Item = (PathBuf, PathBuf)>,
    {
        let entries = pairs
            .into_iter()
            .map(|(source, target)| PlanEntry {
                source: paths::normalize_path(&source),
                target: paths::normalize_path(&target),
                status: PlanStatus::Ready,
                name_error: None,
            })
            .collect();
        let mut plan = RenamePlan { entries, limits };
        plan.refresh();
        plan
    }

    /// Build a plan renaming each source in place to a new file name. Names
    /// are validated before they are joined onto the source directory, so a
    /// name like `../x` or `a/b` is rejected instead of moving the file.
    pub fn from_names<I>(names: I, limits: NameLimits) -> Self
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        let entries = names
            .into_iter()
            .map(|(source, name)| {
                let source = paths::normalize_path(&source);
                let parent = source.parent().map(Path::to_path_buf).unwrap_or_default();
                match validate_file_name(&name, &limits) {
                    Ok(()) => PlanEntry {
                        target: parent.join(&name),
                        source,
                        status: PlanStatus::Ready,
                        name_error: None,
                    },
                    // Kept unnormalized; only shown, never renamed to.
                    Err(e) => PlanEntry {
                        target: parent.join(&name),
                        source,
                        status: PlanStatus::Invalid(e.clone()),
                        name_error: Some(e),
                    },
                }
            })
            .collect();
        let mut plan = RenamePlan { entries, limits };
        plan.refresh();
        plan
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PlanEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limits(&self) -> NameLimits {
        self.limits
    }

    /// Point entry `index` at a new target.
    pub fn retarget(&mut self, index: usize, target: &Path) -> Result<(), Error> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| Error::Other(format!("No plan entry at index {}", index)))?;
        entry.target = paths::normalize_path(target);
        entry.name_error = None;
        self.refresh();
        Ok(())
    }

    /// Drop entry `index` from the plan. Later indices shift down by one.
    pub fn remove(&mut self, index: usize) -> Option<PlanEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);
        self.refresh();
        Some(entry)
    }

    /// Recompute every status, e.g. after the filesystem changed.
    pub fn refresh(&mut self) {
        for entry in &mut self.entries {
            entry.status = match &entry.name_error {
                Some(e) => PlanStatus::Invalid(e.clone()),
                None => item_status(&entry.source, &entry.target, &self.limits),
            };
        }
        for group in self.batch_conflicts() {
            for &index in &group.entries {
                let entry = &mut self.entries[index];
                if matches!(entry.status, PlanStatus::Invalid(_)) {
                    continue;
                }
                entry.status = PlanStatus::BatchConflict {
                    others: group
                        .entries
                        .iter()
                        .copied()
                        .filter(|&other| other != index)
                        .collect(),
                };
            }
        }
    }

    /// Targets claimed by more than one entry, in order of first claim.
    /// Computed from the entries themselves, so caller edits that bypassed
    /// `refresh` are still caught.
    pub fn batch_conflicts(&self) -> Vec<BatchConflictGroup> {
        let mut by_target: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.name_error.is_some() {
                continue;
            }
            by_target
                .entry(paths::collision_key(&entry.target))
                .or_default()
                .push(index);
        }

        let mut groups: Vec<BatchConflictGroup> = by_target
            .into_values()
            .filter(|indices| indices.len() > 1)
            .map(|indices| BatchConflictGroup {
                target: self.entries[indices[0]].target.clone(),
                entries: indices,
            })
            .collect();
        groups.sort_by_key(|g| g.entries[0]);
        groups
    }

    pub fn has_fatal_conflicts(&self) -> bool {
        !self.batch_conflicts().is_empty()
    }

    /// The first batch-internal conflict as an error, if any.
    pub fn check_batch_conflicts(&self) -> Result<(), Error> {
        match self.batch_conflicts().into_iter().next() {
            Some(group) => Err(Error::BatchConflict {
                target: group.target,
                sources: group
                    .entries
                    .iter()
                    .map(|&i| self.entries[i].source.clone())
                    .collect(),
            }),
            None => Ok(()),
        }
    }

    pub fn count(&self, predicate: impl Fn(&PlanStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.status)).count()
    }
}

fn item_status(source: &Path, target: &Path, limits: &NameLimits) -> PlanStatus {
    if source == target {
        return PlanStatus::Unchanged;
    }
    if let Err(e) = validate_target(target, limits) {
        return PlanStatus::Invalid(e);
    }
    // symlink_metadata so a dangling link still counts as occupying the name.
    if fs::symlink_metadata(target).is_ok() && !paths::is_same_file(source, target) {
        return PlanStatus::FilesystemConflict;
    }
    PlanStatus::Ready
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(dir: &Path, names: &[(&str, &str)]) -> Vec<(PathBuf, PathBuf)> {
        names
            .iter()
            .map(|(a, b)| (dir.join(a), dir.join(b)))
            .collect()
    }

    #[test]
    fn test_statuses() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg", "taken.jpg"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let plan = RenamePlan::from_pairs(
            pairs(
                dir.path(),
                &[
                    ("a.jpg", "x.jpg"),
                    ("b.jpg", "b.jpg"),
                    ("c.jpg", "taken.jpg"),
                    ("d.jpg", "bad:name.jpg"),
                ],
            ),
            NameLimits::default(),
        );

        let statuses: Vec<&PlanStatus> = plan.entries().iter().map(|e| &e.status).collect();
        assert_eq!(statuses[0], &PlanStatus::Ready);
        assert_eq!(statuses[1], &PlanStatus::Unchanged);
        assert_eq!(statuses[2], &PlanStatus::FilesystemConflict);
        assert_eq!(
            statuses[3],
            &PlanStatus::Invalid(ValidationError::ReservedCharacter(':'))
        );
        assert!(!plan.has_fatal_conflicts());
        assert!(plan.check_batch_conflicts().is_ok());
    }

    #[test]
    fn test_duplicate_targets_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = RenamePlan::from_pairs(
            pairs(
                dir.path(),
                &[("a.jpg", "b.jpg"), ("c.jpg", "b.jpg"), ("d.jpg", "e.jpg")],
            ),
            NameLimits::default(),
        );

        assert!(plan.has_fatal_conflicts());
        assert_eq!(
            plan.entries()[0].status,
            PlanStatus::BatchConflict { others: vec![1] }
        );
        assert_eq!(
            plan.entries()[1].status,
            PlanStatus::BatchConflict { others: vec![0] }
        );
        assert_eq!(plan.entries()[2].status, PlanStatus::Ready);

        match plan.check_batch_conflicts() {
            Err(Error::BatchConflict { target, sources }) => {
                assert_eq!(target, dir.path().join("b.jpg"));
                assert_eq!(sources.len(), 2);
            }
            other => panic!("expected batch conflict, got {:?}", other),
        }

        plan.retarget(1, &dir.path().join("f.jpg")).unwrap();
        assert!(!plan.has_fatal_conflicts());
        assert_eq!(plan.entries()[0].status, PlanStatus::Ready);
        assert_eq!(plan.entries()[1].status, PlanStatus::Ready);
    }

    #[test]
    fn test_remove_resolves_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = RenamePlan::from_pairs(
            pairs(dir.path(), &[("a.jpg", "b.jpg"), ("c.jpg", "b.jpg")]),
            NameLimits::default(),
        );
        let removed = plan.remove(0).unwrap();
        assert_eq!(removed.source, dir.path().join("a.jpg"));
        assert_eq!(plan.len(), 1);
        assert!(!plan.has_fatal_conflicts());
        assert!(plan.remove(5).is_none());
        assert!(plan.retarget(5, Path::new("/x")).is_err());
    }

    #[test]
    fn test_unchanged_entry_still_claims_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RenamePlan::from_pairs(
            pairs(dir.path(), &[("a.jpg", "b.jpg"), ("b.jpg", "b.jpg")]),
            NameLimits::default(),
        );
        assert!(plan.has_fatal_conflicts());
    }

    #[test]
    fn test_names_with_separators_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let source = dir.path().join("sub").join("a.txt");
        fs::write(&source, "a").unwrap();

        let mut plan = RenamePlan::from_names(
            vec![
                (source.clone(), "../escaped.txt".to_string()),
                (source.clone(), "x/y.txt".to_string()),
                (source.clone(), "..".to_string()),
                (source.clone(), "b.txt".to_string()),
            ],
            NameLimits::default(),
        );
        let statuses: Vec<_> = plan.entries().iter().map(|e| e.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                PlanStatus::Invalid(ValidationError::ReservedCharacter('/')),
                PlanStatus::Invalid(ValidationError::ReservedCharacter('/')),
                PlanStatus::Invalid(ValidationError::ReservedName("..".to_string())),
                PlanStatus::Ready,
            ]
        );
        assert_eq!(plan.entries()[3].target, dir.path().join("sub").join("b.txt"));
        assert!(!plan.has_fatal_conflicts());

        // Survives a refresh, cleared by an explicit retarget.
        plan.refresh();
        assert!(matches!(plan.entries()[0].status, PlanStatus::Invalid(_)));
        plan.retarget(0, &dir.path().join("sub").join("c.txt")).unwrap();
        assert_eq!(plan.entries()[0].status, PlanStatus::Ready);
    }

    #[test]
    fn test_paths_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RenamePlan::from_pairs(
            vec![(
                dir.path().join("sub").join("..").join("a.jpg"),
                dir.path().join(".").join("a.jpg"),
            )],
            NameLimits::default(),
        );
        assert_eq!(plan.entries()[0].status, PlanStatus::Unchanged);
        assert_eq!(plan.entries()[0].source, dir.path().join("a.jpg"));
    }
}
