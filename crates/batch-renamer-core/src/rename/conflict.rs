use crate::model::ConflictDecision;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Size and mtime (ns) of one side of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub modified: i64,
}

impl FileInfo {
    pub fn read(path: &Path) -> Option<FileInfo> {
        fs::metadata(path).ok().map(|m| FileInfo {
            size: m.len(),
            modified: paths::modified_nanos(&m),
        })
    }
}

/// What the prompt is shown when a target is already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub source: PathBuf,
    pub target: PathBuf,
    pub source_info: Option<FileInfo>,
    pub target_info: Option<FileInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptResponse {
    pub decision: ConflictDecision,
    /// Reuse `decision` for every later conflict in the batch.
    pub apply_to_all: bool,
}

impl PromptResponse {
    pub fn once(decision: ConflictDecision) -> Self {
        Self {
            decision,
            apply_to_all: false,
        }
    }

    pub fn for_all(decision: ConflictDecision) -> Self {
        Self {
            decision,
            apply_to_all: true,
        }
    }
}

/// The interactive half of conflict resolution, supplied by the caller.
/// `prompt` may block for as long as the user needs.
pub trait ConflictPrompt: Send {
    fn prompt(&mut self, conflict: &ConflictInfo) -> PromptResponse;
}

/// Answers every conflict the same way without asking.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub ConflictDecision);

impl ConflictPrompt for FixedPolicy {
    fn prompt(&mut self, _conflict: &ConflictInfo) -> PromptResponse {
        PromptResponse::for_all(self.0)
    }
}

/// Decides what happens when a rename target already exists, remembering an
/// "apply to all" answer until the next batch starts.
pub struct ConflictResolver {
    prompt: Box<dyn ConflictPrompt>,
    remembered: Option<ConflictDecision>,
}

impl ConflictResolver {
    pub fn new(prompt: impl ConflictPrompt + 'static) -> Self {
        Self {
            prompt: Box::new(prompt),
            remembered: None,
        }
    }

    pub fn fixed(decision: ConflictDecision) -> Self {
        Self::new(FixedPolicy(decision))
    }

    pub fn resolve(
        &mut self,
        source: &Path,
        target: &Path,
        target_info: Option<FileInfo>,
    ) -> ConflictDecision {
        if let Some(decision) = self.remembered {
            debug!("Reusing '{:?}' for {}", decision, target.display());
            return decision;
        }

        let conflict = ConflictInfo {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            source_info: FileInfo::read(source),
            target_info,
        };
        let response = self.prompt.prompt(&conflict);

        match response.decision {
            // Skip-all is a skip that sticks.
            ConflictDecision::SkipAll => {
                self.remembered = Some(ConflictDecision::Skip);
                ConflictDecision::Skip
            }
            ConflictDecision::Cancel => ConflictDecision::Cancel,
            decision => {
                if response.apply_to_all {
                    self.remembered = Some(decision);
                }
                decision
            }
        }
    }

    /// Decision currently applied without prompting, if any.
    pub fn remembered(&self) -> Option<ConflictDecision> {
        self.remembered
    }

    /// Forget any apply-to-all answer. Called at the start of every batch.
    pub fn reset(&mut self) {
        self.remembered = None;
    }
}

/// First free `stem (n).ext` next to `target`.
pub fn suffixed_target(target: &Path) -> PathBuf {
    let parent = target.parent().unwrap_or(Path::new(""));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target.extension().map(|s| s.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, counter, ext),
            None => format!("{} ({})", stem, counter),
        };
        let candidate = parent.join(name);
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        responses: Vec<PromptResponse>,
        calls: Arc<AtomicUsize>,
    }

    impl ConflictPrompt for Scripted {
        fn prompt(&mut self, _conflict: &ConflictInfo) -> PromptResponse {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses[n.min(self.responses.len() - 1)]
        }
    }

    fn resolver(responses: Vec<PromptResponse>) -> (ConflictResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = ConflictResolver::new(Scripted {
            responses,
            calls: calls.clone(),
        });
        (resolver, calls)
    }

    #[test]
    fn test_prompts_every_time_without_apply_to_all() {
        let (mut resolver, calls) = resolver(vec![
            PromptResponse::once(ConflictDecision::Overwrite),
            PromptResponse::once(ConflictDecision::Skip),
        ]);
        let (a, b) = (Path::new("/a"), Path::new("/b"));
        assert_eq!(resolver.resolve(a, b, None), ConflictDecision::Overwrite);
        assert_eq!(resolver.resolve(a, b, None), ConflictDecision::Skip);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_apply_to_all_until_reset() {
        let (mut resolver, calls) =
            resolver(vec![PromptResponse::for_all(ConflictDecision::RenameWithSuffix)]);
        let (a, b) = (Path::new("/a"), Path::new("/b"));
        for _ in 0..5 {
            assert_eq!(
                resolver.resolve(a, b, None),
                ConflictDecision::RenameWithSuffix
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        resolver.reset();
        assert_eq!(resolver.remembered(), None);
        resolver.resolve(a, b, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_skip_all_sticks() {
        let (mut resolver, calls) = resolver(vec![PromptResponse::once(ConflictDecision::SkipAll)]);
        let (a, b) = (Path::new("/a"), Path::new("/b"));
        assert_eq!(resolver.resolve(a, b, None), ConflictDecision::Skip);
        assert_eq!(resolver.resolve(a, b, None), ConflictDecision::Skip);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_is_never_remembered() {
        let (mut resolver, _) = resolver(vec![PromptResponse::for_all(ConflictDecision::Cancel)]);
        assert_eq!(
            resolver.resolve(Path::new("/a"), Path::new("/b"), None),
            ConflictDecision::Cancel
        );
        assert_eq!(resolver.remembered(), None);
    }

    #[test]
    fn test_suffixed_target_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("photo.jpg");
        fs::write(&target, "x").unwrap();
        assert_eq!(suffixed_target(&target), dir.path().join("photo (1).jpg"));

        fs::write(dir.path().join("photo (1).jpg"), "x").unwrap();
        assert_eq!(suffixed_target(&target), dir.path().join("photo (2).jpg"));

        let bare = dir.path().join("README");
        assert_eq!(suffixed_target(&bare), dir.path().join("README (1)"));
    }
}
