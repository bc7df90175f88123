//! Naming transforms and the ordered pipeline that applies them.

use crate::error::Error;
use crate::model::{FileEntry, HashAlgorithm, HashEntry, MetadataEntry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A file name split at its last dot. Transforms edit the stem; the extension
/// is carried through unless a transform says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub stem: String,
    pub extension: Option<String>,
}

impl NameParts {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        NameParts::from_name(&name)
    }

    pub fn from_name(name: &str) -> Self {
        match name.rfind('.') {
            // A leading dot marks a hidden file, not an extension.
            Some(idx) if idx > 0 => NameParts {
                stem: name[..idx].to_string(),
                extension: Some(name[idx + 1..].to_string()),
            },
            _ => NameParts {
                stem: name.to_string(),
                extension: None,
            },
        }
    }

    pub fn to_file_name(&self) -> String {
        match &self.extension {
            Some(ext) if !ext.is_empty() => format!("{}.{}", self.stem, ext),
            _ => self.stem.clone(),
        }
    }
}

/// Everything a transform may read about the file being renamed.
pub struct TransformContext<'a> {
    pub file: &'a FileEntry,
    /// Position of the file in the selection.
    pub index: usize,
    pub total: usize,
    pub metadata: Option<&'a MetadataEntry>,
    /// One entry per algorithm the pipeline asked for.
    pub hashes: &'a [HashEntry],
}

impl TransformContext<'_> {
    pub fn hash(&self, algorithm: HashAlgorithm) -> Option<&HashEntry> {
        self.hashes.iter().find(|h| h.algorithm == algorithm)
    }
}

pub trait NameTransform: Send + Sync {
    fn apply(&self, name: NameParts, ctx: &TransformContext<'_>) -> NameParts;

    fn needs_metadata(&self) -> bool {
        false
    }

    /// Whether the basic field set is not enough.
    fn needs_extended_metadata(&self) -> bool {
        false
    }

    fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        None
    }

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Prefix,
    #[default]
    Suffix,
    /// Replace the whole stem.
    Replace,
}

impl Position {
    fn place(&self, stem: &str, text: &str, separator: &str) -> String {
        match self {
            Position::Prefix => format!("{}{}{}", text, separator, stem),
            Position::Suffix => format!("{}{}{}", stem, separator, text),
            Position::Replace => text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    Lower,
    Upper,
    Title,
}

#[derive(Debug, Clone)]
pub struct SetName {
    pub text: String,
}

impl NameTransform for SetName {
    fn apply(&self, name: NameParts, _ctx: &TransformContext<'_>) -> NameParts {
        NameParts {
            stem: self.text.clone(),
            ..name
        }
    }

    fn describe(&self) -> String {
        format!("set name to '{}'", self.text)
    }
}

#[derive(Debug, Clone)]
pub struct AddText {
    pub text: String,
    pub position: Position,
}

impl NameTransform for AddText {
    fn apply(&self, name: NameParts, _ctx: &TransformContext<'_>) -> NameParts {
        NameParts {
            stem: self.position.place(&name.stem, &self.text, ""),
            ..name
        }
    }

    fn describe(&self) -> String {
        format!("add '{}' ({:?})", self.text, self.position)
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceText {
    pub pattern: Regex,
    pub replacement: String,
}

impl ReplaceText {
    pub fn new(pattern: &str, replacement: &str, literal: bool) -> Result<Self, Error> {
        let pattern = if literal {
            Regex::new(&regex::escape(pattern))?
        } else {
            Regex::new(pattern)?
        };
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }
}

impl NameTransform for ReplaceText {
    fn apply(&self, name: NameParts, _ctx: &TransformContext<'_>) -> NameParts {
        let stem = self
            .pattern
            .replace_all(&name.stem, self.replacement.as_str())
            .into_owned();
        NameParts { stem, ..name }
    }

    fn describe(&self) -> String {
        format!("replace /{}/ with '{}'", self.pattern, self.replacement)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeCase {
    pub mode: CaseMode,
    pub include_extension: bool,
}

fn convert_case(text: &str, mode: CaseMode) -> String {
    match mode {
        CaseMode::Lower => text.to_lowercase(),
        CaseMode::Upper => text.to_uppercase(),
        CaseMode::Title => {
            let mut out = String::with_capacity(text.len());
            let mut at_word_start = true;
            for c in text.chars() {
                if c.is_whitespace() || c == '_' || c == '-' {
                    at_word_start = true;
                    out.push(c);
                } else if at_word_start {
                    out.extend(c.to_uppercase());
                    at_word_start = false;
                } else {
                    out.extend(c.to_lowercase());
                }
            }
            out
        }
    }
}

impl NameTransform for ChangeCase {
    fn apply(&self, name: NameParts, _ctx: &TransformContext<'_>) -> NameParts {
        let extension = match (self.include_extension, self.mode) {
            (false, _) => name.extension,
            // Extensions have no words to title-case.
            (true, CaseMode::Title) => name.extension.map(|ext| ext.to_lowercase()),
            (true, mode) => name.extension.map(|ext| convert_case(&ext, mode)),
        };
        NameParts {
            stem: convert_case(&name.stem, self.mode),
            extension,
        }
    }

    fn describe(&self) -> String {
        format!("change case to {:?}", self.mode)
    }
}

#[derive(Debug, Clone)]
pub struct Counter {
    pub start: i64,
    pub step: i64,
    pub padding: usize,
    pub separator: String,
    pub position: Position,
}

impl NameTransform for Counter {
    fn apply(&self, name: NameParts, ctx: &TransformContext<'_>) -> NameParts {
        // Widened so user-supplied start/step never overflow.
        let value = (ctx.index as i128)
            .checked_mul(i128::from(self.step))
            .and_then(|offset| offset.checked_add(i128::from(self.start)))
            .unwrap_or(if self.step < 0 { i128::MIN } else { i128::MAX });
        let text = if value < 0 {
            format!("-{:0width$}", value.unsigned_abs(), width = self.padding)
        } else {
            format!("{:0width$}", value, width = self.padding)
        };
        NameParts {
            stem: self.position.place(&name.stem, &text, &self.separator),
            ..name
        }
    }

    fn describe(&self) -> String {
        format!("counter from {} step {}", self.start, self.step)
    }
}

#[derive(Debug, Clone)]
pub struct MetadataField {
    pub key: String,
    pub fallback: String,
    pub extended: bool,
    pub separator: String,
    pub position: Position,
}

impl NameTransform for MetadataField {
    fn apply(&self, name: NameParts, ctx: &TransformContext<'_>) -> NameParts {
        let value = ctx
            .metadata
            .and_then(|m| m.get(&self.key))
            .unwrap_or(&self.fallback);
        NameParts {
            stem: self.position.place(&name.stem, value, &self.separator),
            ..name
        }
    }

    fn needs_metadata(&self) -> bool {
        true
    }

    fn needs_extended_metadata(&self) -> bool {
        self.extended
    }

    fn describe(&self) -> String {
        format!("metadata field '{}'", self.key)
    }
}

#[derive(Debug, Clone)]
pub struct HashValue {
    pub algorithm: HashAlgorithm,
    /// Leading hex characters kept; 0 keeps the whole digest.
    pub length: usize,
    pub separator: String,
    pub position: Position,
}

impl NameTransform for HashValue {
    fn apply(&self, name: NameParts, ctx: &TransformContext<'_>) -> NameParts {
        let digest = ctx
            .hash(self.algorithm)
            .map(|h| h.value.as_str())
            .unwrap_or("nohash");
        let text = match self.length {
            0 => digest,
            n => &digest[..n.min(digest.len())],
        };
        NameParts {
            stem: self.position.place(&name.stem, text, &self.separator),
            ..name
        }
    }

    fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        Some(self.algorithm)
    }

    fn describe(&self) -> String {
        format!("{} hash", self.algorithm)
    }
}

/// Ordered list of transforms applied to every selected file.
#[derive(Default)]
pub struct Pipeline {
    transforms: Vec<Box<dyn NameTransform>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.transforms.iter().map(|t| t.describe()))
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transform: impl NameTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn push(&mut self, transform: Box<dyn NameTransform>) {
        self.transforms.push(transform);
    }

    pub fn from_specs(specs: &[TransformSpec]) -> Result<Self, Error> {
        let mut pipeline = Pipeline::new();
        for spec in specs {
            pipeline.push(spec.build()?);
        }
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn needs_metadata(&self) -> bool {
        self.transforms.iter().any(|t| t.needs_metadata())
    }

    pub fn needs_extended_metadata(&self) -> bool {
        self.transforms.iter().any(|t| t.needs_extended_metadata())
    }

    pub fn hash_algorithms(&self) -> Vec<HashAlgorithm> {
        let mut algorithms: Vec<HashAlgorithm> = Vec::new();
        for algorithm in self.transforms.iter().filter_map(|t| t.hash_algorithm()) {
            if !algorithms.contains(&algorithm) {
                algorithms.push(algorithm);
            }
        }
        algorithms
    }

    /// Run every transform in order over the file's current name.
    pub fn apply(&self, ctx: &TransformContext<'_>) -> NameParts {
        self.transforms
            .iter()
            .fold(NameParts::from_path(&ctx.file.path), |name, t| t.apply(name, ctx))
    }
}

fn default_one() -> i64 {
    1
}

fn default_separator() -> String {
    "_".to_string()
}

/// Serializable description of a transform, as found in pipeline files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSpec {
    SetName {
        text: String,
    },
    AddText {
        text: String,
        #[serde(default)]
        position: Position,
    },
    Replace {
        pattern: String,
        #[serde(default)]
        replacement: String,
        #[serde(default)]
        literal: bool,
    },
    ChangeCase {
        mode: CaseMode,
        #[serde(default)]
        include_extension: bool,
    },
    Counter {
        #[serde(default = "default_one")]
        start: i64,
        #[serde(default = "default_one")]
        step: i64,
        #[serde(default)]
        padding: usize,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        position: Position,
    },
    MetadataField {
        key: String,
        #[serde(default)]
        fallback: String,
        #[serde(default)]
        extended: bool,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        position: Position,
    },
    HashValue {
        #[serde(default)]
        algorithm: HashAlgorithm,
        #[serde(default)]
        length: usize,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        position: Position,
    },
}

impl TransformSpec {
    pub fn build(&self) -> Result<Box<dyn NameTransform>, Error> {
        let transform: Box<dyn NameTransform> = match self.clone() {
            TransformSpec::SetName { text } => Box::new(SetName { text }),
            TransformSpec::AddText { text, position } => Box::new(AddText { text, position }),
            TransformSpec::Replace {
                pattern,
                replacement,
                literal,
            } => Box::new(ReplaceText::new(&pattern, &replacement, literal)?),
            TransformSpec::ChangeCase {
                mode,
                include_extension,
            } => Box::new(ChangeCase {
                mode,
                include_extension,
            }),
            TransformSpec::Counter {
                start,
                step,
                padding,
                separator,
                position,
            } => Box::new(Counter {
                start,
                step,
                padding,
                separator,
                position,
            }),
            TransformSpec::MetadataField {
                key,
                fallback,
                extended,
                separator,
                position,
            } => Box::new(MetadataField {
                key,
                fallback,
                extended,
                separator,
                position,
            }),
            TransformSpec::HashValue {
                algorithm,
                length,
                separator,
                position,
            } => Box::new(HashValue {
                algorithm,
                length,
                separator,
                position,
            }),
        };
        Ok(transform)
    }
}
