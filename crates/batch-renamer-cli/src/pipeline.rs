use crate::commands::{CaseArg, SelectionArgs};
use anyhow::{bail, Context, Result};
use batch_renamer_core::rename::transform::{CaseMode, Position, TransformSpec};
use batch_renamer_core::Pipeline;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// On-disk pipeline description:
///
/// ```toml
/// [[transforms]]
/// kind = "replace"
/// pattern = "\\s+"
/// replacement = "_"
/// ```
#[derive(Debug, Deserialize)]
pub struct PipelineFile {
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

pub fn load_pipeline_file(path: &Path) -> Result<Vec<TransformSpec>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
    let file: PipelineFile = toml::from_str(&text)
        .with_context(|| format!("Invalid pipeline file {}", path.display()))?;
    Ok(file.transforms)
}

/// Transforms named by inline options, in application order.
pub fn inline_specs(args: &SelectionArgs) -> Vec<TransformSpec> {
    let mut specs = Vec::new();
    if let Some(text) = &args.set_name {
        specs.push(TransformSpec::SetName { text: text.clone() });
    }
    if let Some([pattern, replacement]) = args.replace.as_deref() {
        specs.push(TransformSpec::Replace {
            pattern: pattern.clone(),
            replacement: replacement.clone(),
            literal: false,
        });
    }
    if let Some(case) = args.case {
        let mode = match case {
            CaseArg::Lower => CaseMode::Lower,
            CaseArg::Upper => CaseMode::Upper,
            CaseArg::Title => CaseMode::Title,
        };
        specs.push(TransformSpec::ChangeCase {
            mode,
            include_extension: false,
        });
    }
    if let Some(text) = &args.prefix {
        specs.push(TransformSpec::AddText {
            text: text.clone(),
            position: Position::Prefix,
        });
    }
    if let Some(text) = &args.suffix {
        specs.push(TransformSpec::AddText {
            text: text.clone(),
            position: Position::Suffix,
        });
    }
    if args.counter {
        specs.push(TransformSpec::Counter {
            start: args.counter_start,
            step: 1,
            padding: args.counter_padding,
            separator: "_".to_string(),
            position: Position::Suffix,
        });
    }
    specs
}

pub fn build_pipeline(args: &SelectionArgs) -> Result<Pipeline> {
    let mut specs = match &args.pipeline {
        Some(path) => load_pipeline_file(path)?,
        None => Vec::new(),
    };
    specs.extend(inline_specs(args));
    if specs.is_empty() {
        bail!("No transforms given; use --pipeline or one of the inline options");
    }
    Ok(Pipeline::from_specs(&specs)?)
}
