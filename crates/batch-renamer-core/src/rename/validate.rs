//! Portable filename legality. The rules are the union of what Windows,
//! macOS and Linux reject, so a plan valid here is valid on any of them.

use crate::error::ValidationError;
use std::path::Path;

const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameLimits {
    /// Bytes in a single file name.
    pub max_name_length: usize,
    /// Bytes in the full target path.
    pub max_path_length: usize,
}

impl Default for NameLimits {
    fn default() -> Self {
        Self {
            max_name_length: 255,
            max_path_length: 4096,
        }
    }
}

pub fn validate_file_name(name: &str, limits: &NameLimits) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if name == "." || name == ".." {
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    if let Some(c) = name.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(ValidationError::ReservedCharacter(c));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacter);
    }
    if name.ends_with(' ') || name.ends_with('.') {
        return Err(ValidationError::TrailingDotOrSpace);
    }

    // Device names are reserved with or without an extension ("nul.txt").
    let base = name.split('.').next().unwrap_or(name).trim_end();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
    {
        return Err(ValidationError::ReservedName(name.to_string()));
    }

    if name.len() > limits.max_name_length {
        return Err(ValidationError::NameTooLong {
            len: name.len(),
            max: limits.max_name_length,
        });
    }
    Ok(())
}

/// Validate the final component of `target` and the full path length.
pub fn validate_target(target: &Path, limits: &NameLimits) -> Result<(), ValidationError> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    validate_file_name(&name, limits)?;

    let len = target.as_os_str().len();
    if len > limits.max_path_length {
        return Err(ValidationError::PathTooLong {
            len,
            max: limits.max_path_length,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn check(name: &str) -> Result<(), ValidationError> {
        validate_file_name(name, &NameLimits::default())
    }

    #[test]
    fn test_accepts_ordinary_names() {
        for name in ["a.jpg", "IMG_0001.JPG", ".hidden", "con tract.pdf", "résumé.txt", "nul-ish"] {
            assert_eq!(check(name), Ok(()), "{}", name);
        }
    }

    #[test]
    fn test_rejects_reserved_characters() {
        assert_eq!(check("a:b.txt"), Err(ValidationError::ReservedCharacter(':')));
        assert_eq!(check("what?.txt"), Err(ValidationError::ReservedCharacter('?')));
        assert_eq!(check("dir/file"), Err(ValidationError::ReservedCharacter('/')));
        assert_eq!(check("tab\there"), Err(ValidationError::ControlCharacter));
    }

    #[test]
    fn test_rejects_reserved_names_and_empties() {
        assert!(matches!(check("CON"), Err(ValidationError::ReservedName(_))));
        assert!(matches!(check("nul.txt"), Err(ValidationError::ReservedName(_))));
        assert!(matches!(check("Lpt3.log"), Err(ValidationError::ReservedName(_))));
        assert!(matches!(check(".."), Err(ValidationError::ReservedName(_))));
        assert_eq!(check(""), Err(ValidationError::Empty));
        assert_eq!(check("   "), Err(ValidationError::Empty));
        assert_eq!(check("name."), Err(ValidationError::TrailingDotOrSpace));
        assert_eq!(check("name "), Err(ValidationError::TrailingDotOrSpace));
    }

    #[test]
    fn test_length_limits() {
        let limits = NameLimits {
            max_name_length: 10,
            max_path_length: 20,
        };
        assert_eq!(
            validate_file_name("abcdefghijk", &limits),
            Err(ValidationError::NameTooLong { len: 11, max: 10 })
        );
        let long_dir: PathBuf = ["/", "aaaaaaaaaa", "bbbbbbbbbb", "c.txt"].iter().collect();
        assert!(matches!(
            validate_target(&long_dir, &limits),
            Err(ValidationError::PathTooLong { .. })
        ));
        assert_eq!(validate_target(Path::new("/tmp/c.txt"), &limits), Ok(()));
    }
}
