use crate::error::TemplateError;

/// Normalize a template source path.
///
/// - Replaces backslashes with forward slashes
/// - Collapses redundant separators (`a///b` → `a/b`)
/// - Drops `.` segments
/// - Rejects `..` segments
/// - Strips leading and trailing slashes
///
/// Returns [`TemplateError::EmptySourcePath`] if nothing is left and
/// [`TemplateError::InvalidPath`] if the path contains `..`.
pub fn normalize_source_path(path: &str) -> Result<String, TemplateError> {
    let replaced = path.replace('\\', "/");
    let mut segments = Vec::new();

    for segment in replaced.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(TemplateError::InvalidPath(format!(
                "'{path}': path traversal (..) not allowed"
            )));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(TemplateError::EmptySourcePath);
    }

    Ok(segments.join("/"))
}

/// Whether `path` is relative: no leading separator and no drive prefix.
pub fn is_relative(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let bytes = path.as_bytes();
    !(bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_path() {
        assert_eq!(normalize_source_path("test/path").unwrap(), "test/path");
    }

    #[test]
    fn separators_and_dots() {
        assert_eq!(
            normalize_source_path("/levels\\\\./town//house.prefab/").unwrap(),
            "levels/town/house.prefab"
        );
    }

    #[test]
    fn reject_dotdot() {
        assert!(matches!(
            normalize_source_path("levels/../secret"),
            Err(TemplateError::InvalidPath(_))
        ));
    }

    #[test]
    fn reject_empty() {
        assert_eq!(normalize_source_path(""), Err(TemplateError::EmptySourcePath));
        assert_eq!(normalize_source_path("/./"), Err(TemplateError::EmptySourcePath));
    }

    #[test]
    fn relative_check() {
        assert!(is_relative("a/b"));
        assert!(!is_relative("/a/b"));
        assert!(!is_relative("C:/a"));
        assert!(!is_relative("\\\\server\\share"));
    }
}
