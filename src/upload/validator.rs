//! Candidate validation: accept or reject against configured constraints.
//!
//! Pure functions: the caller emits the rejection event and keeps rejected
//! candidates out of the managed collection.

use crate::upload::types::{FileCandidate, RejectReason, UploadConstraints};
use glob::{MatchOptions, Pattern};

/// Validate a candidate. Rules run in order, first match wins:
/// file count, then file size, then accept pattern.
pub fn validate(
    candidate: &FileCandidate,
    current_file_count: usize,
    constraints: &UploadConstraints,
) -> Result<(), RejectReason> {
    if let Some(max) = constraints.max_file_count {
        if current_file_count >= max {
            return Err(RejectReason::TooManyFiles);
        }
    }
    if let Some(max) = constraints.max_file_size_bytes {
        if candidate.size_bytes > max {
            return Err(RejectReason::FileTooBig);
        }
    }
    if !constraints.accept.trim().is_empty()
        && !accept_matches(&constraints.accept, &candidate.mime_type, &candidate.name)
    {
        return Err(RejectReason::IncorrectFileType);
    }
    Ok(())
}

/// Whether the accept pattern matches the candidate's MIME type or its
/// full multi-dot extension (the suffix from the first `.` of the name).
fn accept_matches(accept: &str, mime_type: &str, file_name: &str) -> bool {
    let extension = file_name.find('.').map(|i| &file_name[i..]);

    accept
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry.starts_with('.') {
                extension.is_some_and(|ext| ext.eq_ignore_ascii_case(entry))
            } else {
                mime_glob_matches(entry, mime_type)
            }
        })
}

fn mime_glob_matches(entry: &str, mime_type: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    match Pattern::new(entry) {
        Ok(pattern) => pattern.matches_with(mime_type, options),
        // Un-parseable entry: fall back to a literal comparison.
        Err(_) => entry.eq_ignore_ascii_case(mime_type),
    }
}
