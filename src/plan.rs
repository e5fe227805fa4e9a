//! Destination planning.
//!
//! Computes the initial target path of one candidate from the pattern's
//! `to`, its resolved [`ToType`] and `flatten`. Template targets are
//! returned verbatim; their tokens are interpolated once content is known.

use std::path::Path;

use crate::error::{CopyError, CopyResult};
use crate::utils::path::{basename, join_slash, normalize_slashes, relative_to, to_slash};
use crate::pattern::ToType;

/// Inputs of [`plan`] for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    /// The destination string, `None` when `to` was omitted.
    pub to: Option<&'a str>,
    pub to_type: ToType,
    /// Source path relative to the pattern context.
    pub relative_from: &'a str,
    pub flatten: bool,
    pub output_path: Option<&'a Path>,
}

/// Compute the initial destination of a candidate.
pub fn plan(input: PlanInput<'_>) -> CopyResult<String> {
    let relative_from = if input.flatten {
        basename(input.relative_from)
    } else {
        input.relative_from
    };
    let to = input.to.unwrap_or("");

    let target = match input.to_type {
        ToType::Dir => join_target(to, relative_from),
        ToType::File if to.is_empty() => basename(relative_from).to_string(),
        ToType::File | ToType::Template => to.to_string(),
    };

    let target = relativize(&target, input.output_path)?;
    if input.to_type == ToType::Template {
        // Escaped tokens carry backslashes; normalized after interpolation
        return Ok(target);
    }
    Ok(normalize_slashes(&target))
}

/// `to/relative_from`, keeping an absolute `to` absolute.
fn join_target(to: &str, relative_from: &str) -> String {
    if is_absolute(to) {
        format!("{}/{}", to.trim_end_matches(['/', '\\']), relative_from)
    } else {
        join_slash(to, relative_from)
    }
}

/// Absolute destinations become relative to the output root.
pub(crate) fn relativize(target: &str, output_path: Option<&Path>) -> CopyResult<String> {
    if !is_absolute(target) {
        return Ok(target.to_string());
    }
    match output_path {
        Some(output) => Ok(to_slash(&relative_to(Path::new(target), output))),
        None => Err(CopyError::OutputPath {
            to: target.to_string(),
        }),
    }
}

#[inline]
fn is_absolute(target: &str) -> bool {
    Path::new(target).is_absolute() || target.starts_with('/')
}
