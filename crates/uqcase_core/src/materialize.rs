//! Case materialization: mirror the base case, then render its templates.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{MaterializeError, TemplateError};
use crate::space::{ParameterKey, ParameterSpace};
use crate::template::Template;

/// Build a fresh case directory at `target_dir` from `base_case_dir`.
///
/// Parameters are grouped by template file; each file is read from the base
/// case, rendered once with all of its parameters and written into the target.
pub fn materialize(
    base_case_dir: &Path,
    target_dir: &Path,
    parameters: &[(ParameterKey, f64)],
) -> Result<(), MaterializeError> {
    replicate_case(base_case_dir, target_dir)?;
    render_templates(base_case_dir, target_dir, parameters)?;
    tracing::debug!(
        target_dir = %target_dir.display(),
        parameters = parameters.len(),
        "materialized case"
    );
    Ok(())
}

/// Mirror `base` into `target`, replacing anything already at `target`.
///
/// Symlinks are recreated rather than followed and file permissions are kept.
pub fn replicate_case(base: &Path, target: &Path) -> Result<(), MaterializeError> {
    let replication = |message: String| MaterializeError::Replication {
        path: target.to_path_buf(),
        message,
    };

    let base_abs = std::path::absolute(base).map_err(|e| replication(e.to_string()))?;
    let base = fs::canonicalize(base)
        .map_err(|e| replication(format!("base case {} is not accessible: {e}", base.display())))?;
    if !base.is_dir() {
        return Err(replication(format!("base case {} is not a directory", base.display())));
    }
    let target_abs = std::path::absolute(target).map_err(|e| replication(e.to_string()))?;
    if target_abs.starts_with(&base) || target_abs.starts_with(&base_abs) {
        return Err(replication("target directory lies inside the base case".to_string()));
    }

    remove_existing(target)?;
    fs::create_dir_all(target).map_err(|source| MaterializeError::Io {
        path: target.to_path_buf(),
        source,
    })?;

    for entry in WalkDir::new(&base).follow_links(false) {
        let entry = entry.map_err(|e| replication(e.to_string()))?;
        let rel = match entry.path().strip_prefix(&base) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let dest = target.join(rel);
        let io_err = |source| MaterializeError::Io {
            path: dest.clone(),
            source,
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(io_err)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest).map_err(io_err)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(io_err)?;
        }
    }
    Ok(())
}

fn remove_existing(target: &Path) -> Result<(), MaterializeError> {
    let Ok(meta) = fs::symlink_metadata(target) else {
        return Ok(());
    };
    tracing::debug!(target_dir = %target.display(), "removing existing case directory");
    let removed = if meta.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    removed.map_err(|source| MaterializeError::Io {
        path: target.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> std::io::Result<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, dest)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &Path) -> std::io::Result<()> {
    // no portable symlink creation; copy the resolved file
    fs::copy(link, dest).map(|_| ())
}

/// Values grouped by the template file they belong to
fn group_by_template<'a, T: Copy>(
    entries: impl IntoIterator<Item = (&'a ParameterKey, T)>,
) -> BTreeMap<PathBuf, Vec<(&'a str, T)>> {
    let mut groups: BTreeMap<PathBuf, Vec<(&str, T)>> = BTreeMap::new();
    for (key, value) in entries {
        groups
            .entry(key.template_path())
            .or_default()
            .push((key.name(), value));
    }
    groups
}

fn read_template(base: &Path, rel: &Path) -> Result<Template, TemplateError> {
    let source = fs::read_to_string(base.join(rel)).map_err(|source| {
        TemplateError::MissingTemplate {
            file: rel.to_path_buf(),
            source,
        }
    })?;
    Template::parse(rel, &source)
}

/// Check that every template the space refers to exists in the base case and
/// holds a placeholder for each of its parameters. Returns the file count.
pub fn check_templates(base_case_dir: &Path, space: &ParameterSpace) -> Result<usize, TemplateError> {
    let groups = group_by_template(space.keys().map(|key| (key, ())));
    for (rel, names) in &groups {
        read_template(base_case_dir, rel)?.check_placeholders(names.iter().map(|(name, _)| *name))?;
        tracing::debug!(file = %rel.display(), placeholders = names.len(), "template checked");
    }
    Ok(groups.len())
}

fn render_templates(
    base: &Path,
    target: &Path,
    parameters: &[(ParameterKey, f64)],
) -> Result<(), MaterializeError> {
    let groups = group_by_template(parameters.iter().map(|(key, value)| (key, *value)));

    for (rel, values) in groups {
        let rendered = read_template(base, &rel)?.render(&values)?;

        let dest = target.join(&rel);
        let io_err = |source| MaterializeError::Io {
            path: dest.clone(),
            source,
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        // never write through a mirrored link into the base case
        if fs::symlink_metadata(&dest).is_ok_and(|m| m.file_type().is_symlink()) {
            fs::remove_file(&dest).map_err(io_err)?;
        }
        fs::write(&dest, rendered).map_err(io_err)?;
        tracing::trace!(file = %rel.display(), values = values.len(), "rendered template");
    }
    Ok(())
}
