//! # shep-policy
//!
//! Filesystem-scope policy enforcement for the Shepherd daemon.
//!
//! After every agent invocation the shepherd checks the paths the agent
//! reported as changed. A change is forbidden when it lands under the
//! design directory, under the state directory, or anywhere outside the
//! project root. The check is a pure function: no filesystem access, no
//! mutation — reported paths need not exist (the agent may have deleted
//! them), so resolution is purely lexical.

pub mod error;

pub use error::PolicyError;

use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// Check agent-reported changed paths against the forbidden zones.
///
/// `files_changed` is the raw JSON value from the agent result: absent is
/// treated as no changes, anything other than an array of strings is a
/// violation in itself. Offending entries are reported sorted, all in one
/// message.
pub fn check_files_changed(
    files_changed: Option<&Value>,
    project_root: &Path,
    design_dir: &Path,
    state_dir: &Path,
) -> Result<(), PolicyError> {
    let entries = match files_changed {
        None => return Ok(()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(PolicyError::NotAList),
    };

    let mut forbidden: Vec<String> = Vec::new();
    for entry in entries {
        let text = entry.as_str().ok_or(PolicyError::NonStringEntry)?;
        let resolved = resolve_path(project_root, text);
        if resolved.starts_with(design_dir)
            || resolved.starts_with(state_dir)
            || !resolved.starts_with(project_root)
        {
            forbidden.push(text.to_string());
        }
    }

    if forbidden.is_empty() {
        return Ok(());
    }
    forbidden.sort_unstable();
    Err(PolicyError::ForbiddenChanges {
        paths: forbidden.join(", "),
    })
}

/// Anchor a reported path at the project root (relative entries only) and
/// fold `.`/`..` components lexically.
pub fn resolve_path(project_root: &Path, entry: &str) -> PathBuf {
    let candidate = Path::new(entry);
    let anchored = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        project_root.join(candidate)
    };
    normalize_lexically(&anchored)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Zones {
        root: PathBuf,
        design: PathBuf,
        state: PathBuf,
    }

    fn zones() -> Zones {
        let root = PathBuf::from("/work/project");
        Zones {
            design: root.join("design"),
            state: root.join("ai"),
            root,
        }
    }

    fn check(z: &Zones, value: &Value) -> Result<(), PolicyError> {
        check_files_changed(Some(value), &z.root, &z.design, &z.state)
    }

    #[test]
    fn ordinary_source_changes_pass() {
        let z = zones();
        check(&z, &json!(["src/main.rs", "./README.md", "tests/loop.rs"])).unwrap();
    }

    #[test]
    fn absent_files_changed_passes() {
        let z = zones();
        check_files_changed(None, &z.root, &z.design, &z.state).unwrap();
    }

    #[test]
    fn design_dir_changes_are_forbidden() {
        let z = zones();
        let err = check(&z, &json!(["design/spec.md"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "forbidden files modified: design/spec.md"
        );
    }

    #[test]
    fn state_dir_changes_are_forbidden() {
        let z = zones();
        assert!(check(&z, &json!(["ai/PLAN.yaml"])).is_err());
    }

    #[test]
    fn escapes_via_dotdot_are_forbidden() {
        let z = zones();
        assert!(check(&z, &json!(["src/../../outside.txt"])).is_err());
    }

    #[test]
    fn dotdot_back_into_state_dir_is_forbidden() {
        let z = zones();
        assert!(check(&z, &json!(["src/../ai/PLAN.yaml"])).is_err());
    }

    #[test]
    fn absolute_paths_outside_root_are_forbidden() {
        let z = zones();
        assert!(check(&z, &json!(["/etc/passwd"])).is_err());
    }

    #[test]
    fn absolute_paths_inside_root_pass() {
        let z = zones();
        check(&z, &json!(["/work/project/src/lib.rs"])).unwrap();
    }

    #[test]
    fn non_string_entry_is_a_violation() {
        let z = zones();
        let err = check(&z, &json!(["src/ok.rs", 42])).unwrap_err();
        assert!(matches!(err, PolicyError::NonStringEntry));
    }

    #[test]
    fn non_list_files_changed_is_a_violation() {
        let z = zones();
        let err = check(&z, &json!("src/main.rs")).unwrap_err();
        assert!(matches!(err, PolicyError::NotAList));
    }

    #[test]
    fn offenders_are_reported_sorted() {
        let z = zones();
        let err = check(&z, &json!(["design/z.md", "ai/a.yaml", "src/ok.rs"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "forbidden files modified: ai/a.yaml, design/z.md"
        );
    }
}
