use std::path::Path;

use anyhow::Context;
use dernek_domain::workflow::TransitionTable;

/// Reads a transition table from JSON (`{"rules": [...]}`) and validates it.
pub fn load_transition_table(path: impl AsRef<Path>) -> anyhow::Result<TransitionTable> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow table {}", path.display()))?;
    parse_transition_table(&raw)
        .with_context(|| format!("invalid workflow table {}", path.display()))
}

pub fn parse_transition_table(raw: &str) -> anyhow::Result<TransitionTable> {
    let table: TransitionTable = serde_json::from_str(raw)?;
    table.validate()?;
    Ok(table)
}

/// The configured table, or the built-in one when no path is set.
pub fn resolve_transition_table(path: Option<&str>) -> anyhow::Result<TransitionTable> {
    match path {
        Some(path) => {
            let table = load_transition_table(path)?;
            tracing::info!(path, rules = table.rules().len(), "loaded workflow table");
            Ok(table)
        }
        None => Ok(TransitionTable::standard()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_custom_table() {
        let table = parse_transition_table(
            r#"{"rules":[
                {"from":"draft","action":"submit","to":"submitted","allowed_roles":["user"]},
                {"from":"rejected","action":"reopen","to":"under_review","allowed_roles":["admin"],"requires_note":true}
            ]}"#,
        )
        .expect("table");
        assert_eq!(table.rules().len(), 2);
        assert!(table.rules()[1].requires_note);
    }

    #[test]
    fn rejects_duplicate_edges() {
        let err = parse_transition_table(
            r#"{"rules":[
                {"from":"draft","action":"submit","to":"submitted","allowed_roles":["user"]},
                {"from":"draft","action":"submit","to":"submitted","allowed_roles":["admin"]}
            ]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_transition_table("/nonexistent/workflow.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/workflow.json"));
    }

    #[test]
    fn no_path_means_builtin_table() {
        let table = resolve_transition_table(None).expect("table");
        assert_eq!(table, TransitionTable::standard());
    }
}
