//! Line-delimited JSON parser.

use super::{ParseError, ParseResult, RecordLocation, source_size};
use crate::models::Bead;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Parse a JSONL file, one bead per non-blank line.
pub fn parse_jsonl(path: &Path) -> Result<ParseResult> {
    let file = File::open(path).map_err(|source| Error::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let file_size = source_size(path)?;

    let result = parse_reader(BufReader::new(file), file_size)?;
    tracing::debug!(
        path = %path.display(),
        beads = result.beads.len(),
        errors = result.errors.len(),
        "parsed jsonl source"
    );
    Ok(result)
}

/// Parse JSONL records from any reader.
pub fn parse_reader<R: Read>(reader: BufReader<R>, file_size: u64) -> Result<ParseResult> {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let location = RecordLocation::Line(idx + 1);
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        match parse_line(trimmed) {
            Ok(bead) => records.push((location, bead)),
            Err(message) => {
                tracing::debug!(%location, %message, "skipping malformed record");
                errors.push(ParseError::new(location, message));
            }
        }
    }

    Ok(ParseResult::from_records(records, errors, file_size))
}

fn parse_line(line: &[u8]) -> std::result::Result<Bead, String> {
    let mut bead: Bead =
        serde_json::from_slice(line).map_err(|e| format!("invalid JSON: {}", e))?;

    if bead.id.trim().is_empty() {
        return Err("bead missing required field 'id'".to_string());
    }
    if bead.title.trim().is_empty() {
        return Err("bead missing required field 'title'".to_string());
    }

    bead.derive_relations();
    Ok(bead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DependencyType, Status};
    use std::io::Cursor;

    fn parse_str(input: &str) -> ParseResult {
        parse_reader(BufReader::new(Cursor::new(input.to_string())), input.len() as u64).unwrap()
    }

    #[test]
    fn test_parse_valid_lines() {
        let result = parse_str(concat!(
            r#"{"id":"bd-1","title":"Epic","issue_type":"epic","priority":1}"#,
            "\n",
            r#"{"id":"bd-1.1","title":"Child","labels":["ui","api"]}"#,
            "\n"
        ));

        assert!(result.errors.is_empty());
        assert_eq!(result.beads.len(), 2);
        assert_eq!(result.beads[1].parent_id.as_deref(), Some("bd-1"));
        assert_eq!(result.beads[1].labels, vec!["ui", "api"]);
        assert_eq!(result.beads[0].parent_id, None);
    }

    #[test]
    fn test_blank_lines_skipped_but_counted() {
        let result = parse_str("\n   \n{not json}\n");
        assert!(result.beads.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].location, RecordLocation::Line(3));
        assert!(result.errors[0].message.starts_with("invalid JSON"));
    }

    #[test]
    fn test_missing_required_fields() {
        let result = parse_str(concat!(
            r#"{"title":"No id"}"#,
            "\n",
            r#"{"id":"bd-2"}"#,
            "\n",
            r#"{"id":"bd-3","title":"ok"}"#
        ));

        assert_eq!(result.beads.len(), 1);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].message.contains("'id'"));
        assert!(result.errors[1].message.contains("'title'"));
        assert_eq!(result.errors[1].location, RecordLocation::Line(2));
    }

    #[test]
    fn test_null_fields_read_as_defaults() {
        let result = parse_str(concat!(
            r#"{"id":"bd-1","title":"labels","labels":null}"#,
            "\n",
            r#"{"id":"bd-2","title":"deps","dependencies":null,"comments":null}"#,
            "\n",
            r#"{"id":"bd-3","title":"text","description":null,"notes":null,"status":null}"#,
            "\n",
            r#"{"id":"bd-4","title":"prio","priority":null,"issue_type":null,"created_at":null}"#,
            "\n",
        ));

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.beads.len(), 4);
        assert!(result.beads[0].labels.is_empty());
        assert!(result.beads[1].dependencies.is_empty());
        assert!(result.beads[1].comments.is_empty());
        assert_eq!(result.beads[2].description, "");
        assert_eq!(result.beads[2].status, Status::Open);
        assert_eq!(result.beads[3].priority, 0);
    }

    #[test]
    fn test_null_dependency_type_defaults() {
        let result = parse_str(
            r#"{"id":"bd-1","title":"t","dependencies":[{"issue_id":null,"depends_on_id":"bd-2","type":null,"created_at":null}]}"#,
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.beads[0].dependencies[0].kind, DependencyType::default());
    }

    #[test]
    fn test_tombstones_dropped() {
        let result = parse_str(concat!(
            r#"{"id":"bd-1","title":"gone","status":"tombstone"}"#,
            "\n",
            r#"{"id":"bd-2","title":"kept","status":"closed"}"#
        ));
        assert_eq!(result.beads.len(), 1);
        assert_eq!(result.beads[0].id, "bd-2");
        assert_eq!(result.beads[0].status, Status::Closed);
    }

    #[test]
    fn test_blocker_ids_from_dependencies() {
        let result = parse_str(
            r#"{"id":"bd-1","title":"t","dependencies":[{"issue_id":"bd-1","depends_on_id":"bd-2","type":"blocks","created_at":"2025-01-02T03:04:05Z"},{"issue_id":"bd-1","depends_on_id":"bd-3","type":"related"}]}"#,
        );
        let bead = &result.beads[0];
        assert_eq!(bead.dependencies.len(), 2);
        assert_eq!(bead.dependencies[1].kind, DependencyType::Related);
        assert_eq!(bead.blocker_ids, vec!["bd-2".to_string()]);
    }

    #[test]
    fn test_last_line_without_newline() {
        let result = parse_str(r#"{"id":"bd-1","title":"tail"}"#);
        assert_eq!(result.beads.len(), 1);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = parse_jsonl(&dir.path().join("missing.jsonl")).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[test]
    fn test_file_size_recorded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("issues.jsonl");
        let content = "{\"id\":\"bd-1\",\"title\":\"x\"}\n";
        std::fs::write(&path, content).unwrap();

        let result = parse_jsonl(&path).unwrap();
        assert_eq!(result.file_size, content.len() as u64);
        assert_eq!(result.beads.len(), 1);
    }
}
