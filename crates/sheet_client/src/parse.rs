//! CSV parsing for fetched documents.
//!
//! Handles RFC-4180 quoting (embedded commas, `""` escapes, newlines
//! inside quoted fields) and CRLF line endings. The first record is the
//! header row; data rows are padded or truncated to the header width so
//! every row the dashboard renders has the same shape.

use common::SheetSnapshot;

use crate::error::{FetchError, Result};

/// Parse a CSV document into a snapshot.
///
/// Returns [`FetchError::EmptyDocument`] when no header row is present.
pub fn parse_csv(input: &str) -> Result<SheetSnapshot> {
    let mut records = split_records(input);
    if records.is_empty() {
        return Err(FetchError::EmptyDocument);
    }

    let headers = records.remove(0);
    if headers.iter().all(|h| h.is_empty()) {
        return Err(FetchError::EmptyDocument);
    }

    let width = headers.len();
    let rows = records
        .into_iter()
        .filter(|r| !(r.len() == 1 && r[0].is_empty()))
        .map(|mut r| {
            r.resize(width, String::new());
            r
        })
        .collect();

    Ok(SheetSnapshot { headers, rows })
}

/// Split a CSV document into records of fields.
fn split_records(input: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    // Trailing record without a final newline.
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rows() {
        let snap = parse_csv("name,age\nalice,30\nbob,41\n").unwrap();
        assert_eq!(snap.headers, vec!["name", "age"]);
        assert_eq!(snap.rows.len(), 2);
        assert_eq!(snap.rows[0], vec!["alice", "30"]);
        assert_eq!(snap.rows[1], vec!["bob", "41"]);
    }

    #[test]
    fn quoted_fields() {
        let snap = parse_csv("title,note\n\"a, b\",\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(snap.rows[0], vec!["a, b", "say \"hi\""]);
    }

    #[test]
    fn newline_inside_quotes() {
        let snap = parse_csv("k,v\n\"line1\nline2\",x\n").unwrap();
        assert_eq!(snap.rows[0][0], "line1\nline2");
    }

    #[test]
    fn crlf_endings() {
        let snap = parse_csv("a,b\r\n1,2\r\n").unwrap();
        assert_eq!(snap.headers, vec!["a", "b"]);
        assert_eq!(snap.rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn short_rows_padded_to_header_width() {
        let snap = parse_csv("a,b,c\n1\n2,3\n").unwrap();
        assert_eq!(snap.rows[0], vec!["1", "", ""]);
        assert_eq!(snap.rows[1], vec!["2", "3", ""]);
    }

    #[test]
    fn missing_trailing_newline() {
        let snap = parse_csv("a,b\n1,2").unwrap();
        assert_eq!(snap.rows, vec![vec!["1", "2"]]);
    }

    #[test]
    fn blank_lines_skipped() {
        let snap = parse_csv("a,b\n1,2\n\n3,4\n").unwrap();
        assert_eq!(snap.rows.len(), 2);
    }

    #[test]
    fn empty_document_rejected() {
        assert!(parse_csv("").is_err());
        assert!(parse_csv("\n").is_err());
    }
}
