//! 診断を JSON に変換するレンダリング層。

use serde_json::{json, Map, Value};

use super::{Diagnostic, DiagnosticNote, DiagnosticSet};

const SCHEMA_VERSION: &str = "1.0.0";

/// ソースの行・列インデクスを保持する軽量型。
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (idx, ch) in source.char_indices() {
            if ch == '\n' {
                starts.push(idx + ch.len_utf8());
            }
        }
        Self {
            starts,
            len: source.len(),
        }
    }

    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let clamped = offset.min(self.len);
        let idx = match self.starts.binary_search(&clamped) {
            Ok(pos) => pos,
            Err(pos) => pos.saturating_sub(1),
        };
        let line_start = self.starts[idx];
        (
            idx as u32 + 1,
            (clamped.saturating_sub(line_start)) as u32 + 1,
        )
    }
}

fn location_value(start: u32, end: u32, line_index: Option<&LineIndex>) -> Value {
    let mut location = Map::new();
    location.insert("start".to_string(), json!(start));
    location.insert("end".to_string(), json!(end));
    if let Some(index) = line_index {
        let (line, col) = index.line_col(start as usize);
        location.insert("line".to_string(), json!(line));
        location.insert("column".to_string(), json!(col));
    }
    Value::Object(location)
}

fn note_value(note: &DiagnosticNote, line_index: Option<&LineIndex>) -> Value {
    let mut value = Map::new();
    value.insert("message".to_string(), json!(note.message));
    if let Some(site) = note.site {
        value.insert(
            "location".to_string(),
            location_value(site.start, site.end, line_index),
        );
    }
    Value::Object(value)
}

/// 1 件の診断をスキーマ準拠の JSON オブジェクトに組み立てる。
pub fn diagnostic_value(diagnostic: &Diagnostic, line_index: Option<&LineIndex>) -> Value {
    let args: Map<String, Value> = diagnostic
        .args
        .iter()
        .map(|(key, value)| (key.to_string(), json!(value)))
        .collect();
    json!({
        "code": diagnostic.code.as_str(),
        "severity": diagnostic.severity.as_str(),
        "message": diagnostic.render(),
        "args": Value::Object(args),
        "location": location_value(diagnostic.site.start, diagnostic.site.end, line_index),
        "notes": diagnostic
            .notes
            .iter()
            .map(|note| note_value(note, line_index))
            .collect::<Vec<_>>(),
    })
}

/// 診断集合全体を JSON 配列にする。`source` を渡すと行・列情報が付く。
pub fn render_diagnostics(diagnostics: &DiagnosticSet, source: Option<&str>) -> Value {
    let line_index = source.map(LineIndex::new);
    json!({
        "schema_version": SCHEMA_VERSION,
        "diagnostics": diagnostics
            .iter()
            .map(|diagnostic| diagnostic_value(diagnostic, line_index.as_ref()))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Diagnostic, DiagnosticCode};
    use crate::span::Span;

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new("ab\ncd\nef");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(3), (2, 1));
        assert_eq!(index.line_col(7), (3, 2));
    }

    #[test]
    fn rendered_payload_carries_stable_code() {
        let mut set = DiagnosticSet::new();
        set.insert(
            Diagnostic::new(DiagnosticCode::UndefinedName, Span::new(3, 4)).with_arg("name", "x"),
        );
        let value = render_diagnostics(&set, Some("let x\n"));
        let first = &value["diagnostics"][0];
        assert_eq!(first["code"], "sema.lookup.undefined_name");
        assert_eq!(first["location"]["line"], 1);
    }
}
