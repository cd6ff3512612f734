pub mod connectivity;

use serde_json::Value;

use crate::graphql::GraphQLResponse;

/// Print a GraphQL response. Root fields holding a list of objects render as an ASCII
/// table; everything else prints as pretty JSON. `GATEHOUSE_OUTPUT=json` forces JSON.
pub fn print_response(resp: &GraphQLResponse) {
    for e in &resp.errors {
        println!("{}", format_error(e));
    }
    let Some(data) = resp.data.as_ref() else { return };
    let force_json = std::env::var("GATEHOUSE_OUTPUT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let Value::Object(fields) = data else {
        println!("{}", data);
        return;
    };
    for (key, val) in fields {
        if force_json {
            println!("{}: {}", key, serde_json::to_string_pretty(val).unwrap_or_else(|_| val.to_string()));
            continue;
        }
        match table_from_value(val) {
            Some((cols, rows)) => {
                println!("{}:", key);
                print_table(&cols, &rows);
            }
            None => println!("{}: {}", key, serde_json::to_string_pretty(val).unwrap_or_else(|_| val.to_string())),
        }
    }
}

pub fn format_error(e: &crate::graphql::GraphQLError) -> String {
    let code = e.code().unwrap_or("ERROR");
    match &e.path {
        Some(path) => {
            let p: Vec<String> = path
                .iter()
                .map(|s| match s {
                    crate::graphql::PathSegment::Key(k) => k.clone(),
                    crate::graphql::PathSegment::Index(i) => i.to_string(),
                })
                .collect();
            format!("error [{}] at {}: {}", code, p.join("."), e.message)
        }
        None => format!("error [{}]: {}", code, e.message),
    }
}

// A non-empty array of objects becomes (sorted union of keys, rows).
fn table_from_value(val: &Value) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let Value::Array(arr) = val else { return None };
    if arr.is_empty() || !arr.iter().all(Value::is_object) {
        return None;
    }
    let mut cols: Vec<String> = Vec::new();
    for el in arr {
        if let Value::Object(map) = el {
            for k in map.keys() { if !cols.contains(k) { cols.push(k.clone()); } }
        }
    }
    cols.sort();
    let rows = arr
        .iter()
        .map(|el| cols.iter().map(|k| to_cell_string(el.get(k).unwrap_or(&Value::Null))).collect())
        .collect();
    Some((cols, rows))
}

fn print_table(cols: &[String], rows: &[Vec<String>]) {
    let max_col_width: usize = 80; // cap to keep output readable
    let mut widths: Vec<usize> = cols.iter().map(|s| display_len(s).min(max_col_width)).collect();
    for r in rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            let w = display_len(cell);
            if w > widths[i] { widths[i] = w.min(max_col_width); }
        }
    }
    let sep = build_separator(&widths);
    println!("{}", sep);
    println!("{}", build_row(cols, &widths));
    println!("{}", sep);
    for r in rows {
        println!("{}", build_row(r, &widths));
    }
    println!("{}", sep);
    println!("rows: {}, cols: {}", rows.len(), cols.len());
}

fn to_cell_string(v: &Value) -> String {
    match v {
        Value::Null => String::from("NULL"),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn display_len(s: &str) -> usize { s.chars().count() }

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let text = truncate(&cell, *w);
        let pad = " ".repeat(w.saturating_sub(display_len(&text)));
        s.push(' ');
        if is_numeric_like(&cell) {
            s.push_str(&pad);
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&pad);
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    // crude detection for aligning numbers to right
    let st = s.trim();
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+eE,_".contains(ch) { continue; }
        return false;
    }
    has_digit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::{codes, GraphQLError, PathSegment};
    use serde_json::json;

    #[test]
    fn tables_only_for_object_lists() {
        let (cols, rows) = table_from_value(&json!([{"text": "hi", "id": "1"}, {"id": "2"}])).unwrap();
        assert_eq!(cols, vec!["id", "text"]);
        assert_eq!(rows[1], vec!["2", "NULL"]);
        assert!(table_from_value(&json!([])).is_none());
        assert!(table_from_value(&json!([1, 2])).is_none());
        assert!(table_from_value(&json!({"a": 1})).is_none());
    }

    #[test]
    fn row_rendering_pads_and_aligns() {
        let widths = [4, 3];
        assert_eq!(build_separator(&widths), "+------+-----+");
        assert_eq!(build_row(&["ab".into(), "7".into()], &widths), "| ab   |   7 |");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }

    #[test]
    fn error_lines_carry_code_and_path() {
        let e = GraphQLError::new("Unauthorized", codes::UNAUTHENTICATED)
            .at(&[PathSegment::Key("messages".into()), PathSegment::Index(0)]);
        assert_eq!(format_error(&e), "error [UNAUTHENTICATED] at messages.0: Unauthorized");
    }
}
