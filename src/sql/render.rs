//! Named-placeholder rendering into literal SQL.
//!
//! `COPY ... TO STDOUT` accepts no bound parameters, so every `:name`
//! placeholder is replaced by an escaped SQL literal before execution. A
//! colon directly preceded by another colon is never a placeholder, which
//! keeps casts such as `::date` intact.

use std::collections::BTreeMap;

use chrono::SecondsFormat;

use crate::validator::ParamValue;

/// Render `sql`, replacing each `:name` placeholder with the literal form of
/// `params[name]`. Placeholders with no value become `NULL`.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use copyexport::sql::render;
/// use copyexport::validator::ParamValue;
///
/// let mut params = BTreeMap::new();
/// params.insert("id".to_string(), ParamValue::Int(5));
/// params.insert("name".to_string(), ParamValue::from("O'Hara"));
///
/// assert_eq!(
///     render("select * from t where id=:id and name=:name", &params),
///     "select * from t where id=5 and name='O''Hara'"
/// );
/// ```
pub fn render(sql: &str, params: &BTreeMap<String, ParamValue>) -> String {
    let mut out = String::with_capacity(sql.len());
    for segment in Segments::new(sql) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => match params.get(name) {
                Some(value) => out.push_str(&literal(value)),
                None => out.push_str("NULL"),
            },
        }
    }
    out
}

/// Names of all placeholders in `sql`, in order of appearance.
pub fn placeholders(sql: &str) -> Vec<&str> {
    Segments::new(sql)
        .filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name),
            Segment::Text(_) => None,
        })
        .collect()
}

/// SQL literal for one value.
pub fn literal(value: &ParamValue) -> String {
    match value {
        ParamValue::Int(n) => number(*n < 0, n),
        ParamValue::Long(n) => number(*n < 0, n),
        ParamValue::Float(n) if n.is_finite() => number(n.is_sign_negative(), n),
        ParamValue::Float(n) => quote_literal(&n.to_string()),
        ParamValue::Bool(true) => "TRUE".to_string(),
        ParamValue::Bool(false) => "FALSE".to_string(),
        ParamValue::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
        ParamValue::Timestamp(ts) => {
            quote_literal(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        ParamValue::Uuid(u) => quote_literal(&u.to_string()),
        ParamValue::Str(s) | ParamValue::Enum(s) => quote_literal(s),
        ParamValue::List(items) if items.is_empty() => "NULL".to_string(),
        ParamValue::List(items) => items.iter().map(literal).collect::<Vec<_>>().join(", "),
    }
}

/// Negative numbers are parenthesised so a preceding `-` in the template
/// can never combine with the sign into a `--` comment.
fn number(negative: bool, n: &impl ToString) -> String {
    if negative {
        format!("({})", n.to_string())
    } else {
        n.to_string()
    }
}

/// Wrap `value` in single quotes, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push('\'');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Splits a template into literal text and placeholder names.
struct Segments<'a> {
    sql: &'a str,
    pos: usize,
}

impl<'a> Segments<'a> {
    fn new(sql: &'a str) -> Self {
        Self { sql, pos: 0 }
    }

    /// Byte range of the placeholder name starting after the colon at `colon`.
    fn name_at(&self, colon: usize) -> Option<(usize, usize)> {
        let bytes = self.sql.as_bytes();
        if colon > 0 && bytes[colon - 1] == b':' {
            return None;
        }
        let start = colon + 1;
        match bytes.get(start) {
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
            _ => return None,
        }
        let len = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
        Some((start, start + len))
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.sql.len() {
            return None;
        }

        let rest = &self.sql[self.pos..];
        let mut search = 0;
        while let Some(offset) = rest[search..].find(':') {
            let colon = self.pos + search + offset;
            if let Some((start, end)) = self.name_at(colon) {
                if colon > self.pos {
                    let text = &self.sql[self.pos..colon];
                    self.pos = colon;
                    return Some(Segment::Text(text));
                }
                self.pos = end;
                return Some(Segment::Placeholder(&self.sql[start..end]));
            }
            search += offset + 1;
        }

        self.pos = self.sql.len();
        Some(Segment::Text(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn params(pairs: Vec<(&str, ParamValue)>) -> BTreeMap<String, ParamValue> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_render_numbers_and_strings() {
        let p = params(vec![("id", ParamValue::Int(5)), ("name", "O'Hara".into())]);
        assert_eq!(
            render("select * from t where id=:id and name=:name", &p),
            "select * from t where id=5 and name='O''Hara'"
        );
    }

    #[test]
    fn test_missing_placeholder_renders_null() {
        assert_eq!(
            render("select :missing as x", &BTreeMap::new()),
            "select NULL as x"
        );
    }

    #[test]
    fn test_casts_pass_through() {
        let p = params(vec![(
            "d",
            ParamValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        )]);
        assert_eq!(
            render("select :d::date, created_at::timestamptz, x:::y from t", &p),
            "select '2024-03-01'::date, created_at::timestamptz, x:::y from t"
        );
    }

    #[test]
    fn test_literal_forms() {
        let id = Uuid::parse_str("6f1c2d1e-9a0b-4c7d-8e2f-0a1b2c3d4e5f").unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        assert_eq!(literal(&ParamValue::Long(-9_000_000_000)), "(-9000000000)");
        assert_eq!(literal(&ParamValue::Int(0)), "0");
        assert_eq!(literal(&ParamValue::Bool(true)), "TRUE");
        assert_eq!(literal(&ParamValue::Bool(false)), "FALSE");
        assert_eq!(literal(&ParamValue::Uuid(id)), format!("'{id}'"));
        assert_eq!(literal(&ParamValue::Enum("ACTIVE".into())), "'ACTIVE'");
        assert_eq!(literal(&ParamValue::Timestamp(ts)), "'2024-05-06T07:08:09Z'");
        assert_eq!(literal(&ParamValue::Float(1.5)), "1.5");
        assert_eq!(literal(&ParamValue::Float(f64::NAN)), "'NaN'");
    }

    #[test]
    fn test_lists_join_elements() {
        let p = params(vec![
            ("ids", vec![1i64, 2, 3].into()),
            ("names", vec!["a'b", "c"].into()),
            ("none", ParamValue::List(Vec::new())),
        ]);
        assert_eq!(
            render("where id in (:ids) and n in (:names) and z in (:none)", &p),
            "where id in (1, 2, 3) and n in ('a''b', 'c') and z in (NULL)"
        );
    }

    #[test]
    fn test_quote_never_terminates_early() {
        let hostile = "x'); drop table users; --";
        let rendered = render("select :v", &params(vec![("v", hostile.into())]));
        assert_eq!(rendered, "select 'x''); drop table users; --'");

        let inner = &rendered["select ".len()..];
        assert!(inner.starts_with('\'') && inner.ends_with('\''));
        let body = &inner[1..inner.len() - 1];
        assert!(body.replace("''", "").find('\'').is_none());
    }

    #[test]
    fn test_negative_numbers_cannot_start_a_comment() {
        let p = params(vec![
            ("n", ParamValue::Long(-1)),
            ("i", ParamValue::Int(-2)),
            ("f", ParamValue::Float(-0.5)),
            ("maxRows", ParamValue::Int(10)),
        ]);
        let rendered = render(
            "select * from t where a = 1-:n and b = 2-:i and c = 3-:f limit :maxRows",
            &p,
        );
        assert_eq!(
            rendered,
            "select * from t where a = 1-(-1) and b = 2-(-2) and c = 3-(-0.5) limit 10"
        );
        assert!(!rendered.contains("--"));

        let list = params(vec![("ids", vec![-1i64, 2].into())]);
        assert_eq!(render("x in (:ids)", &list), "x in ((-1), 2)");
    }

    #[test]
    fn test_render_is_idempotent() {
        let p = params(vec![("a", "it's".into()), ("b", ParamValue::Int(1))]);
        let sql = "select :a, :b, :c";
        assert_eq!(render(sql, &p), render(sql, &p));
    }

    #[test]
    fn test_placeholder_edges() {
        let p = params(vec![("a_1", ParamValue::Int(1))]);
        assert_eq!(render(":a_1", &p), "1");
        assert_eq!(render("x = :a_1;", &p), "x = 1;");
        assert_eq!(render("time '10:30' and : alone and :1", &p), "time '10:30' and : alone and :1");
        assert_eq!(render("", &p), "");
        assert_eq!(render("héllo :a_1 wörld", &p), "héllo 1 wörld");
    }

    #[test]
    fn test_placeholders_listed_in_order() {
        assert_eq!(
            placeholders("select :b, :a::int, :b from t limit :maxRows"),
            vec!["b", "a", "b", "maxRows"]
        );
    }
}
