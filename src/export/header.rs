//! CSV header line computed from column metadata.
//!
//! The header only exists when a definition declares columns. Keys from the
//! canonical order come first, each with its configured header or the raw
//! key; configured columns outside that order follow in the order given.

use std::collections::HashSet;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::definition::ColumnDefinition;
use crate::error::Result;

/// Resolve the header columns for a canonical key order and configured columns.
///
/// # Arguments
/// * `order` - Canonical column keys; may be empty
/// * `columns` - Configured columns carrying header overrides
///
/// # Returns
/// * `Vec<ColumnDefinition>` - Columns in header order, empty when `columns` is
pub fn resolve_columns(order: &[String], columns: &[ColumnDefinition]) -> Vec<ColumnDefinition> {
    if columns.is_empty() {
        return Vec::new();
    }
    if order.is_empty() {
        return columns.to_vec();
    }

    let mut resolved: Vec<ColumnDefinition> = order
        .iter()
        .map(|key| {
            columns
                .iter()
                .find(|c| &c.key == key)
                .cloned()
                .unwrap_or_else(|| ColumnDefinition::new(key.clone()))
        })
        .collect();

    let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
    resolved.extend(
        columns
            .iter()
            .filter(|c| !ordered.contains(c.key.as_str()))
            .cloned(),
    );
    resolved
}

/// The header line including its trailing `\n`, or `None` when there is
/// nothing to write.
pub fn header_line(order: &[String], columns: &[ColumnDefinition]) -> Option<String> {
    let resolved = resolve_columns(order, columns);
    if resolved.is_empty() {
        return None;
    }
    let fields: Vec<String> = resolved
        .iter()
        .map(|c| escape_field(c.header_text()))
        .collect();
    Some(format!("{}\n", fields.join(",")))
}

/// Quote a CSV field if it contains a comma, a double quote or a line break.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write the header line to `sink`.
///
/// # Returns
/// * `Result<bool>` - Whether a header was written
pub async fn write_header<W>(sink: &mut W, order: &[String], columns: &[ColumnDefinition]) -> Result<bool>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match header_line(order, columns) {
        Some(line) => {
            sink.write_all(line.as_bytes()).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_header_uses_order_and_overrides() {
        let mut sink = Vec::new();
        let written = write_header(
            &mut sink,
            &order(&["id", "name"]),
            &[ColumnDefinition::new("name").with_header("Full Name")],
        )
        .await
        .unwrap();

        assert!(written);
        assert_eq!(String::from_utf8(sink).unwrap(), "id,Full Name\n");
    }

    #[test]
    fn test_header_quotes_special_characters() {
        let line = header_line(
            &order(&["id", "first_name", "last_name"]),
            &[
                ColumnDefinition::new("first_name").with_header("First Name"),
                ColumnDefinition::new("last_name").with_header("Last, Name"),
            ],
        );
        assert_eq!(line.as_deref(), Some("id,First Name,\"Last, Name\"\n"));
    }

    #[test]
    fn test_extra_columns_follow_canonical_order() {
        let line = header_line(
            &order(&["id"]),
            &[
                ColumnDefinition::new("b").with_header("Bee"),
                ColumnDefinition::new("a"),
                ColumnDefinition::new("id").with_header("ID"),
            ],
        );
        assert_eq!(line.as_deref(), Some("ID,Bee,a\n"));
    }

    #[test]
    fn test_no_columns_means_no_header() {
        assert_eq!(header_line(&order(&["id", "name"]), &[]), None);
        assert_eq!(header_line(&[], &[]), None);
    }

    #[test]
    fn test_columns_without_order_keep_given_order() {
        let columns = vec![
            ColumnDefinition::new("z"),
            ColumnDefinition::new("a").with_header("say \"a\""),
        ];
        assert_eq!(header_line(&[], &columns).as_deref(), Some("z,\"say \"\"a\"\"\"\n"));
    }

    #[test]
    fn test_canonical_keys_appear_once() {
        let resolved = resolve_columns(
            &order(&["id", "name", "email"]),
            &[
                ColumnDefinition::new("email").with_header("E-mail"),
                ColumnDefinition::new("extra"),
            ],
        );
        let keys: Vec<&str> = resolved.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["id", "name", "email", "extra"]);
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a\nb"), "\"a\nb\"");
        assert_eq!(escape_field("a\rb"), "\"a\rb\"");
    }
}
