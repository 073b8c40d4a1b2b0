//! Table rendering for the `list` and `validate` subcommands.

use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Columns, object::Rows, width::Width},
};

use crate::definition::ExportDefinition;
use crate::validator::ValidatedExportRequest;

/// Maximum width for a single column (characters)
const MAX_COLUMN_WIDTH: usize = 60;

/// Overview of all registered definitions.
pub fn definitions_table<'a, I>(definitions: I) -> String
where
    I: IntoIterator<Item = &'a ExportDefinition>,
{
    let mut builder = Builder::default();
    builder.push_record(["KEY", "PROVIDER", "MAX ROWS", "PARAMS", "DESCRIPTION"]);

    let mut empty = true;
    for def in definitions {
        empty = false;
        let params: Vec<String> = def
            .params()
            .iter()
            .map(|p| {
                let marker = if p.is_required() { "*" } else { "" };
                format!("{}{}:{}", p.request_name(), marker, p.param_type())
            })
            .collect();
        builder.push_record([
            def.key().to_string(),
            def.provider().to_string(),
            def.max_rows().to_string(),
            params.join(", "),
            def.description().unwrap_or_default().to_string(),
        ]);
    }
    if empty {
        return "(no exports configured)".to_string();
    }

    finish(builder, 5)
}

/// Validated values of one request.
pub fn validated_table(validated: &ValidatedExportRequest) -> String {
    let mut builder = Builder::default();
    builder.push_record(["PARAM", "VALUE"]);
    for (name, value) in validated.params() {
        builder.push_record([name.clone(), value.to_string()]);
    }
    builder.push_record(["maxRows".to_string(), validated.max_rows().to_string()]);
    finish(builder, 2)
}

fn finish(builder: Builder, columns: usize) -> String {
    let mut table = builder.build();
    table.with(Style::modern());
    for i in 0..columns {
        table.with(Modify::new(Columns::new(i..=i)).with(Width::wrap(MAX_COLUMN_WIDTH)));
    }
    table.with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}
