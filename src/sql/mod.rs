//! SQL template rendering and bulk CSV copy.

pub mod columns;
pub mod copy;
pub mod render;

pub use columns::select_columns;
pub use copy::{BulkCopy, DEFAULT_CONNECT_TIMEOUT_SECS, PostgresCopyExporter, build_copy_sql};
pub use render::{literal, placeholders, quote_literal, render};
