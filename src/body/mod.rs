//! Issue body parser & serializer (spec.md §4.1–§4.2) — the lossless
//! round-trip between Markdown issue bodies and `ParsedBody`.

pub mod parser;
pub mod writer;

pub use parser::parse;
pub use writer::{
    add_todo, append_log_entry, replace_whole_body, set_section, toggle_todo, write, WriterError,
    MAX_BODY_CODE_UNITS,
};
