pub mod keytext;
pub mod parser;

pub use keytext::{extract_key_text, UniqueSetBuilder};
pub use parser::{FieldParser, Record};
