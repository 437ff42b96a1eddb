//! logloom: a two-pass log template-learning pipeline.
//!
//! The first pass streams a raw (optionally gzip-compressed) log file,
//! normalizes it into one record per line, matches each distinct key-text
//! against a catalog of regex templates, and grows the catalog online: misses
//! accumulate in a diversity buffer that periodically fires an LLM committee,
//! whose surviving candidates are persisted and hot-spliced into the active
//! match index. The second pass replays a normalized file against the
//! finished catalog and aggregates per-template match statistics.

pub mod aggregate;
pub mod buffer;
pub mod catalog;
pub mod cli;
pub mod committee;
pub mod config;
pub mod matcher;
pub mod record;
pub mod source;
