use crate::record::keytext::extract_key_text;
use regex::Regex;

/// One parsed log record. Immutable downstream of the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// `"YYYYMMDD HHMMSS"`, space separated.
    pub ts: String,
    pub level: String,
    pub thread_id: String,
    pub module: String,
    pub submodule: String,
    pub key_text: String,
    pub raw: String,
}

/// Parses the fixed record grammar:
///
/// `[YYYYMMDD_HHMMSS][<sec>.<frac>][<L>][<thread>][MOD:<mod>][SMOD:<smod>]<rest>`
///
/// Lines missing any required field are silently rejected.
pub struct FieldParser {
    line_re: Regex,
}

impl Default for FieldParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldParser {
    pub fn new() -> Self {
        let line_re = Regex::new(
            r"^\[(?P<date>\d{8})_(?P<time>\d{6})\]\[(?P<sec>\d+\.\d+)\]\[(?P<level>[A-Z])\]\[(?P<thr>\d+)\]\[MOD:(?P<mod>[^\]]*)\]\[SMOD:(?P<smod>[^\]]*)\](?P<rest>.*)$",
        )
        .expect("line pattern is valid");
        Self { line_re }
    }

    pub fn parse(&self, line: &str) -> Option<Record> {
        let caps = self.line_re.captures(line)?;

        let date = caps.name("date")?.as_str();
        let time = caps.name("time")?.as_str();
        let rest = caps.name("rest").map_or("", |m| m.as_str());

        Some(Record {
            ts: format!("{} {}", date, time),
            level: caps.name("level")?.as_str().to_string(),
            thread_id: caps.name("thr")?.as_str().to_string(),
            module: caps.name("mod").map_or("", |m| m.as_str()).to_string(),
            submodule: caps.name("smod").map_or("", |m| m.as_str()).to_string(),
            key_text: extract_key_text(rest),
            raw: line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_grammar_parse() {
        let parser = FieldParser::new();
        let line = "[20250929_183904][3499.966][I][40433][MOD:vgnss][SMOD:log][ INFO ] [RTK] sensor:3500813, age=1.00, ns_r=32, ns_b=39";
        let rec = parser.parse(line).unwrap();

        assert_eq!(rec.ts, "20250929 183904");
        assert_eq!(rec.level, "I");
        assert_eq!(rec.thread_id, "40433");
        assert_eq!(rec.module, "vgnss");
        assert_eq!(rec.submodule, "log");
        assert_eq!(rec.key_text, "sensor:3500813, age=1.00, ns_r=32, ns_b=39");
        assert_eq!(rec.raw, line);
    }

    #[test]
    fn test_key_text_matches_raw_extraction() {
        let parser = FieldParser::new();
        let line = "[20250929_183904][3499.966][W][7][MOD:planner][SMOD:ctl][warn] speed limit NUMNUM exceeded";
        let rec = parser.parse(line).unwrap();

        // The record's key_text must equal re-extraction from its own rest.
        let rest = line.split("[SMOD:ctl]").nth(1).unwrap();
        assert_eq!(rec.key_text, extract_key_text(rest));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let parser = FieldParser::new();
        assert!(parser.parse("").is_none());
        assert!(parser.parse("free text without brackets").is_none());
        assert!(parser.parse("[20250929_183904][3499.966] missing the rest").is_none());
        // Lowercase level letter does not match the grammar.
        assert!(parser
            .parse("[20250929_183904][3499.966][i][40433][MOD:m][SMOD:s]x")
            .is_none());
    }

    #[test]
    fn test_empty_module_fields_allowed() {
        let parser = FieldParser::new();
        let rec = parser
            .parse("[20250929_183904][3499.966][E][1][MOD:][SMOD:]boom")
            .unwrap();
        assert_eq!(rec.module, "");
        assert_eq!(rec.submodule, "");
        assert_eq!(rec.key_text, "boom");
    }
}
