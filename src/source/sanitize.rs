use regex::Regex;

/// Strips terminal escape sequences and control characters from log lines.
///
/// Removes ANSI CSI/OSC/DCS/PM/APC/ESC sequences, carriage returns, and the
/// C0/DEL control range except `\t` and `\n`. Sanitizing already-sanitized
/// input is a no-op.
pub struct Sanitizer {
    ansi_re: Regex,
    ctrl_re: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        // CSI, then OSC to BEL, then DCS/PM/APC to ST, then single-char ESC.
        let ansi_re = Regex::new(
            r"\x1B\[[0-?]*[ -/]*[@-~]|\x1B\].*?\x07|\x1B[PXY^_].*?\x1B\\|\x1B[@-Z\\-_]",
        )
        .expect("ansi pattern is valid");
        let ctrl_re =
            Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("ctrl pattern is valid");

        Self { ansi_re, ctrl_re }
    }

    pub fn sanitize_line(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        let s = self.ansi_re.replace_all(raw, "");
        let s = s.replace('\r', "");
        let s = self.ctrl_re.replace_all(&s, "");
        s.trim_end_matches('\n').to_string()
    }
}
