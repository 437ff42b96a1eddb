use regex::Regex;

/// Folds continuation lines onto their timestamped leader.
///
/// A line is a record leader iff it starts with `[YYYYMMDD_HHMMSS][sec.frac]`.
/// Non-leader lines are appended to the buffered leader with a single space.
/// One piece of carry-over state survives between `push` calls; `flush`
/// drains it at end of stream.
pub struct Normalizer {
    leader_re: Regex,
    carry: Option<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            leader_re: Regex::new(r"^\[\d{8}_\d{6}\]\[\d+\.\d+\]").expect("leader pattern is valid"),
            carry: None,
        }
    }

    /// Feed one sanitized line; returns the completed record, if any.
    pub fn push(&mut self, line: &str) -> Option<String> {
        if self.leader_re.is_match(line) {
            let finished = self.carry.take();
            self.carry = Some(line.to_string());
            finished
        } else {
            match self.carry.as_mut() {
                Some(cur) => {
                    let frag = line.trim();
                    if !frag.is_empty() {
                        cur.push(' ');
                        cur.push_str(frag);
                    }
                    None
                }
                None => {
                    // Orphan fragment before the first leader; buffer it so the
                    // field parser gets to reject it as one unit.
                    self.carry = Some(line.to_string());
                    None
                }
            }
        }
    }

    /// Drain the buffered leader at end of input.
    pub fn flush(&mut self) -> Option<String> {
        self.carry.take()
    }
}
