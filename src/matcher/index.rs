use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tracing::error;

pub const DEFAULT_MEMO_CAPACITY: usize = 20_000;

/// Template row as fetched from the catalog, in ascending id order.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    pub template_id: i64,
    pub pattern: String,
}

pub struct CompiledEntry {
    pub template_id: i64,
    pub regex: Regex,
    pub literal_hint: Option<String>,
}

/// Immutable snapshot of the active templates.
///
/// Entries with an extractable literal hint are bucketed by the hint's first
/// character so a query only runs regexes whose hint occurs in the text;
/// entries without a hint always run. A bounded memo caches per-key-text
/// outcomes and dies with the index, so a swap invalidates it by construction.
pub struct CompiledIndex {
    entries: Vec<CompiledEntry>,
    buckets: HashMap<char, Vec<(String, usize)>>,
    fallback: Vec<usize>,
    memo: Mutex<MemoCache>,
}

impl CompiledIndex {
    /// Compile `items` into an index. Items whose pattern fails to compile
    /// are logged, omitted, and reported back so the caller can deactivate
    /// them; a single bad pattern never aborts the build.
    pub fn build(items: &[IndexTemplate], memo_capacity: usize) -> (Self, Vec<i64>) {
        let mut entries = Vec::with_capacity(items.len());
        let mut failed = Vec::new();

        for item in items {
            if item.pattern.is_empty() {
                continue;
            }
            match Regex::new(&item.pattern) {
                Ok(regex) => {
                    let literal_hint = extract_literal_hint(&item.pattern);
                    entries.push(CompiledEntry {
                        template_id: item.template_id,
                        regex,
                        literal_hint,
                    });
                }
                Err(e) => {
                    error!(
                        template_id = item.template_id,
                        pattern = %item.pattern,
                        error = %e,
                        "failed to compile template pattern, omitting from index"
                    );
                    failed.push(item.template_id);
                }
            }
        }

        let mut buckets: HashMap<char, Vec<(String, usize)>> = HashMap::new();
        let mut fallback = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            match &entry.literal_hint {
                Some(hint) => {
                    let first = hint.chars().next().unwrap_or('\0');
                    buckets.entry(first).or_default().push((hint.clone(), idx));
                }
                None => fallback.push(idx),
            }
        }

        (
            Self {
                entries,
                buckets,
                fallback,
                memo: Mutex::new(MemoCache::new(memo_capacity)),
            },
            failed,
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CompiledEntry] {
        &self.entries
    }

    /// Match one key-text against the index, first hit wins.
    ///
    /// Candidates are tried in a deterministic order: bucket entries in
    /// first-occurrence order of the text's characters, then every fallback
    /// entry. Results are memoized per text.
    pub fn match_one(&self, text: &str) -> Option<i64> {
        if let Ok(mut memo) = self.memo.lock() {
            if let Some(cached) = memo.get(text) {
                return cached;
            }
        }

        let result = self.match_uncached(text);

        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(text.to_string(), result);
        }
        result
    }

    fn match_uncached(&self, text: &str) -> Option<i64> {
        let mut yielded = vec![false; self.entries.len()];
        let mut seen_chars = HashSet::new();

        for c in text.chars() {
            if !seen_chars.insert(c) {
                continue;
            }
            let Some(bucket) = self.buckets.get(&c) else {
                continue;
            };
            for (literal, idx) in bucket {
                if yielded[*idx] || !text.contains(literal.as_str()) {
                    continue;
                }
                yielded[*idx] = true;
                let entry = &self.entries[*idx];
                if entry.regex.find(text).is_some() {
                    return Some(entry.template_id);
                }
            }
        }

        for idx in &self.fallback {
            if yielded[*idx] {
                continue;
            }
            let entry = &self.entries[*idx];
            if entry.regex.find(text).is_some() {
                return Some(entry.template_id);
            }
        }

        None
    }
}

/// Longest run of literal bytes (alphanumeric plus `-_:/.`), escape-aware,
/// of length >= 4. Parenthesized groups are skipped whole: a literal inside
/// one may sit on one arm of an alternation and is never guaranteed to occur.
/// Top-level alternation and inline case-insensitivity disqualify outright.
fn extract_literal_hint(pattern: &str) -> Option<String> {
    if pattern.contains("(?i") {
        return None;
    }

    fn is_hint_punct(c: char) -> bool {
        matches!(c, '-' | '_' | ':' | '/' | '.')
    }

    fn commit(best: &mut String, run: &mut String) {
        if run.len() > best.len() {
            std::mem::swap(best, run);
        }
        run.clear();
    }

    let mut best = String::new();
    let mut run = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '|' => return None,
            '\\' => match chars.next() {
                // Escaped punctuation from the hint alphabet stays literal;
                // everything else (classes, escaped metachars) breaks the run.
                Some(esc) if is_hint_punct(esc) => run.push(esc),
                _ => commit(&mut best, &mut run),
            },
            // A trailing ? * {n,m} makes the previous char optional or elided.
            '?' | '*' => {
                run.pop();
                commit(&mut best, &mut run);
            }
            '{' => {
                run.pop();
                commit(&mut best, &mut run);
                for skipped in chars.by_ref() {
                    if skipped == '}' {
                        break;
                    }
                }
            }
            '+' => commit(&mut best, &mut run),
            '[' => {
                commit(&mut best, &mut run);
                skip_class(&mut chars);
            }
            '(' => {
                commit(&mut best, &mut run);
                skip_group(&mut chars);
            }
            ')' | '^' | '$' | '.' => commit(&mut best, &mut run),
            c if c.is_ascii_alphanumeric() || is_hint_punct(c) => run.push(c),
            _ => commit(&mut best, &mut run),
        }
    }
    commit(&mut best, &mut run);

    if best.len() >= 4 {
        Some(best)
    } else {
        None
    }
}

fn skip_class(chars: &mut std::str::Chars<'_>) {
    let mut escaped = false;
    for c in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ']' {
            break;
        }
    }
}

/// Consume up to the matching close paren, honoring nesting, escapes, and
/// bracket classes (a `)` inside `[...]` is literal).
fn skip_group(chars: &mut std::str::Chars<'_>) {
    let mut depth = 1usize;
    let mut escaped = false;
    let mut in_class = false;
    for c in chars {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }
}

/// Bounded LRU over key-text match outcomes. Stale queue entries are skipped
/// on eviction (stamp mismatch) and periodically compacted away.
struct MemoCache {
    capacity: usize,
    map: HashMap<String, (Option<i64>, u64)>,
    order: VecDeque<(String, u64)>,
    clock: u64,
}

impl MemoCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            map: HashMap::new(),
            order: VecDeque::new(),
            clock: 0,
        }
    }

    fn get(&mut self, key: &str) -> Option<Option<i64>> {
        self.clock += 1;
        let clock = self.clock;
        let value = match self.map.get_mut(key) {
            Some((value, stamp)) => {
                *stamp = clock;
                Some(*value)
            }
            None => return None,
        };
        self.order.push_back((key.to_string(), clock));
        self.maybe_compact();
        value
    }

    fn insert(&mut self, key: String, value: Option<i64>) {
        self.clock += 1;
        self.map.insert(key.clone(), (value, self.clock));
        self.order.push_back((key, self.clock));
        self.evict();
        self.maybe_compact();
    }

    fn evict(&mut self) {
        while self.map.len() > self.capacity {
            let Some((key, stamp)) = self.order.pop_front() else {
                break;
            };
            let fresh = self.map.get(&key).is_some_and(|(_, s)| *s == stamp);
            if fresh {
                self.map.remove(&key);
            }
        }
    }

    fn maybe_compact(&mut self) {
        if self.order.len() > self.capacity.saturating_mul(2).max(64) {
            let map = &self.map;
            self.order
                .retain(|(key, stamp)| map.get(key).is_some_and(|(_, s)| s == stamp));
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.len()
    }
}
