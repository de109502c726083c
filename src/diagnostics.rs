// Compiler diagnostic parsing. Lines look like
// `<file>:<line>: <code>: <message>`; anything else is ignored.

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileErrorEntry {
    pub file: String,
    /// 1-based, as printed by the compiler.
    pub line: u32,
    pub code: String,
    pub message: String,
}

/// Entries per file. Files keep first-appearance order and entries keep
/// the order the compiler printed them in.
pub type CompileFileMap = IndexMap<String, Vec<CompileErrorEntry>>;

// The file group is lazy: a line splits at its first `:<n>: <word>: `, so a
// message that quotes another location stays in the message.
fn diagnostic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(.*?):(\d+): (\w+): (.+?)\r?$").expect("diagnostic pattern is valid")
    })
}

pub fn parse_diagnostics(output: &str) -> CompileFileMap {
    let mut files = CompileFileMap::new();
    for caps in diagnostic_pattern().captures_iter(output) {
        // A line number too large for u32 is not a diagnostic.
        let Ok(line) = caps[2].parse::<u32>() else {
            continue;
        };
        let entry = CompileErrorEntry {
            file: caps[1].to_string(),
            line,
            code: caps[3].to_string(),
            message: caps[4].to_string(),
        };
        files.entry(entry.file.clone()).or_default().push(entry);
    }
    files
}

/// Total number of entries across all files.
pub fn entry_count(files: &CompileFileMap) -> usize {
    files.values().map(Vec::len).sum()
}
