//! The multi-pattern automaton: a fixed dictionary of literal fragments
//! searched in one linear pass regardless of dictionary size, built once
//! at startup and reused for every payload.

use aho_corasick::AhoCorasick;
use aho_corasick::AhoCorasickBuilder;
use aho_corasick::MatchKind;
use sentinel_protocol::L1Finding;
use sentinel_protocol::ThreatLevel;

/// `(literal fragment, finding name, threat level)`. Fragments are matched
/// case-insensitively; several fragments may share a finding name so the
/// automaton can recognize more than one spelling of the same technique.
const DEFAULT_PATTERNS: &[(&str, &str, ThreatLevel)] = &[
    ("rm -rf /", "destructive_shell", ThreatLevel::Critical),
    ("rm -rf ~", "destructive_shell", ThreatLevel::Critical),
    ("rm -rf *", "destructive_shell", ThreatLevel::Critical),
    ("mkfs.", "destructive_shell", ThreatLevel::Critical),
    ("dd if=/dev/zero", "destructive_shell", ThreatLevel::Critical),
    (":(){ :|:& };:", "destructive_shell", ThreatLevel::Critical),
    ("curl | sh", "piped_download_exec", ThreatLevel::Critical),
    ("curl | bash", "piped_download_exec", ThreatLevel::Critical),
    ("wget | sh", "piped_download_exec", ThreatLevel::Critical),
    ("wget | bash", "piped_download_exec", ThreatLevel::Critical),
    ("/etc/shadow", "privileged_path", ThreatLevel::High),
    ("/etc/sudoers", "privileged_path", ThreatLevel::High),
    ("~/.ssh/id_rsa", "privileged_path", ThreatLevel::High),
    ("drop table", "sql_ddl", ThreatLevel::High),
    ("drop database", "sql_ddl", ThreatLevel::High),
    ("truncate table", "sql_ddl", ThreatLevel::High),
];

/// Wraps the automaton with the per-pattern metadata matches need to report
/// (the automaton itself only hands back a pattern index).
pub struct Dictionary {
    automaton: AhoCorasick,
    meta: Vec<(&'static str, ThreatLevel)>,
    /// Owned copies of any caller-supplied patterns, kept alive alongside
    /// `meta`'s `&'static str`s via a leak-free `String` table.
    custom_meta: Vec<(String, ThreatLevel)>,
}

impl Dictionary {
    /// Builds the automaton once from the default set plus any
    /// operator-configured `blocked_patterns`. Custom entries are tagged
    /// `blocklist_match` at `HIGH` — an operator adding to this list is
    /// almost always naming something they already consider dangerous.
    pub fn build(custom_blocked_patterns: &[String]) -> Self {
        let mut literals: Vec<&str> = Vec::with_capacity(DEFAULT_PATTERNS.len() + custom_blocked_patterns.len());
        let mut meta = Vec::with_capacity(DEFAULT_PATTERNS.len());
        for (literal, name, level) in DEFAULT_PATTERNS {
            literals.push(literal);
            meta.push((*name, *level));
        }

        let custom_meta: Vec<(String, ThreatLevel)> = custom_blocked_patterns
            .iter()
            .map(|pattern| (pattern.clone(), ThreatLevel::High))
            .collect();
        for (pattern, _) in &custom_meta {
            literals.push(pattern.as_str());
        }

        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&literals)
            .expect("literal dictionary is always a valid automaton input");

        Self {
            automaton,
            meta,
            custom_meta,
        }
    }

    /// Scans `text` and folds every match into `finding`, in one linear
    /// pass independent of how many literals are in the dictionary.
    pub fn scan_into(&self, text: &str, finding: &mut L1Finding) {
        for m in self.automaton.find_iter(text) {
            let idx = m.pattern().as_usize();
            let (name, level) = if idx < self.meta.len() {
                let (name, level) = self.meta[idx];
                (name.to_string(), level)
            } else {
                let (name, level) = &self.custom_meta[idx - self.meta.len()];
                (format!("blocklist_match:{name}"), *level)
            };
            finding.add_match(name, level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive() {
        let dict = Dictionary::build(&[]);
        let mut finding = L1Finding::clean();
        dict.scan_into("please RM -RF / now", &mut finding);
        assert!(finding.matched_patterns.contains("destructive_shell"));
        assert_eq!(finding.level, ThreatLevel::Critical);
    }

    #[test]
    fn custom_patterns_are_tagged_and_high() {
        let dict = Dictionary::build(&["launch-the-missiles".to_string()]);
        let mut finding = L1Finding::clean();
        dict.scan_into("please launch-the-missiles", &mut finding);
        assert!(
            finding
                .matched_patterns
                .iter()
                .any(|p| p.starts_with("blocklist_match:"))
        );
        assert_eq!(finding.level, ThreatLevel::High);
    }

    #[test]
    fn clean_text_matches_nothing() {
        let dict = Dictionary::build(&[]);
        let mut finding = L1Finding::clean();
        dict.scan_into("what is the weather today", &mut finding);
        assert!(finding.matched_patterns.is_empty());
    }
}
