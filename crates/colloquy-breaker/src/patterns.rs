//! Ordered error pattern catalog.
//!
//! Matching is first-match-wins over a fixed list. The specific categories
//! come first, followed by the numbered system patterns. Because the list
//! order decides the outcome, some messages that read like a specific
//! category resolve to a system pattern instead ("File is locked" does not
//! contain "file locked", so it lands on the `file.*locked` system rule).

use std::sync::LazyLock;

use colloquy_core::PatternCategory;
use regex::Regex;

/// One compiled rule in the catalog.
pub struct ErrorPattern {
    pub regex: Regex,
    pub category: PatternCategory,
}

/// The frozen, ordered pattern list.
pub struct PatternCatalog {
    patterns: Vec<ErrorPattern>,
}

static CATALOG: LazyLock<PatternCatalog> = LazyLock::new(PatternCatalog::new);

/// Classify `message` against the shared catalog.
pub fn detect_pattern(message: &str) -> Option<PatternCategory> {
    CATALOG.detect(message)
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCatalog {
    pub fn new() -> Self {
        let mut patterns = Vec::new();

        // =====================================================================
        // Specific categories (substring rules)
        // =====================================================================
        let specific: [(&str, PatternCategory); 6] = [
            (r"(?i)font", PatternCategory::Font),
            (r"(?i)no module named|modulenotfounderror", PatternCategory::Module),
            (r"(?i)permission denied|access denied", PatternCategory::Permission),
            (
                r"(?i)out of memory|disk full|cannot allocate memory",
                PatternCategory::Resource,
            ),
            (
                r"(?i)backend|display|cairo|agg|figure|window",
                PatternCategory::Plotting,
            ),
            (r"(?i)cannot write|file locked|read-only", PatternCategory::FileIo),
        ];

        for (pat, category) in specific {
            patterns.push(ErrorPattern {
                regex: Regex::new(pat).expect("Invalid error category regex"),
                category,
            });
        }

        // =====================================================================
        // System patterns, identified by position
        // =====================================================================
        let system = [
            // Fonts
            r"(?i)findfont:.*Font family.*not found",
            r"(?i)cannot find font",
            r"(?i)font.*not available",
            r"(?i)missing.*font",
            // Imports
            r"(?i)no module named",
            r"(?i)modulenotfounderror",
            r"(?i)importerror",
            // Permissions
            r"(?i)permission denied",
            r"(?i)access denied",
            r"(?i)operation not permitted",
            // Resources
            r"(?i)out of memory",
            r"(?i)disk full",
            r"(?i)no space left",
            r"(?i)cannot allocate memory",
            // Network
            r"(?i)connection refused",
            r"(?i)network unreachable",
            r"(?i)timeout",
            // Plotting
            r"(?i)backend.*not available",
            r"(?i)cannot create figure",
            r"(?i)failed to create.*window",
            r"(?i)display.*not.*found",
            r"(?i)DISPLAY.*not set",
            r"(?i)cairo.*error",
            r"(?i)agg.*error",
            // File I/O
            r"(?i)cannot write file",
            r"(?i)file.*locked",
            r"(?i)read-only file system",
        ];

        for (index, pat) in system.iter().enumerate() {
            patterns.push(ErrorPattern {
                regex: Regex::new(pat).expect("Invalid system error regex"),
                category: PatternCategory::System(index),
            });
        }

        Self { patterns }
    }

    /// First matching category, or `None` when no rule matches.
    pub fn detect(&self, message: &str) -> Option<PatternCategory> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(message))
            .map(|p| p.category)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }
}
