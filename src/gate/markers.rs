//! Versioned marker table for the free-text fallback
//!
//! Tokens match on word boundaries where a hyphen counts as part of the
//! word, so `GO` does not fire inside `NO-GO` or `Go-To-Market`. Most tokens
//! ignore case; `GO` must be upper case, since "go ahead" is ordinary prose.
//! Phrases that merely name the gate are blanked out before scanning.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bump whenever a token or phrase below changes
pub const MARKER_TABLE_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    /// Wins over any positive marker found in the same text
    StrongNegative,
    WeakPositive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub token: &'static str,
    pub strength: Strength,
    /// Match only the token as written
    pub case_sensitive: bool,
}

pub const KILL_SWITCH_MARKERS: &[Marker] = &[
    Marker {
        token: "KILL",
        strength: Strength::StrongNegative,
        case_sensitive: false,
    },
    Marker {
        token: "PASS",
        strength: Strength::WeakPositive,
        case_sensitive: false,
    },
];

pub const BOARD_MARKERS: &[Marker] = &[
    Marker {
        token: "REJECTED",
        strength: Strength::StrongNegative,
        case_sensitive: false,
    },
    Marker {
        token: "NO-GO",
        strength: Strength::StrongNegative,
        case_sensitive: false,
    },
    Marker {
        token: "APPROVED",
        strength: Strength::WeakPositive,
        case_sensitive: false,
    },
    Marker {
        token: "CONDITIONAL",
        strength: Strength::WeakPositive,
        case_sensitive: false,
    },
    Marker {
        token: "GO",
        strength: Strength::WeakPositive,
        case_sensitive: true,
    },
];

/// Gate and label names that contain marker tokens
pub const NEUTRALISED_PHRASES: &[&str] = &["KILL SWITCH", "KILL-SWITCH", "GO/NO-GO", "GO / NO-GO"];

static NEUTRALISED: Lazy<Regex> = Lazy::new(|| {
    let alternatives = NEUTRALISED_PHRASES
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternatives}")).expect("static regex")
});

static TOKEN_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    KILL_SWITCH_MARKERS
        .iter()
        .chain(BOARD_MARKERS)
        .map(|m| {
            let flags = if m.case_sensitive { "" } else { "(?i)" };
            let pattern = format!(r"{flags}(?:^|[^\w-]){}(?:[^\w-]|$)", regex::escape(m.token));
            (m.token, Regex::new(&pattern).expect("static regex"))
        })
        .collect()
});

/// Markers from `table` present in `text`, in table order
pub fn scan(text: &str, table: &'static [Marker]) -> Vec<Marker> {
    let cleaned = NEUTRALISED.replace_all(text, " ");
    table
        .iter()
        .copied()
        .filter(|marker| {
            TOKEN_PATTERNS
                .iter()
                .find(|(token, _)| *token == marker.token)
                .is_some_and(|(_, re)| re.is_match(&cleaned))
        })
        .collect()
}
