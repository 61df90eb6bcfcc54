//! Text quality heuristics deciding when a span needs re-recognition.
//!
//! Two independent, binary triggers: a span can look like mis-decoded
//! bytes (encoding trigger) or like mathematical notation the upstream
//! recognizer tends to garble (formula trigger). Neither carries a
//! severity score; the orchestrator consumes them as-is to decide whether
//! to re-run recognition and in which mode.

/// Symbols that only appear in text as decoding damage.
///
/// U+FFFD replacement character, U+FFFC object replacement character,
/// U+FEFF byte-order mark leaking into content, U+F0A4 (private use,
/// a symbol-font extraction artifact), NUL, and SUB.
const SUSPECT_SYMBOLS: [char; 6] = [
    '\u{FFFD}', '\u{FFFC}', '\u{FEFF}', '\u{F0A4}', '\u{0000}', '\u{001A}',
];

/// Unicode character-name fragments accepted outside 7-bit ASCII.
///
/// Accented Latin, Arabic script, and mathematical alphanumerics are
/// legitimate in this corpus; anything else beyond ASCII is treated as a
/// decoding symptom.
const ACCEPTED_NAME_FRAGMENTS: [&str; 3] = ["ARABIC", "LATIN", "MATHEMATICAL"];

/// Outcome of a quality assessment: which triggers fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityFlags {
    /// The span shows corrupted-encoding symptoms.
    pub encoding: bool,
    /// The span looks like it contains a formula fragment.
    pub formula: bool,
}

impl QualityFlags {
    /// Whether any trigger fired.
    #[inline]
    #[must_use = "trigger state is returned but not used"]
    pub const fn any(&self) -> bool {
        self.encoding || self.formula
    }
}

/// Assess a text span against the enabled triggers.
///
/// Blank text never triggers. Each check runs only when its flag is set,
/// so a disabled enhancement mode costs nothing per span.
#[must_use = "assessment flags are returned but not used"]
pub fn assess(text: &str, check_formula: bool, check_encoding: bool) -> QualityFlags {
    if text.trim().is_empty() {
        return QualityFlags::default();
    }

    QualityFlags {
        encoding: check_encoding && has_encoding_issues(text),
        formula: check_formula && looks_like_formula(text),
    }
}

/// Corrupted-encoding symptoms: known damage symbols, or any non-ASCII
/// character that does not resolve to an accepted script.
fn has_encoding_issues(text: &str) -> bool {
    if text.contains(SUSPECT_SYMBOLS) {
        return true;
    }
    text.chars()
        .filter(|c| !c.is_ascii())
        .any(|c| !is_accepted_non_ascii(c))
}

/// Whether a non-ASCII character belongs to the accepted scripts, judged
/// by its Unicode character name. A character with no resolvable name is
/// suspect.
fn is_accepted_non_ascii(c: char) -> bool {
    match unicode_names2::name(c) {
        Some(name) => {
            let name = name.to_string();
            ACCEPTED_NAME_FRAGMENTS
                .iter()
                .any(|fragment| name.contains(fragment))
        }
        None => false,
    }
}

/// Formula symptom: at least one decimal digit together with at least one
/// Latin letter. A cheap proxy for "contains mathematical notation" —
/// recognizers tuned for Arabic and general text frequently garble
/// Latin-letter-plus-digit fragments, and a full expression parser would
/// buy little over this.
fn looks_like_formula(text: &str) -> bool {
    let has_digit = text.chars().any(char::is_numeric);
    if !has_digit {
        return false;
    }
    text.chars()
        .filter(|c| c.is_alphabetic())
        .any(|c| c.is_ascii_alphabetic() || name_contains(c, "LATIN"))
}

fn name_contains(c: char, fragment: &str) -> bool {
    unicode_names2::name(c).is_some_and(|name| name.to_string().contains(fragment))
}
