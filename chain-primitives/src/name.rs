//! Confusable-tolerant name hashing for the name-registration chain.
//!
//! Names are hashed after folding case and a fixed table of visually
//! confusable characters to a canonical representative, so that `"GN00B"`,
//! `"6MOO8"`, and `"gmoob"` all register the same underlying name (and
//! `"rin"`/`"njm"` likewise), and cannot be used to squat look-alike
//! spellings of an already-claimed name.

use crate::hash::SmallHash;

/// Folds a single character to its canonical representative.
///
/// Digits that are easily confused with letters fold to the letter; letters
/// that render alike in the fonts this guards against (`i`/`j`, `n`/`r`/`m`)
/// fold to one representative; everything else folds to lowercase.
fn fold_confusable(c: char) -> char {
    match c {
        '0' | 'O' | 'o' => 'o',
        '1' | 'l' | 'I' | 'i' | '|' | 'j' | 'J' => 'i',
        '5' | 'S' | 's' | '$' => 's',
        '6' | 'G' | 'g' => 'g',
        '8' | 'B' | 'b' => 'b',
        '2' | 'Z' | 'z' => 'z',
        '3' | 'E' | 'e' => 'e',
        'n' | 'N' | 'r' | 'R' | 'm' | 'M' => 'n',
        other => other.to_ascii_lowercase(),
    }
}

/// Canonicalizes a name by folding confusable characters and case, so that
/// visually ambiguous spellings collapse to one representative string.
#[must_use]
pub fn canonicalize_name(name: &str) -> String {
    name.chars().map(fold_confusable).collect()
}

/// Hashes a name for registration, after confusable/case folding.
///
/// `name_hash("GN00B") == name_hash("6MOO8") == name_hash("gmoob")`.
#[must_use]
pub fn name_hash(name: &str) -> SmallHash {
    SmallHash::digest(canonicalize_name(name).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confusable_spellings_hash_identically() {
        assert_eq!(name_hash("GN00B"), name_hash("6MOO8"));
        assert_eq!(name_hash("GN00B"), name_hash("gmoob"));
        assert_eq!(name_hash("rin"), name_hash("njm"));
    }

    #[test]
    fn distinct_names_hash_differently() {
        assert_ne!(name_hash("alice"), name_hash("bob"));
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_name("GN00B");
        let twice = canonicalize_name(&once);
        assert_eq!(once, twice);
    }
}
