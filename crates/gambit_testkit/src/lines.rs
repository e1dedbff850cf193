//! Scripted openings in coordinate notation, white first.

/// Black mates on move two.
pub const FOOLS_MATE: &[&str] = &["f2f3", "e7e5", "g2g4", "d8h4"];

/// White mates on move four.
pub const SCHOLARS_MATE: &[&str] = &["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6", "h5f7"];

/// A quiet opening that leaves the game running.
pub const ITALIAN_OPENING: &[&str] = &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "f8c5"];

/// Looks up a line by name.
pub fn by_name(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "fools-mate" => Some(FOOLS_MATE),
        "scholars-mate" => Some(SCHOLARS_MATE),
        "italian" => Some(ITALIAN_OPENING),
        _ => None,
    }
}
