use serde::Serialize;

/// One row of a score sheet: full move number with white's and black's half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovePair {
    pub number: u32,
    pub white: String,
    /// Empty until black has replied.
    pub black: String,
}

/// Group SAN half-moves into numbered pairs, white first.
pub fn move_pairs<S: AsRef<str>>(sans: &[S]) -> Vec<MovePair> {
    sans.chunks(2)
        .enumerate()
        .map(|(i, pair)| MovePair {
            number: i as u32 + 1,
            white: pair[0].as_ref().to_string(),
            black: pair.get(1).map(|s| s.as_ref().to_string()).unwrap_or_default(),
        })
        .collect()
}
