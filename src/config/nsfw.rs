use serde::Deserialize;

/// One rung of the maturity ladder
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct NsfwLevel {
    pub name: String,
    pub value: u32,
}

/// Ordered maturity ratings. Remote images carry a numeric rating which is
/// compared against the numeric value of the configured ceiling level.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NsfwLadder {
    /// Levels in ascending order
    pub levels: Vec<NsfwLevel>,
    /// Rating assumed for images without one
    pub unrated: u32,
}

impl Default for NsfwLadder {
    fn default() -> Self {
        let levels = [("PG", 1), ("PG13", 2), ("R", 4), ("X", 8), ("XXX", 16)]
            .into_iter()
            .map(|(name, value)| NsfwLevel { name: name.to_string(), value })
            .collect();

        Self { levels, unrated: 32 }
    }
}

impl NsfwLadder {
    /// Numeric value of a named level, matched case-insensitively
    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.levels
            .iter()
            .find(|level| level.name.eq_ignore_ascii_case(name))
            .map(|level| level.value)
    }

    /// Whether an image with `rating` may be fetched under `ceiling`.
    /// An unknown ceiling only admits the lowest level.
    pub fn allows(&self, ceiling: &str, rating: Option<u32>) -> bool {
        let rating = rating.unwrap_or(self.unrated);
        let limit = self
            .value_of(ceiling)
            .or_else(|| self.levels.first().map(|level| level.value))
            .unwrap_or(0);

        rating <= limit
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.levels.is_empty() {
            return Err("nsfw ladder must contain at least one level".to_string());
        }

        if self.levels.windows(2).any(|pair| pair[0].value >= pair[1].value) {
            return Err("nsfw ladder levels must be strictly ascending".to_string());
        }

        Ok(())
    }
}
