use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Policy deciding whether a cassette replays, records, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Replay only. A missing cassette or a missing interaction is an error.
    None,
    /// Replay what matches, record what does not.
    #[default]
    NewEpisodes,
    /// Always call the backend and overwrite matching interactions.
    All,
    /// Record into a fresh cassette, then replay.
    Once,
}
impl RecordMode {
    pub fn can_record(&self) -> bool {
        matches!(self, Self::All | Self::NewEpisodes | Self::Once)
    }

    pub fn replays(&self) -> bool {
        !matches!(self, Self::All)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NewEpisodes => "new_episodes",
            Self::All => "all",
            Self::Once => "once",
        }
    }
}
impl Display for RecordMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown record mode {0:?}, expected one of none, new_episodes, all, once")]
pub struct ParseRecordModeError(pub String);

impl FromStr for RecordMode {
    type Err = ParseRecordModeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "new_episodes" => Ok(Self::NewEpisodes),
            "all" => Ok(Self::All),
            "once" => Ok(Self::Once),
            _ => Err(ParseRecordModeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_record() {
        assert!(!RecordMode::None.can_record());
        assert!(RecordMode::NewEpisodes.can_record());
        assert!(RecordMode::All.can_record());
        assert!(RecordMode::Once.can_record());
        assert_eq!(RecordMode::default(), RecordMode::NewEpisodes);
    }

    #[test]
    fn test_only_all_skips_replay() {
        assert!(!RecordMode::All.replays());
        assert!(RecordMode::None.replays());
        assert!(RecordMode::Once.replays());
    }

    #[test]
    fn test_parse() {
        assert_eq!("none".parse(), Ok(RecordMode::None));
        assert_eq!("NEW_EPISODES".parse(), Ok(RecordMode::NewEpisodes));
        assert_eq!("new-episodes".parse(), Ok(RecordMode::NewEpisodes));
        assert_eq!(" all ".parse(), Ok(RecordMode::All));
        assert_eq!("ONCE".parse(), Ok(RecordMode::Once));
        assert_eq!("sometimes".parse::<RecordMode>(), Err(ParseRecordModeError("sometimes".to_string())));
    }

    #[test]
    fn test_display_parses_back() {
        for mode in [RecordMode::None, RecordMode::NewEpisodes, RecordMode::All, RecordMode::Once] {
            assert_eq!(mode.to_string().parse(), Ok(mode));
        }
    }
}
