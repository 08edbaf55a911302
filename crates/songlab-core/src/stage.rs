//! Pipeline stages and the want/done flag model.
//!
//! A job requests a subset of the four analysis stages via "want" flags and
//! tracks progress via matching "done" flags. The next stage to execute is
//! always derived from the flags, never stored independently of them.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// One analysis stage. The declaration order is the fixed execution
/// priority: identification runs before separation, separation before
/// transcription, transcription before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[display("identify")]
    Identify,
    #[display("demucs")]
    Demucs,
    #[display("whisper")]
    Whisper,
    #[display("classify")]
    Classify,
}

impl Stage {
    /// All stages in execution priority order.
    pub const ORDER: [Stage; 4] = [
        Stage::Identify,
        Stage::Demucs,
        Stage::Whisper,
        Stage::Classify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Identify => "identify",
            Stage::Demucs => "demucs",
            Stage::Whisper => "whisper",
            Stage::Classify => "classify",
        }
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identify" => Ok(Stage::Identify),
            "demucs" => Ok(Stage::Demucs),
            "whisper" => Ok(Stage::Whisper),
            "classify" => Ok(Stage::Classify),
            other => Err(Error::UnknownStage(other.to_string())),
        }
    }
}

/// One boolean per stage. Used both for "wanted" and for "done" sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    #[serde(default)]
    pub identify: bool,
    #[serde(default)]
    pub demucs: bool,
    #[serde(default)]
    pub whisper: bool,
    #[serde(default)]
    pub classify: bool,
}

impl StageFlags {
    pub const NONE: StageFlags = StageFlags {
        identify: false,
        demucs: false,
        whisper: false,
        classify: false,
    };

    pub fn get(&self, stage: Stage) -> bool {
        match stage {
            Stage::Identify => self.identify,
            Stage::Demucs => self.demucs,
            Stage::Whisper => self.whisper,
            Stage::Classify => self.classify,
        }
    }

    pub fn set(&mut self, stage: Stage, value: bool) {
        match stage {
            Stage::Identify => self.identify = value,
            Stage::Demucs => self.demucs = value,
            Stage::Whisper => self.whisper = value,
            Stage::Classify => self.classify = value,
        }
    }

    /// True if any flag is set.
    pub fn any(&self) -> bool {
        self.identify || self.demucs || self.whisper || self.classify
    }

    /// Per-stage OR of two flag sets.
    pub fn union(self, other: StageFlags) -> StageFlags {
        StageFlags {
            identify: self.identify || other.identify,
            demucs: self.demucs || other.demucs,
            whisper: self.whisper || other.whisper,
            classify: self.classify || other.classify,
        }
    }
}

/// The first wanted stage whose done flag is still false, in priority
/// order, or `None` when every wanted stage is done.
pub fn next_stage(want: StageFlags, done: StageFlags) -> Option<Stage> {
    Stage::ORDER
        .into_iter()
        .find(|&stage| want.get(stage) && !done.get(stage))
}

/// A job is complete when every wanted stage is done. Stages that were
/// never wanted are vacuously satisfied, so a job wanting nothing is
/// complete from the start.
pub fn is_complete(want: StageFlags, done: StageFlags) -> bool {
    next_stage(want, done).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(identify: bool, demucs: bool, whisper: bool, classify: bool) -> StageFlags {
        StageFlags {
            identify,
            demucs,
            whisper,
            classify,
        }
    }

    #[test]
    fn test_next_stage_priority_order() {
        let want = flags(true, true, true, true);

        assert_eq!(next_stage(want, StageFlags::NONE), Some(Stage::Identify));
        assert_eq!(
            next_stage(want, flags(true, false, false, false)),
            Some(Stage::Demucs)
        );
        assert_eq!(
            next_stage(want, flags(true, true, false, false)),
            Some(Stage::Whisper)
        );
        assert_eq!(
            next_stage(want, flags(true, true, true, false)),
            Some(Stage::Classify)
        );
        assert_eq!(next_stage(want, want), None);
    }

    #[test]
    fn test_next_stage_skips_unwanted() {
        // Only whisper and classify requested: identify/demucs never run.
        let want = flags(false, false, true, true);
        assert_eq!(next_stage(want, StageFlags::NONE), Some(Stage::Whisper));
        assert_eq!(
            next_stage(want, flags(false, false, true, false)),
            Some(Stage::Classify)
        );
    }

    #[test]
    fn test_done_outside_want_is_ignored() {
        // Done flags for unwanted stages do not affect ordering.
        let want = flags(true, false, false, false);
        let done = flags(false, true, true, true);
        assert_eq!(next_stage(want, done), Some(Stage::Identify));
    }

    #[test]
    fn test_zero_want_is_complete() {
        assert!(is_complete(StageFlags::NONE, StageFlags::NONE));
        assert_eq!(next_stage(StageFlags::NONE, StageFlags::NONE), None);
    }

    #[test]
    fn test_complete_requires_all_wanted_done() {
        let want = flags(true, true, false, false);
        assert!(!is_complete(want, flags(true, false, false, false)));
        assert!(is_complete(want, flags(true, true, false, false)));
        // Extra done flags beyond want are fine.
        assert!(is_complete(want, flags(true, true, true, true)));
    }

    #[test]
    fn test_union() {
        let a = flags(true, false, true, false);
        let b = flags(false, false, true, true);
        assert_eq!(a.union(b), flags(true, false, true, true));
    }

    #[test]
    fn test_stage_string_roundtrip() {
        for stage in Stage::ORDER {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
            assert_eq!(stage.to_string(), stage.as_str());
        }
        assert!("preprocess".parse::<Stage>().is_err());
    }
}
