//! Verdict engine: grade + entry mode + exit availability → action.

use crate::types::{Action, EntryMode, Grade, Verdict};

/// Decide PLAY / WAIT / SKIP. Rules apply in order:
/// grade C, then missing entry window, then missing exit plan all SKIP;
/// A plays, B waits for confirmation.
pub fn decide_verdict(grade: Grade, mode: EntryMode, has_exit: bool) -> Verdict {
    let (action, reason) = match (grade, mode, has_exit) {
        (Grade::C, _, _) => (Action::Skip, "score C (weak setup)"),
        (_, EntryMode::Wait, _) => (Action::Skip, "no clean entry window"),
        (_, _, false) => (Action::Skip, "exit plan unavailable (risk not controllable)"),
        (Grade::A, _, true) => (Action::Play, "score A + valid entry + exit plan ready"),
        (Grade::B, _, true) => (Action::Wait, "score B (needs confirmation / safer trigger)"),
    };
    Verdict {
        action,
        reason: reason.to_string(),
    }
}
