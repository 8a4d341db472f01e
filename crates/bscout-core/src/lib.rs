//! Core domain model for Bracket Scout: events, categories, matches, brackets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "bscout-core";

/// One competition instance, sourced from the external event catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub event_id: String,
    pub event_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Mixed,
}

/// One weight/gender bracket within an event. Unique key: `(event_id, category_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub event_id: String,
    pub category_id: String,
    pub label: String,
    pub gender: Option<Gender>,
    pub weight_class: Option<String>,
}

impl CategoryDescriptor {
    pub fn bare(event_id: impl Into<String>, category_id: impl Into<String>) -> Self {
        let category_id = category_id.into();
        Self {
            event_id: event_id.into(),
            label: category_id.clone(),
            category_id,
            gender: None,
            weight_class: None,
        }
    }
}

/// One side of a match cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corner {
    pub athlete_name: String,
    pub country_code: String,
    pub score: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CornerSide {
    Red,
    Blue,
}

/// How the winner of a match was determined during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinnerResolution {
    /// The markup carried an explicit winner marker.
    ExplicitMarker,
    /// Both corners scored; the higher score won.
    ScoreMargin,
    /// Only one corner was occupied; that athlete advances.
    ByeAdvance,
    /// Nothing identified a winner. Downstream treats the match as missing.
    Unresolved,
}

/// One match within a round. `slot_index` is zero-based, left to right;
/// the winner of slot `i` feeds slot `i / 2` in the following round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub event_id: String,
    pub category_id: String,
    pub round_index: u32,
    pub round_label: String,
    pub slot_index: u32,
    pub red: Option<Corner>,
    pub blue: Option<Corner>,
    pub winner: Option<CornerSide>,
    pub resolution: WinnerResolution,
    pub is_bye: bool,
    pub is_walkover: bool,
}

impl MatchRecord {
    pub fn corner(&self, side: CornerSide) -> Option<&Corner> {
        match side {
            CornerSide::Red => self.red.as_ref(),
            CornerSide::Blue => self.blue.as_ref(),
        }
    }

    pub fn winner_corner(&self) -> Option<&Corner> {
        self.winner.and_then(|side| self.corner(side))
    }

    pub fn loser_corner(&self) -> Option<&Corner> {
        match self.winner? {
            CornerSide::Red => self.blue.as_ref(),
            CornerSide::Blue => self.red.as_ref(),
        }
    }

    /// Side occupied by the given athlete, if they appear in this match.
    pub fn side_of(&self, athlete: &AthleteKey) -> Option<CornerSide> {
        if self.red.as_ref().is_some_and(|c| athlete.matches(c)) {
            Some(CornerSide::Red)
        } else if self.blue.as_ref().is_some_and(|c| athlete.matches(c)) {
            Some(CornerSide::Blue)
        } else {
            None
        }
    }
}

/// One round block, in source order (earliest/largest round first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketRound {
    pub label: String,
    pub matches: Vec<MatchRecord>,
}

/// A whole single-elimination bracket for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalBracket {
    pub event_id: String,
    pub category_id: String,
    pub event_name: String,
    pub category_label: String,
    pub rounds: Vec<BracketRound>,
}

/// A winner at `(round_index, slot_index)` that does not reappear in the
/// following round's feeding slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationViolation {
    pub round_index: u32,
    pub slot_index: u32,
    pub detail: String,
}

impl CanonicalBracket {
    pub fn round_labels(&self) -> Vec<String> {
        self.rounds.iter().map(|r| r.label.clone()).collect()
    }

    pub fn all_matches(&self) -> impl Iterator<Item = &MatchRecord> {
        self.rounds.iter().flat_map(|r| r.matches.iter())
    }

    /// Check that every resolved winner reappears as a competitor of the
    /// match it feeds. Byes in the fed slot trivially satisfy the invariant;
    /// unresolved matches and slots beyond a shrunken next round are skipped.
    pub fn check_winner_propagation(&self) -> Result<(), PropagationViolation> {
        for window in self.rounds.windows(2) {
            let (round, next) = (&window[0], &window[1]);
            for m in &round.matches {
                let Some(winner) = m.winner_corner() else {
                    continue;
                };
                let fed_slot = m.slot_index / 2;
                let Some(fed) = next.matches.iter().find(|n| n.slot_index == fed_slot) else {
                    // Preliminary rounds feed irregularly; absence is tolerated.
                    continue;
                };
                if fed.is_bye {
                    continue;
                }
                let key = AthleteKey::of(winner);
                if fed.side_of(&key).is_none() {
                    return Err(PropagationViolation {
                        round_index: m.round_index,
                        slot_index: m.slot_index,
                        detail: format!(
                            "winner {:?} of round {:?} slot {} missing from slot {} of round {:?}",
                            winner.athlete_name, round.label, m.slot_index, fed_slot, next.label
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Athlete identity used by the derived index and the path analyzer.
/// Name comparison is case-insensitive; country codes compare verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AthleteKey {
    pub name: String,
    pub country_code: String,
}

impl AthleteKey {
    pub fn new(name: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country_code: country_code.into(),
        }
    }

    pub fn of(corner: &Corner) -> Self {
        Self::new(corner.athlete_name.clone(), corner.country_code.clone())
    }

    pub fn matches(&self, corner: &Corner) -> bool {
        corner.athlete_name.eq_ignore_ascii_case(&self.name)
            && corner.country_code == self.country_code
    }
}

/// Write-once artifact of one successful category fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub event_id: String,
    pub category_id: String,
    pub fetched_at: DateTime<Utc>,
    pub raw_content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(name: &str, cc: &str, score: Option<u32>) -> Option<Corner> {
        Some(Corner {
            athlete_name: name.to_string(),
            country_code: cc.to_string(),
            score,
        })
    }

    fn m(
        round_index: u32,
        slot_index: u32,
        red: Option<Corner>,
        blue: Option<Corner>,
        winner: Option<CornerSide>,
    ) -> MatchRecord {
        MatchRecord {
            event_id: "714".into(),
            category_id: "9001".into(),
            round_index,
            round_label: format!("Round {}", round_index + 1),
            slot_index,
            red,
            blue,
            winner,
            resolution: if winner.is_some() {
                WinnerResolution::ScoreMargin
            } else {
                WinnerResolution::Unresolved
            },
            is_bye: false,
            is_walkover: false,
        }
    }

    fn bracket(rounds: Vec<BracketRound>) -> CanonicalBracket {
        CanonicalBracket {
            event_id: "714".into(),
            category_id: "9001".into(),
            event_name: "Test Event".into(),
            category_label: "Adults Male -94kg".into(),
            rounds,
        }
    }

    #[test]
    fn propagation_holds_when_winners_advance() {
        let b = bracket(vec![
            BracketRound {
                label: "Semifinal".into(),
                matches: vec![
                    m(0, 0, corner("A", "KSA", Some(10)), corner("B", "UAE", Some(2)), Some(CornerSide::Red)),
                    m(0, 1, corner("C", "JPN", Some(5)), corner("D", "KAZ", Some(8)), Some(CornerSide::Blue)),
                ],
            },
            BracketRound {
                label: "Final".into(),
                matches: vec![m(1, 0, corner("A", "KSA", None), corner("D", "KAZ", None), None)],
            },
        ]);
        assert!(b.check_winner_propagation().is_ok());
    }

    #[test]
    fn propagation_violation_carries_round_and_slot() {
        let b = bracket(vec![
            BracketRound {
                label: "Semifinal".into(),
                matches: vec![
                    m(0, 0, corner("A", "KSA", Some(10)), corner("B", "UAE", Some(2)), Some(CornerSide::Red)),
                    m(0, 1, corner("C", "JPN", Some(9)), corner("D", "KAZ", Some(1)), Some(CornerSide::Red)),
                ],
            },
            BracketRound {
                label: "Final".into(),
                // D reached the final despite losing the semifinal.
                matches: vec![m(1, 0, corner("A", "KSA", None), corner("D", "KAZ", None), None)],
            },
        ]);
        let violation = b.check_winner_propagation().unwrap_err();
        assert_eq!(violation.round_index, 0);
        assert_eq!(violation.slot_index, 1);
    }

    #[test]
    fn propagation_tolerates_bye_in_fed_slot() {
        let mut fed = m(1, 0, corner("X", "MGL", None), None, Some(CornerSide::Red));
        fed.is_bye = true;
        fed.resolution = WinnerResolution::ByeAdvance;
        let b = bracket(vec![
            BracketRound {
                label: "Quarterfinal".into(),
                matches: vec![m(
                    0,
                    0,
                    corner("A", "KSA", Some(3)),
                    corner("B", "UAE", Some(1)),
                    Some(CornerSide::Red),
                )],
            },
            BracketRound {
                label: "Semifinal".into(),
                matches: vec![fed],
            },
        ]);
        assert!(b.check_winner_propagation().is_ok());
    }

    #[test]
    fn athlete_key_name_match_is_case_insensitive() {
        let key = AthleteKey::new("Omar Nada", "KSA");
        let c = Corner {
            athlete_name: "OMAR NADA".into(),
            country_code: "KSA".into(),
            score: None,
        };
        assert!(key.matches(&c));
        let other = Corner {
            athlete_name: "OMAR NADA".into(),
            country_code: "UAE".into(),
            score: None,
        };
        assert!(!key.matches(&other));
    }
}
