//! Pure bracket extraction: raw draw-page markup -> `CanonicalBracket`.
//!
//! No I/O happens here; the same input always yields byte-identical output,
//! which keeps re-parsing and re-aggregation safe.

use bscout_core::{
    BracketRound, CanonicalBracket, CategoryDescriptor, Corner, CornerSide, MatchRecord,
    WinnerResolution,
};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

pub const CRATE_NAME: &str = "bscout-extract";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no round blocks found in markup")]
    NoRounds,
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("malformed bracket at round {round_index} slot {slot_index}: {detail}")]
    MalformedBracket {
        round_index: u32,
        slot_index: u32,
        detail: String,
    },
}

fn sel(raw: &str) -> Result<Selector, ExtractError> {
    Selector::parse(raw).map_err(|_| ExtractError::Selector(raw.to_string()))
}

/// One parsed corner cell: the competitor (if occupied) plus the markers the
/// cell carried.
#[derive(Debug, Clone, Default)]
struct CornerCell {
    corner: Option<Corner>,
    marked_winner: bool,
    walkover: bool,
}

/// Transform one raw draw page into a validated canonical bracket.
///
/// Round blocks are taken in source order (earliest round first); two
/// consecutive corner cells form one match; slots are assigned left to right,
/// zero-based. Winner inference priority: explicit marker, then score margin,
/// then bye auto-advance, otherwise the match stays unresolved.
pub fn extract_bracket(
    raw: &str,
    event_id: &str,
    category_id: &str,
) -> Result<CanonicalBracket, ExtractError> {
    let document = Html::parse_document(raw);

    let round_sel = sel("div.tournament-bracket__round")?;
    let round_title_sel = sel("h3.tournament-bracket__round-title")?;
    let item_sel = sel("li.tournament-bracket__item")?;

    let (event_name, category_label) = parse_title(&document)?;

    let mut rounds = Vec::new();
    let mut slot_spans = Vec::new();
    let mut round_index = 0u32;

    for round_el in document.select(&round_sel) {
        let label = round_el
            .select(&round_title_sel)
            .next()
            .map(|t| normalize_text(&t.text().collect::<String>()))
            .unwrap_or_else(|| format!("Round {}", round_index + 1));

        let cells: Vec<CornerCell> = round_el
            .select(&item_sel)
            .map(|item| parse_corner_cell(&item))
            .collect::<Result<_, _>>()?;

        let mut matches = Vec::new();
        let mut slot_index = 0u32;
        for pair in cells.chunks(2) {
            let red_cell = pair.first().cloned().unwrap_or_default();
            let blue_cell = pair.get(1).cloned().unwrap_or_default();
            // A fully vacant pair still occupies its slot: the positional
            // index is the join key to slot `i / 2` of the next round.
            if red_cell.corner.is_some() || blue_cell.corner.is_some() {
                matches.push(build_match(
                    event_id,
                    category_id,
                    round_index,
                    &label,
                    slot_index,
                    red_cell,
                    blue_cell,
                ));
            }
            slot_index += 1;
        }

        if matches.is_empty() {
            continue;
        }
        rounds.push(BracketRound { label, matches });
        slot_spans.push(slot_index);
        round_index += 1;
    }

    if rounds.is_empty() {
        return Err(ExtractError::NoRounds);
    }

    // Round sizes shrink toward the final: each round may hold at most half
    // (rounded up) the slots of its predecessor.
    for i in 1..rounds.len() {
        let allowed = slot_spans[i - 1].div_ceil(2);
        if slot_spans[i] > allowed {
            return Err(ExtractError::MalformedBracket {
                round_index: i as u32,
                slot_index: 0,
                detail: format!(
                    "round {:?} has {} slots where {:?} allows at most {}",
                    rounds[i].label,
                    slot_spans[i],
                    rounds[i - 1].label,
                    allowed
                ),
            });
        }
    }

    let bracket = CanonicalBracket {
        event_id: event_id.to_string(),
        category_id: category_id.to_string(),
        event_name,
        category_label,
        rounds,
    };

    bracket
        .check_winner_propagation()
        .map_err(|v| ExtractError::MalformedBracket {
            round_index: v.round_index,
            slot_index: v.slot_index,
            detail: v.detail,
        })?;

    Ok(bracket)
}

/// Category links from an event's draw listing page: every anchor carrying a
/// `catid=` query parameter, in document order, deduplicated by id. The link
/// text becomes the label; an id with no text keeps itself as the label.
pub fn extract_category_list(
    raw: &str,
    event_id: &str,
) -> Result<Vec<CategoryDescriptor>, ExtractError> {
    let document = Html::parse_document(raw);
    let link_sel = sel("a[href]")?;

    let mut categories: Vec<CategoryDescriptor> = Vec::new();
    for link in document.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        let Some(category_id) = query_param(href, "catid") else {
            continue;
        };
        if category_id.is_empty() || categories.iter().any(|c| c.category_id == category_id) {
            continue;
        }
        let mut descriptor = CategoryDescriptor::bare(event_id, category_id);
        let label = normalize_text(&link.text().collect::<String>());
        if !label.is_empty() {
            descriptor.label = label;
        }
        categories.push(descriptor);
    }
    Ok(categories)
}

fn query_param(href: &str, name: &str) -> Option<String> {
    let (_, query) = href.split_once('?')?;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == name {
                let value = value.split('#').next().unwrap_or(value);
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Event name and category label from the page header. The header `h3`
/// carries the event on its first text line and the category on the second;
/// missing pieces fall back to empty strings rather than failing the parse.
fn parse_title(document: &Html) -> Result<(String, String), ExtractError> {
    let header_sel = sel("div.newsheader h3")?;
    let Some(h3) = document.select(&header_sel).next() else {
        return Ok((String::new(), String::new()));
    };
    let lines: Vec<String> = h3
        .text()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .collect();
    match lines.as_slice() {
        [] => Ok((String::new(), String::new())),
        [only] => Ok((String::new(), only.clone())),
        [event, category, ..] => Ok((event.clone(), category.clone())),
    }
}

fn parse_corner_cell(item: &ElementRef<'_>) -> Result<CornerCell, ExtractError> {
    let caption_sel = sel(".tournament-bracket__caption_info")?;
    let info2_sel = sel(".tournament-bracket__caption_info2")?;
    let code_sel = sel("abbr.tournament-bracket__code")?;
    let number_sel = sel("span.tournament-bracket__number")?;

    let classes = item.value().attr("class").unwrap_or_default();
    let mut cell = CornerCell {
        marked_winner: has_modifier_class(classes, "winner"),
        walkover: has_modifier_class(classes, "walkover"),
        ..CornerCell::default()
    };

    let mut name = String::new();
    let mut country = String::new();

    if let Some(caption) = item.select(&caption_sel).next() {
        let mut raw_text = caption.text().collect::<Vec<_>>().join(" ");
        // The federation span reads "FEDERATION NAME,CC"; strip it from the
        // caption and keep the country as a fallback for the abbr code.
        if let Some(info2) = caption.select(&info2_sel).next() {
            let info_text = info2.text().collect::<Vec<_>>().join(" ");
            if let Some((_, cc)) = info_text.rsplit_once(',') {
                country = normalize_text(cc);
            }
            raw_text = raw_text.replace(info_text.trim(), "");
        }
        name = normalize_text(&raw_text);
    }

    if let Some(abbr) = item.select(&code_sel).next() {
        let from_title = abbr.value().attr("title").map(normalize_text);
        let from_text = normalize_text(&abbr.text().collect::<String>());
        match from_title {
            Some(t) if !t.is_empty() => country = t,
            _ if !from_text.is_empty() => country = from_text,
            _ => {}
        }
    }

    let mut score = None;
    if let Some(number) = item.select(&number_sel).next() {
        let text = normalize_text(&number.text().collect::<String>());
        if is_walkover_cue(&text) {
            cell.walkover = true;
        } else if let Ok(value) = text.parse::<u32>() {
            score = Some(value);
        }
    }

    // An empty cell or a literal BYE placeholder means the corner is vacant.
    if name.eq_ignore_ascii_case("bye") {
        return Ok(cell);
    }
    if !name.is_empty() || !country.is_empty() {
        cell.corner = Some(Corner {
            athlete_name: name,
            country_code: country,
            score,
        });
    }
    Ok(cell)
}

#[allow(clippy::too_many_arguments)]
fn build_match(
    event_id: &str,
    category_id: &str,
    round_index: u32,
    round_label: &str,
    slot_index: u32,
    red_cell: CornerCell,
    blue_cell: CornerCell,
) -> MatchRecord {
    let is_walkover = red_cell.walkover || blue_cell.walkover;
    let red = red_cell.corner;
    let blue = blue_cell.corner;

    let (winner, resolution, is_bye) = if red_cell.marked_winner {
        (Some(CornerSide::Red), WinnerResolution::ExplicitMarker, false)
    } else if blue_cell.marked_winner {
        (Some(CornerSide::Blue), WinnerResolution::ExplicitMarker, false)
    } else if let (Some(r), Some(b)) = (&red, &blue) {
        match (r.score, b.score) {
            (Some(rs), Some(bs)) if rs > bs => {
                (Some(CornerSide::Red), WinnerResolution::ScoreMargin, false)
            }
            (Some(rs), Some(bs)) if bs > rs => {
                (Some(CornerSide::Blue), WinnerResolution::ScoreMargin, false)
            }
            _ => (None, WinnerResolution::Unresolved, false),
        }
    } else if red.is_some() {
        (Some(CornerSide::Red), WinnerResolution::ByeAdvance, true)
    } else {
        (Some(CornerSide::Blue), WinnerResolution::ByeAdvance, true)
    };

    MatchRecord {
        event_id: event_id.to_string(),
        category_id: category_id.to_string(),
        round_index,
        round_label: round_label.to_string(),
        slot_index,
        red,
        blue,
        winner,
        resolution,
        is_bye,
        is_walkover,
    }
}

/// Match a BEM-style state modifier as a whole class token: `winner` or
/// `*--winner`, never a substring of an unrelated class name.
fn has_modifier_class(classes: &str, modifier: &str) -> bool {
    classes.split_whitespace().any(|token| {
        token
            .strip_suffix(modifier)
            .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with("--"))
    })
}

fn is_walkover_cue(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    matches!(lower.as_str(), "wo" | "w.o." | "w.o" | "walkover")
}

/// Collapse whitespace runs (including NBSP) into single spaces and trim.
fn normalize_text(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable dump of a parsed bracket, used by the CLI to preview a
/// category before merging.
pub fn format_bracket_summary(bracket: &CanonicalBracket) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Event: {}", display_or_unknown(&bracket.event_name)));
    lines.push(format!(
        "Category: {}",
        display_or_unknown(&bracket.category_label)
    ));
    let total: usize = bracket.rounds.iter().map(|r| r.matches.len()).sum();
    lines.push(format!("Total Matches: {total}"));

    for round in &bracket.rounds {
        lines.push(String::new());
        lines.push(format!("=== {} ===", round.label));
        for m in &round.matches {
            lines.push(format!("  {}", format_corner(m, CornerSide::Red)));
            lines.push(format!("  vs {}", format_corner(m, CornerSide::Blue)));
            if m.is_walkover {
                lines.push("  (walkover)".to_string());
            }
        }
    }
    lines.join("\n")
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "Unknown"
    } else {
        value
    }
}

fn format_corner(m: &MatchRecord, side: CornerSide) -> String {
    let marker = if m.winner == Some(side) { " [W]" } else { "" };
    match m.corner(side) {
        Some(c) => {
            let score = c
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("{} ({}) [{}]{}", c.athlete_name, c.country_code, score, marker)
        }
        None => format!("BYE{marker}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_block(label: &str, items: &[String]) -> String {
        format!(
            "<div class=\"tournament-bracket__round\">\
             <h3 class=\"tournament-bracket__round-title\">{label}</h3>\
             <ul>{}</ul></div>",
            items.concat()
        )
    }

    fn item(name: &str, cc: &str, score: &str, extra_class: &str) -> String {
        let number = if score.is_empty() {
            String::new()
        } else {
            format!("<span class=\"tournament-bracket__number\">{score}</span>")
        };
        format!(
            "<li class=\"tournament-bracket__item{extra_class}\">\
             <table><tr><td class=\"tournament-bracket__caption_info\">{name}\
             <span class=\"tournament-bracket__caption_info2\">FED {name},{cc}</span>\
             </td></tr></table>\
             <abbr class=\"tournament-bracket__code\" title=\"{cc}\">{cc}</abbr>\
             {number}</li>"
        )
    }

    fn empty_item() -> String {
        "<li class=\"tournament-bracket__item\"></li>".to_string()
    }

    fn page(rounds: &[String]) -> String {
        format!(
            "<html><body><div class=\"newsheader\"><h3>Asian Championship<br/>Adults Male -94kg</h3></div>{}</body></html>",
            rounds.concat()
        )
    }

    #[test]
    fn score_margin_resolves_winner_without_marker() {
        let html = page(&[round_block(
            "Final",
            &[item("A", "KSA", "10", ""), item("B", "UAE", "5", "")],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert_eq!(m.winner, Some(CornerSide::Red));
        assert_eq!(m.resolution, WinnerResolution::ScoreMargin);
        assert!(!m.is_bye);
        assert_eq!(m.red.as_ref().unwrap().score, Some(10));
    }

    #[test]
    fn explicit_marker_resolves_winner() {
        let html = page(&[round_block(
            "Final",
            &[
                item("A", "KSA", "2", ""),
                item("B", "UAE", "9", " tournament-bracket__item--winner"),
            ],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert_eq!(m.winner, Some(CornerSide::Blue));
        assert_eq!(m.resolution, WinnerResolution::ExplicitMarker);
    }

    #[test]
    fn marker_on_lower_score_still_wins() {
        let html = page(&[round_block(
            "Final",
            &[
                item("A", "KSA", "9", " tournament-bracket__item--winner"),
                item("B", "UAE", "12", ""),
            ],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert_eq!(m.winner, Some(CornerSide::Red));
        assert_eq!(m.resolution, WinnerResolution::ExplicitMarker);
    }

    #[test]
    fn single_named_corner_is_a_bye_auto_advance() {
        let html = page(&[round_block(
            "Round 1",
            &[item("A", "KSA", "", ""), empty_item()],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert!(m.is_bye);
        assert_eq!(m.winner, Some(CornerSide::Red));
        assert_eq!(m.resolution, WinnerResolution::ByeAdvance);
        assert!(m.red.as_ref().unwrap().score.is_none());
    }

    #[test]
    fn literal_bye_placeholder_counts_as_vacant_corner() {
        let html = page(&[round_block(
            "Round 1",
            &[item("BYE", "", "", ""), item("B", "UAE", "", "")],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert!(m.is_bye);
        assert_eq!(m.winner, Some(CornerSide::Blue));
    }

    #[test]
    fn scoreless_pair_without_marker_stays_unresolved() {
        let html = page(&[round_block(
            "Final",
            &[item("A", "KSA", "", ""), item("B", "UAE", "", "")],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert_eq!(m.winner, None);
        assert_eq!(m.resolution, WinnerResolution::Unresolved);
        assert!(!m.is_bye);
    }

    #[test]
    fn equal_scores_without_marker_stay_unresolved() {
        let html = page(&[round_block(
            "Final",
            &[item("A", "KSA", "7", ""), item("B", "UAE", "7", "")],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        assert_eq!(bracket.rounds[0].matches[0].winner, None);
    }

    #[test]
    fn walkover_cue_in_score_span_flags_the_match() {
        let html = page(&[round_block(
            "Final",
            &[
                item("A", "KSA", "WO", " tournament-bracket__item--winner"),
                item("B", "UAE", "", ""),
            ],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert!(m.is_walkover);
        assert_eq!(m.winner, Some(CornerSide::Red));
        assert_eq!(m.resolution, WinnerResolution::ExplicitMarker);
    }

    #[test]
    fn federation_span_is_stripped_from_the_name() {
        let html = page(&[round_block(
            "Final",
            &[
                item("Omar Nada", "KSA", "5", ""),
                item("Aslan Bek", "KAZ", "2", ""),
            ],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let red = bracket.rounds[0].matches[0].red.as_ref().unwrap();
        assert_eq!(red.athlete_name, "Omar Nada");
        assert_eq!(red.country_code, "KSA");
    }

    #[test]
    fn title_block_yields_event_and_category() {
        let html = page(&[round_block(
            "Final",
            &[item("A", "KSA", "1", ""), item("B", "UAE", "0", "")],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        assert_eq!(bracket.event_name, "Asian Championship");
        assert_eq!(bracket.category_label, "Adults Male -94kg");
    }

    #[test]
    fn winner_propagation_violation_is_malformed_bracket() {
        let html = page(&[
            round_block(
                "Semifinal",
                &[
                    item("A", "KSA", "10", ""),
                    item("B", "UAE", "2", ""),
                    item("C", "JPN", "8", ""),
                    item("D", "KAZ", "3", ""),
                ],
            ),
            // B reaches the final despite losing slot 0.
            round_block("Final", &[item("B", "UAE", "", ""), item("C", "JPN", "", "")]),
        ]);
        let err = extract_bracket(&html, "714", "9001").unwrap_err();
        match err {
            ExtractError::MalformedBracket {
                round_index,
                slot_index,
                ..
            } => {
                assert_eq!(round_index, 0);
                assert_eq!(slot_index, 0);
            }
            other => panic!("expected MalformedBracket, got {other:?}"),
        }
    }

    #[test]
    fn preliminary_round_with_irregular_size_is_accepted() {
        // 3 entrants: one preliminary match feeds a 2-match second round
        // where the prelim winner meets a seeded athlete and one slot is a bye.
        let html = page(&[
            round_block(
                "Preliminary",
                &[item("A", "KSA", "6", ""), item("B", "UAE", "1", "")],
            ),
            round_block(
                "Final",
                &[item("A", "KSA", "4", ""), item("C", "JPN", "2", "")],
            ),
        ]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        assert_eq!(bracket.rounds.len(), 2);
        assert_eq!(bracket.rounds[0].label, "Preliminary");
    }

    #[test]
    fn vacant_pair_keeps_later_slots_positional() {
        // Quarterfinal pair 1 is fully vacant; the remaining matches must
        // keep slots 0, 2, 3 so the winner of slot 2 still feeds semifinal
        // slot 1.
        let html = page(&[
            round_block(
                "Quarterfinal",
                &[
                    item("A", "KSA", "5", ""),
                    item("B", "UAE", "1", ""),
                    empty_item(),
                    empty_item(),
                    item("C", "JPN", "9", ""),
                    item("D", "KAZ", "0", ""),
                    item("E", "MGL", "3", ""),
                    item("F", "IRQ", "2", ""),
                ],
            ),
            round_block(
                "Semifinal",
                &[
                    item("A", "KSA", "2", ""),
                    empty_item(),
                    item("C", "JPN", "4", ""),
                    item("E", "MGL", "1", ""),
                ],
            ),
            round_block(
                "Final",
                &[item("A", "KSA", "6", ""), item("C", "JPN", "8", "")],
            ),
        ]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let slots: Vec<u32> = bracket.rounds[0]
            .matches
            .iter()
            .map(|m| m.slot_index)
            .collect();
        assert_eq!(slots, vec![0, 2, 3]);
        assert!(bracket.check_winner_propagation().is_ok());
    }

    #[test]
    fn round_larger_than_half_its_predecessor_is_malformed() {
        let html = page(&[
            round_block(
                "Semifinal",
                &[item("A", "KSA", "", ""), item("B", "UAE", "", "")],
            ),
            round_block(
                "Final",
                &[
                    item("A", "KSA", "", ""),
                    item("C", "JPN", "", ""),
                    item("D", "KAZ", "", ""),
                    item("E", "MGL", "", ""),
                ],
            ),
        ]);
        let err = extract_bracket(&html, "714", "9001").unwrap_err();
        match err {
            ExtractError::MalformedBracket { round_index, .. } => assert_eq!(round_index, 1),
            other => panic!("expected MalformedBracket, got {other:?}"),
        }
    }

    #[test]
    fn halving_rounds_pass_the_size_check() {
        let html = page(&[
            round_block(
                "Semifinal",
                &[
                    item("A", "KSA", "5", ""),
                    item("B", "UAE", "1", ""),
                    item("C", "JPN", "3", ""),
                    item("D", "KAZ", "2", ""),
                ],
            ),
            round_block(
                "Final",
                &[item("A", "KSA", "7", ""), item("C", "JPN", "4", "")],
            ),
        ]);
        assert!(extract_bracket(&html, "714", "9001").is_ok());
    }

    #[test]
    fn unrelated_class_names_are_not_winner_markers() {
        let html = page(&[round_block(
            "Final",
            &[
                item("A", "KSA", "", " prizewinner walkover-note"),
                item("B", "UAE", "", ""),
            ],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let m = &bracket.rounds[0].matches[0];
        assert_eq!(m.winner, None);
        assert_eq!(m.resolution, WinnerResolution::Unresolved);
        assert!(!m.is_walkover);
    }

    #[test]
    fn category_list_collects_catid_links_in_order() {
        let html = "<html><body>\
            <a href=\"popup_main.php?popup_action=mitschrift&catid=4128&verid=714\">Adults Male -94kg</a>\
            <a href=\"veranstaltung_info_main.php?active_menu=calendar&vernr=714\">Back</a>\
            <a href=\"popup_main.php?popup_action=mitschrift&catid=4131&verid=714\">Adults Female -62kg</a>\
            <a href=\"popup_main.php?popup_action=mitschrift&catid=4128&verid=714\">Adults Male -94kg (again)</a>\
            </body></html>";
        let categories = extract_category_list(html, "714").expect("parse");
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].category_id, "4128");
        assert_eq!(categories[0].label, "Adults Male -94kg");
        assert_eq!(categories[1].category_id, "4131");
        assert_eq!(categories[1].event_id, "714");
    }

    #[test]
    fn parse_is_deterministic() {
        let html = page(&[round_block(
            "Final",
            &[item("A", "KSA", "10", ""), item("B", "UAE", "5", "")],
        )]);
        let first = extract_bracket(&html, "714", "9001").expect("first parse");
        let second = extract_bracket(&html, "714", "9001").expect("second parse");
        let a = serde_json::to_vec(&first).expect("serialize first");
        let b = serde_json::to_vec(&second).expect("serialize second");
        assert_eq!(a, b);
    }

    #[test]
    fn markup_without_rounds_is_rejected() {
        let err = extract_bracket("<html><body>Please verify you are not a robot</body></html>", "714", "9001")
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoRounds));
    }

    #[test]
    fn summary_marks_winners_and_byes() {
        let html = page(&[round_block(
            "Final",
            &[item("A", "KSA", "10", ""), item("B", "UAE", "5", "")],
        )]);
        let bracket = extract_bracket(&html, "714", "9001").expect("parse");
        let summary = format_bracket_summary(&bracket);
        assert!(summary.contains("=== Final ==="));
        assert!(summary.contains("A (KSA) [10] [W]"));
        assert!(summary.contains("vs B (UAE) [5]"));
    }
}
