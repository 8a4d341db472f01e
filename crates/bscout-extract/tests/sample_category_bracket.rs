use std::path::{Path, PathBuf};

use bscout_core::{CornerSide, WinnerResolution};
use bscout_extract::{extract_bracket, format_bracket_summary};

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("fixtures/sample-category/bracket.html")
}

fn fixture_html() -> String {
    std::fs::read_to_string(fixture_path()).expect("read bracket fixture")
}

#[test]
fn full_bracket_parses_with_bye_and_walkover() {
    let bracket = extract_bracket(&fixture_html(), "714", "9001").expect("parse fixture");

    assert_eq!(bracket.event_name, "Asian Ju-Jitsu Championship 2026");
    assert_eq!(bracket.category_label, "Adults Male -94kg");
    assert_eq!(
        bracket.round_labels(),
        vec!["Quarterfinal", "Semifinal", "Final"]
    );
    assert_eq!(bracket.rounds[0].matches.len(), 4);
    assert_eq!(bracket.rounds[1].matches.len(), 2);
    assert_eq!(bracket.rounds[2].matches.len(), 1);

    let bye = &bracket.rounds[0].matches[1];
    assert!(bye.is_bye);
    assert_eq!(bye.resolution, WinnerResolution::ByeAdvance);
    assert_eq!(bye.winner_corner().unwrap().athlete_name, "OMAR NADA");
    assert!(bye.blue.is_none());

    let walkover = &bracket.rounds[0].matches[2];
    assert!(walkover.is_walkover);
    assert_eq!(walkover.winner, Some(CornerSide::Red));
    assert_eq!(walkover.winner_corner().unwrap().athlete_name, "TANAKA HIRO");

    let final_match = &bracket.rounds[2].matches[0];
    assert_eq!(final_match.winner_corner().unwrap().athlete_name, "OMAR NADA");
    assert_eq!(final_match.winner_corner().unwrap().country_code, "KSA");
}

#[test]
fn fixture_parse_is_byte_identical_across_runs() {
    let html = fixture_html();
    let first = extract_bracket(&html, "714", "9001").expect("first parse");
    let second = extract_bracket(&html, "714", "9001").expect("second parse");
    let a = serde_json::to_vec(&first).expect("serialize first");
    let b = serde_json::to_vec(&second).expect("serialize second");
    assert_eq!(a, b);
}

#[test]
fn fixture_summary_lists_every_round() {
    let bracket = extract_bracket(&fixture_html(), "714", "9001").expect("parse fixture");
    let summary = format_bracket_summary(&bracket);
    assert!(summary.contains("Event: Asian Ju-Jitsu Championship 2026"));
    assert!(summary.contains("=== Quarterfinal ==="));
    assert!(summary.contains("=== Semifinal ==="));
    assert!(summary.contains("=== Final ==="));
    assert!(summary.contains("OMAR NADA (KSA) [6] [W]"));
    assert!(summary.contains("(walkover)"));
}
