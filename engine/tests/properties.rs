//! Property tests for hexmemo-engine invariants

use hexmemo_engine::{
    color, reduce, Action, Difficulty, EngineConfig, GameResult, GameSnapshot, ManualClock,
    MemoryStorage, PersistenceStore,
};
use proptest::prelude::*;

fn arb_difficulty() -> impl Strategy<Value = Difficulty> {
    prop_oneof![
        Just(Difficulty::Easy),
        Just(Difficulty::Medium),
        Just(Difficulty::Hard),
    ]
}

fn arb_result() -> impl Strategy<Value = GameResult> {
    (any::<bool>(), 0u32..400, arb_difficulty(), 0.0f64..=100.0, 0u64..120_000).prop_map(
        |(won, score, difficulty, accuracy, time)| {
            if won {
                GameResult::win(score, difficulty, accuracy, time)
            } else {
                GameResult::loss(difficulty, accuracy, time)
            }
        },
    )
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u32..0x0100_0000).prop_map(|c| Action::start_game(format!("#{c:06x}"), None)),
        arb_difficulty().prop_map(|d| Action::start_game("#808080", Some(d))),
        Just(Action::ActivateRound),
        (-500i64..500).prop_map(|delta| Action::UpdateScore { delta }),
        Just(Action::UseTip),
        Just(Action::UseComputerTip),
        any::<bool>().prop_map(|won| Action::EndGame { won }),
        Just(Action::ResetState),
    ]
}

fn arb_hex() -> impl Strategy<Value = String> {
    (0u32..0x0100_0000).prop_map(|c| format!("#{c:06x}"))
}

fn store(max_scores: usize) -> PersistenceStore {
    PersistenceStore::new(
        MemoryStorage::new(),
        ManualClock::at_millis(1_706_745_600_000),
        EngineConfig::default().with_max_scores(max_scores),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_high_scores_stay_sorted_and_bounded(
        results in prop::collection::vec(arb_result(), 0..30),
        max_scores in 1usize..8,
    ) {
        let mut store = store(max_scores);
        for result in &results {
            store.record_game(result).unwrap();
        }

        let board = store.high_scores();
        prop_assert!(board.is_well_ordered(max_scores));
        prop_assert!(board.scores.iter().all(|e| e.score > 0));
    }

    #[test]
    fn prop_statistics_counters_agree(results in prop::collection::vec(arb_result(), 0..40)) {
        let mut store = store(10);
        for result in &results {
            store.record_game(result).unwrap();
        }

        let config = EngineConfig::default();
        let stats = store.statistics();
        prop_assert!(stats.validate(config.max_accuracy_history).is_ok());
        prop_assert_eq!(stats.total_games, results.len() as u64);
        prop_assert_eq!(stats.games_won + stats.games_lost, stats.total_games);
        prop_assert!(stats.best_streak >= stats.current_streak);
        let played: u64 = stats.difficulty_stats.values().map(|d| d.played).sum();
        prop_assert_eq!(played, stats.total_games);
    }

    #[test]
    fn prop_reducer_is_deterministic_and_valid(actions in prop::collection::vec(arb_action(), 0..25)) {
        let config = EngineConfig::default();
        let clock = ManualClock::at_millis(1_706_745_600_000);
        let start = GameSnapshot::initial(hexmemo_engine::Clock::now(&clock));

        let run = || {
            actions.iter().enumerate().fold(start.clone(), |state, (i, action)| {
                let now = start.system.started_at + chrono::Duration::seconds(i as i64);
                reduce(&state, action, now, &config).unwrap()
            })
        };

        let first = run();
        prop_assert_eq!(&first, &run());
        prop_assert!(first.validate(&config).is_ok());
    }

    #[test]
    fn prop_identical_colors_match_fully(hex in arb_hex()) {
        let comparison = color::compare_colors(&hex, &hex).unwrap();
        prop_assert!((comparison.percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn prop_match_percentage_is_symmetric_and_bounded(a in arb_hex(), b in arb_hex()) {
        let ab = color::compare_colors(&a, &b).unwrap();
        let ba = color::compare_colors(&b, &a).unwrap();
        prop_assert!((0.0..=100.0).contains(&ab.percentage));
        prop_assert!((ab.percentage - ba.percentage).abs() < 1e-9);
    }
}
