//! Display-ready aggregates derived from the persisted documents.

use crate::{
    document::{Difficulty, GameStatistics, HighScoreBoard, HighScoreEntry},
    store::PersistenceStore,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Number of high scores included by [`StatsSummary::from_store`].
pub const DEFAULT_TOP_SCORES: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultySummary {
    pub played: u64,
    pub won: u64,
    pub win_rate: f64,
    /// Average score per win
    pub average_score: f64,
}

/// Read-only view over statistics and high scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_games: u64,
    pub games_won: u64,
    pub games_lost: u64,
    /// `gamesWon / totalGames`, 0 with no games
    pub win_rate: f64,
    /// Mean of the bounded accuracy history
    pub average_accuracy: f64,
    pub average_score: f64,
    pub best_score: u32,
    pub best_time: Option<u64>,
    pub current_streak: u32,
    pub best_streak: u32,
    pub per_difficulty: BTreeMap<Difficulty, DifficultySummary>,
    pub top_scores: Vec<HighScoreEntry>,
}

impl StatsSummary {
    /// Build from the store. A missing document reads as its default.
    pub fn from_store(store: &mut PersistenceStore) -> Self {
        let statistics = store.statistics();
        let board = store.high_scores();
        Self::from_documents(&statistics, &board, DEFAULT_TOP_SCORES)
    }

    pub fn from_documents(statistics: &GameStatistics, board: &HighScoreBoard, top_n: usize) -> Self {
        let per_difficulty = statistics
            .difficulty_stats
            .iter()
            .map(|(difficulty, stats)| {
                let summary = DifficultySummary {
                    played: stats.played,
                    won: stats.won,
                    win_rate: stats.win_rate(),
                    average_score: ratio(stats.total_score as f64, stats.won),
                };
                (*difficulty, summary)
            })
            .collect();

        let history = &statistics.accuracy_history;
        Self {
            total_games: statistics.total_games,
            games_won: statistics.games_won,
            games_lost: statistics.games_lost,
            win_rate: ratio(statistics.games_won as f64, statistics.total_games),
            average_accuracy: ratio(history.iter().sum(), history.len() as u64),
            average_score: ratio(statistics.total_score as f64, statistics.games_won),
            best_score: statistics.best_score,
            best_time: statistics.best_time,
            current_streak: statistics.current_streak,
            best_streak: statistics.best_streak,
            per_difficulty,
            top_scores: board.top(top_n, None).into_iter().cloned().collect(),
        }
    }
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "games {} (won {}, lost {}), win rate {:.1}%",
            self.total_games,
            self.games_won,
            self.games_lost,
            self.win_rate * 100.0
        )?;
        writeln!(
            f,
            "average accuracy {:.2}%, average score {:.1}, best score {}",
            self.average_accuracy, self.average_score, self.best_score
        )?;
        if let Some(best) = self.best_time {
            writeln!(f, "best time {:.1}s", best as f64 / 1000.0)?;
        }
        writeln!(f, "streak {} (best {})", self.current_streak, self.best_streak)?;
        for (difficulty, summary) in &self.per_difficulty {
            writeln!(
                f,
                "  {difficulty:<6} played {:>3}  won {:>3}  win rate {:>5.1}%",
                summary.played,
                summary.won,
                summary.win_rate * 100.0
            )?;
        }
        for (rank, entry) in self.top_scores.iter().enumerate() {
            writeln!(
                f,
                "  #{:<2} {:>4} pts  {:>6.1}s  {}",
                rank + 1,
                entry.score,
                entry.time as f64 / 1000.0,
                entry.difficulty
            )?;
        }
        Ok(())
    }
}
