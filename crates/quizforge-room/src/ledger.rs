//! Score ledger and leaderboard ranking.

use std::collections::HashMap;

use quizforge_protocol::{LeaderboardEntry, PlayerId};
use quizforge_store::ScoreRecord;

#[derive(Debug, Clone)]
struct LedgerEntry {
    seq: u64,
    name: String,
    score: i64,
}

/// Accumulated scores for one room.
///
/// Entries outlive roster membership: a guest who leaves keeps their row
/// (and name) so the final leaderboard still shows them. The quiz master
/// is never enrolled.
#[derive(Debug, Clone, Default)]
pub struct ScoreLedger {
    entries: HashMap<PlayerId, LedgerEntry>,
    next_seq: u64,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zero entry for `id` unless one exists.
    pub fn enroll(&mut self, id: &PlayerId, name: &str) {
        if self.entries.contains_key(id) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id.clone(),
            LedgerEntry {
                seq,
                name: name.to_string(),
                score: 0,
            },
        );
    }

    /// Adds `delta` to an enrolled player and returns the new total.
    pub fn add(&mut self, id: &PlayerId, delta: i64) -> Option<i64> {
        let entry = self.entries.get_mut(id)?;
        entry.score = entry.score.saturating_add(delta);
        Some(entry.score)
    }

    pub fn score(&self, id: &PlayerId) -> i64 {
        self.entries.get(id).map_or(0, |e| e.score)
    }

    /// Ranks every entry except `exclude`: score descending, then join
    /// order. Ranks run 1..=N with no shared places.
    pub fn leaderboard<F>(&self, exclude: &PlayerId, avatar_of: F) -> Vec<LeaderboardEntry>
    where
        F: Fn(&PlayerId) -> Option<String>,
    {
        let mut rows: Vec<(&PlayerId, &LedgerEntry)> =
            self.entries.iter().filter(|(id, _)| *id != exclude).collect();
        rows.sort_by(|(_, a), (_, b)| b.score.cmp(&a.score).then(a.seq.cmp(&b.seq)));

        rows.into_iter()
            .enumerate()
            .map(|(i, (id, entry))| LeaderboardEntry {
                player_id: id.clone(),
                name: entry.name.clone(),
                score: entry.score,
                rank: i + 1,
                avatar: avatar_of(id),
            })
            .collect()
    }

    /// Entries in join order, for persistence.
    pub fn to_records(&self) -> Vec<ScoreRecord> {
        let mut rows: Vec<_> = self.entries.iter().collect();
        rows.sort_by_key(|(_, e)| e.seq);
        rows.into_iter()
            .map(|(id, e)| ScoreRecord {
                player_id: id.clone(),
                name: e.name.clone(),
                score: e.score,
            })
            .collect()
    }

    pub fn from_records(records: Vec<ScoreRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            ledger.enroll(&record.player_id, &record.name);
            ledger.add(&record.player_id, record.score);
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
