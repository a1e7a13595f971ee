//! # Practice Progress
//!
//! Accumulates practice statistics from the per-frame in-tune stream:
//! seconds held in tune per note, the longest contiguous hold, and the
//! best rolling intonation. Two accumulators receive every update, one
//! for the current session and one kept across sessions.
//!
//! The lifetime accumulator also carries experience points, a level
//! derived from them, and the day of the last practice.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

/// Experience awarded per committed in-tune second.
pub const XP_PER_SECOND: f64 = 1.0;

/// XP needed to reach level `i + 1`.
pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 120, 360, 720, 1500, 3000, 6000, 12000, 24000, 50000];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldRecord {
    pub seconds: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntonationRecord {
    /// Mean |cents| over a full rolling window.
    pub cents: f32,
    pub note: String,
}

/// One accumulator: session or lifetime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressStats {
    /// Total in-tune seconds per note name.
    pub note_seconds: BTreeMap<String, f64>,
    pub longest_hold: Option<HoldRecord>,
    pub best_intonation: Option<IntonationRecord>,
}

impl ProgressStats {
    fn commit_hold(&mut self, note: &str, seconds: f64) {
        *self.note_seconds.entry(note.to_string()).or_default() += seconds;
        if self.longest_hold.as_ref().is_none_or(|h| seconds > h.seconds) {
            self.longest_hold = Some(HoldRecord {
                seconds,
                note: note.to_string(),
            });
        }
    }

    fn offer_intonation(&mut self, note: &str, cents: f32) {
        if self.best_intonation.as_ref().is_none_or(|b| cents < b.cents) {
            self.best_intonation = Some(IntonationRecord {
                cents,
                note: note.to_string(),
            });
        }
    }

    /// The note with the most accumulated in-tune time.
    pub fn favourite_note(&self) -> Option<(&str, f64)> {
        self.note_seconds
            .iter()
            .fold(None, |best: Option<(&str, f64)>, (note, &secs)| match best {
                Some((_, best_secs)) if best_secs >= secs => best,
                _ => Some((note.as_str(), secs)),
            })
    }
}

/// Lifetime accumulator plus gamification fields. This is what gets
/// persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeProgress {
    pub xp: u64,
    /// Caller-supplied day label (e.g. `2024-05-01`) of the last commit.
    pub last_practice_day: Option<String>,
    #[serde(flatten)]
    pub stats: ProgressStats,
}

impl LifetimeProgress {
    /// 1-based level for the current XP.
    pub fn level(&self) -> usize {
        LEVEL_THRESHOLDS.iter().filter(|&&t| self.xp >= t).count().max(1)
    }

    /// `(level, xp earned inside the level, xp the level spans)`. At the
    /// top level the span is the XP earned past the last threshold.
    pub fn level_progress(&self) -> (usize, u64, u64) {
        let level = self.level();
        let floor = LEVEL_THRESHOLDS[level - 1];
        let ceiling = LEVEL_THRESHOLDS.get(level).copied().unwrap_or(self.xp);
        (level, self.xp - floor, ceiling - floor)
    }

    pub fn practiced_on(&self, day: &str) -> bool {
        self.last_practice_day.as_deref() == Some(day)
    }
}

/// What the session reports for one frame that counts as in tune.
#[derive(Debug, Clone, PartialEq)]
pub struct InTuneFrame {
    pub note: String,
    pub abs_cents: f32,
}

#[derive(Debug, Clone)]
struct Streak {
    note: String,
    started_at: Instant,
    elapsed: Duration,
}

/// Feeds both accumulators from the in-tune stream.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    session: ProgressStats,
    all_time: LifetimeProgress,
    window: usize,
    recent_cents: VecDeque<f32>,
    streak: Option<Streak>,
    today: Option<String>,
    dirty: bool,
}

impl ProgressTracker {
    /// # Arguments
    /// * `all_time` - Previously persisted lifetime stats
    /// * `window` - In-tune frames averaged for the best-intonation record
    pub fn new(all_time: LifetimeProgress, window: usize) -> Self {
        Self {
            session: ProgressStats::default(),
            all_time,
            window: window.max(1),
            recent_cents: VecDeque::with_capacity(window),
            streak: None,
            today: None,
            dirty: false,
        }
    }

    /// Sets the label recorded as `last_practice_day` on the next commit.
    pub fn set_today(&mut self, day: impl Into<String>) {
        self.today = Some(day.into());
    }

    pub fn session(&self) -> &ProgressStats {
        &self.session
    }

    pub fn all_time(&self) -> &LifetimeProgress {
        &self.all_time
    }

    /// Length of the open streak, zero when out of tune.
    pub fn current_streak(&self) -> Duration {
        self.streak.as_ref().map(|s| s.elapsed).unwrap_or_default()
    }

    /// Drops the session accumulator. Lifetime stats are untouched.
    pub fn start_session(&mut self) {
        self.close_streak();
        self.session = ProgressStats::default();
    }

    /// True once since the last call if anything persistent changed.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Re-flags unsaved changes, e.g. after a failed write.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Feeds one frame. `in_tune` is `None` for any frame that does not
    /// count (no pitch, wrong note, out of tolerance).
    pub fn observe(&mut self, now: Instant, in_tune: Option<InTuneFrame>) {
        let Some(frame) = in_tune else {
            self.close_streak();
            return;
        };

        if self.streak.as_ref().is_some_and(|s| s.note != frame.note) {
            self.close_streak();
        }

        let streak = self.streak.get_or_insert_with(|| Streak {
            note: frame.note.clone(),
            started_at: now,
            elapsed: Duration::ZERO,
        });
        streak.elapsed = now.saturating_duration_since(streak.started_at);

        self.recent_cents.push_back(frame.abs_cents);
        if self.recent_cents.len() > self.window {
            self.recent_cents.pop_front();
        }
        if self.recent_cents.len() == self.window {
            let average = self.recent_cents.iter().sum::<f32>() / self.window as f32;
            self.session.offer_intonation(&frame.note, average);
            let before = self.all_time.stats.best_intonation.clone();
            self.all_time.stats.offer_intonation(&frame.note, average);
            if self.all_time.stats.best_intonation != before {
                self.dirty = true;
            }
        }
    }

    /// Commits the open streak, if any, to both accumulators.
    pub fn close_streak(&mut self) {
        self.recent_cents.clear();
        let Some(streak) = self.streak.take() else {
            return;
        };
        let seconds = streak.elapsed.as_secs_f64();

        self.session.commit_hold(&streak.note, seconds);
        self.all_time.stats.commit_hold(&streak.note, seconds);
        self.all_time.xp += (seconds * XP_PER_SECOND).round() as u64;
        if let Some(today) = &self.today {
            self.all_time.last_practice_day = Some(today.clone());
        }
        self.dirty = true;
        debug!("[PROGRESS] Committed {:.2}s on {}", seconds, streak.note);
    }
}
