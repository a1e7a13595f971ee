//! Text rendering of tick reports and progress for the terminal.

use trainer_core::exercise::{ExerciseEvent, ExerciseSummary};
use trainer_core::progress::{LifetimeProgress, ProgressStats};
use trainer_core::tuning::PitchFeedback;
use trainer_core::TickReport;

/// Width of the cent meter, one cell per 5 cents.
const METER_CELLS: usize = 21;

/// One status line: detected note, cent meter, hold progress.
pub fn status_line(report: &TickReport, hold_secs: f32) -> String {
    let Some(details) = report.smoothed_details() else {
        return format!("{:<6} {}", "--", empty_meter());
    };

    let target = match (report.target, report.feedback) {
        (Some(target), Some(feedback)) => format!(" -> {} {}", target, feedback_marker(feedback)),
        (Some(target), None) => format!(" -> {}", target),
        _ => String::new(),
    };

    let hold = if report.match_state.is_on_pitch {
        format!(
            "  hold {:.1}/{:.1}s",
            report.match_state.elapsed_hold_secs(),
            hold_secs
        )
    } else {
        String::new()
    };

    format!(
        "{:<6} {} {:+6.1}c {:7.2} Hz{}{}",
        details.note().to_string(),
        cent_meter(details.display_cents()),
        details.cents,
        details.frequency,
        target,
        hold
    )
}

fn feedback_marker(feedback: PitchFeedback) -> &'static str {
    match feedback {
        PitchFeedback::Correct => "[ok]",
        PitchFeedback::OctaveMiss => "[octave]",
        PitchFeedback::Wrong => "[x]",
    }
}

fn empty_meter() -> String {
    format!("[{}]", " ".repeat(METER_CELLS))
}

/// `[----|----]` style needle for a value in [-50, 50].
fn cent_meter(cents: f32) -> String {
    let center = METER_CELLS / 2;
    let offset = (cents / 5.0).round() as isize;
    let needle = (center as isize + offset).clamp(0, METER_CELLS as isize - 1) as usize;
    let cells: String = (0..METER_CELLS)
        .map(|i| match i {
            i if i == needle => '|',
            i if i == center => ':',
            _ => '-',
        })
        .collect();
    format!("[{}]", cells)
}

pub fn event_line(event: &ExerciseEvent) -> String {
    match event {
        ExerciseEvent::ReferenceTone(note) => format!("Sing {} ({:.1} Hz)", note, note.frequency()),
        ExerciseEvent::NoteCompleted(score) => {
            format!("Completed {} at {:+.1} cents", score.note, score.cents)
        }
        ExerciseEvent::Finished(summary) => summary_text(summary),
    }
}

pub fn summary_text(summary: &ExerciseSummary) -> String {
    let mut text = format!(
        "Exercise finished: {} notes, average deviation {:.1} cents",
        summary.scores.len(),
        summary.average_abs_cents
    );
    if let Some(worst) = summary.worst {
        text.push_str(&format!("; least accurate {} ({:+.1} cents)", worst.note, worst.cents));
    }
    text
}

pub fn stats_text(title: &str, stats: &ProgressStats) -> String {
    let mut lines = vec![title.to_string()];
    let total: f64 = stats.note_seconds.values().sum();
    lines.push(format!("  time in tune: {:.1}s", total));
    if let Some(hold) = &stats.longest_hold {
        lines.push(format!("  longest hold: {:.1}s on {}", hold.seconds, hold.note));
    }
    if let Some(best) = &stats.best_intonation {
        lines.push(format!("  best intonation: ±{:.1} cents on {}", best.cents, best.note));
    }
    if let Some((note, secs)) = stats.favourite_note() {
        lines.push(format!("  favourite note: {} ({:.1}s)", note, secs));
    }
    lines.join("\n")
}

pub fn level_text(progress: &LifetimeProgress) -> String {
    let (level, into, span) = progress.level_progress();
    format!("Level {} ({} / {} xp, {} total)", level, into, span, progress.xp)
}
