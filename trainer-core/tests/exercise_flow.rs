mod common;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::{at, note, sung};
use trainer_core::exercise::{
    ExerciseDefinition, ExerciseEvent, ExerciseMachine, ExercisePhase, ExerciseSettings,
};
use trainer_core::matching::HoldTracker;

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../data/exercises")
        .join(name)
}

fn settings() -> ExerciseSettings {
    ExerciseSettings {
        cent_tolerance: 30.0,
        hold_duration: Duration::from_secs(1),
        transposition: 0,
        feedback_delay: Duration::from_millis(1000),
    }
}

#[test]
fn hold_completes_on_first_frame_past_one_second() {
    let def = ExerciseDefinition::from_note_names("single", &["C4"]);
    let mut machine = ExerciseMachine::new(&def, settings()).unwrap();
    machine.start();

    let t0 = Instant::now();
    let c4 = sung(note("C4"), 12.0);
    let mut completed_at = Vec::new();
    for i in 0..=90 {
        let events = machine.update(Some(&c4), at(t0, i));
        if events.iter().any(|e| matches!(e, ExerciseEvent::NoteCompleted(_))) {
            completed_at.push(i);
        }
    }

    // Frame 59 is only 0.983 s into the hold.
    assert_eq!(completed_at, vec![60]);
}

#[test]
fn single_miss_restarts_the_hold() {
    let mut tracker = HoldTracker::new(30.0);
    let target = note("C4");
    let on = sung(target, -8.0);
    let off = sung(target, 45.0);
    let t0 = Instant::now();

    let mut first_full_hold = None;
    for i in 0..200 {
        let frame = if i == 30 { off } else { on };
        let state = tracker.update(Some(&frame), &target, at(t0, i));
        if i == 30 {
            assert!(!state.is_on_pitch);
            assert_eq!(state.hold_started_at, None);
        }
        if first_full_hold.is_none() && state.elapsed_hold >= Duration::from_secs(1) {
            first_full_hold = Some(i);
        }
    }
    assert_eq!(first_full_hold, Some(91));
}

#[test]
fn no_pitch_frame_also_breaks_the_hold() {
    let def = ExerciseDefinition::from_note_names("single", &["C4"]);
    let mut machine = ExerciseMachine::new(&def, settings()).unwrap();
    machine.start();

    let c4 = sung(note("C4"), 0.0);
    let t0 = Instant::now();
    for i in 0..120 {
        let details = if i == 45 { None } else { Some(&c4) };
        machine.update(details, at(t0, i));
        if i < 106 {
            assert_eq!(machine.phase(), ExercisePhase::Listening, "frame {i}");
        }
    }
    assert_eq!(machine.phase(), ExercisePhase::Feedback);
}

#[test]
fn three_note_exercise_runs_to_completion() {
    let def = ExerciseDefinition::from_note_names("triad", &["C4", "E4", "G4"]);
    let mut machine = ExerciseMachine::new(&def, settings()).unwrap();

    let mut phases = vec![machine.phase()];
    let record = |phase: ExercisePhase, phases: &mut Vec<ExercisePhase>| {
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
    };

    let mut events = machine.start();
    record(machine.phase(), &mut phases);

    let t0 = Instant::now();
    let mut frame = 0;
    while machine.phase() != ExercisePhase::Finished {
        let target = machine.target().expect("running exercise has a target");
        let details = sung(target, 5.0);
        events.extend(machine.update(Some(&details), at(t0, frame)));
        record(machine.phase(), &mut phases);
        frame += 1;
        assert!(frame < 1000, "exercise never finished");
    }

    assert_eq!(
        phases,
        vec![
            ExercisePhase::Idle,
            ExercisePhase::Listening,
            ExercisePhase::Feedback,
            ExercisePhase::Listening,
            ExercisePhase::Feedback,
            ExercisePhase::Listening,
            ExercisePhase::Feedback,
            ExercisePhase::Finished,
        ]
    );
    assert_eq!(machine.run().scores.len(), 3);
    assert_eq!(machine.run().current_index, 3);

    let tones: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ExerciseEvent::ReferenceTone(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(tones, vec!["C4", "E4", "G4"]);

    let summary = machine.summary().unwrap();
    assert!((summary.average_abs_cents - 5.0).abs() < 0.01);
    assert!(matches!(events.last(), Some(ExerciseEvent::Finished(_))));
}

#[test]
fn finished_ignores_frames_until_restart() {
    let def = ExerciseDefinition::from_note_names("one", &["A4"]);
    let mut machine = ExerciseMachine::new(&def, settings()).unwrap();
    machine.start();
    let a4 = sung(note("A4"), 0.0);
    let t0 = Instant::now();
    for i in 0..200 {
        machine.update(Some(&a4), at(t0, i));
    }
    assert_eq!(machine.phase(), ExercisePhase::Finished);
    assert!(machine.update(Some(&a4), at(t0, 300)).is_empty());
    assert_eq!(machine.run().current_index, 1);

    machine.restart();
    assert_eq!(machine.phase(), ExercisePhase::Idle);
    assert!(machine.summary().is_none());
}

#[test]
fn octave_up_transposition_keeps_intervals() {
    let def = ExerciseDefinition::load(data_file("five_note_sequence_c4.json")).unwrap();
    let original = def.resolve(0).unwrap();
    let shifted = def.resolve(12).unwrap();

    assert_eq!(original.len(), 9);
    for (a, b) in original.iter().zip(&shifted) {
        assert_eq!(b.note_number(), a.note_number() + 12);
        assert_eq!(b.pitch_class, a.pitch_class);
    }
    let steps = |notes: &[trainer_core::Note]| -> Vec<i32> {
        notes.windows(2).map(|w| w[1].note_number() - w[0].note_number()).collect()
    };
    assert_eq!(steps(&original), steps(&shifted));

    let machine = ExerciseMachine::new(
        &def,
        ExerciseSettings {
            transposition: 12,
            ..settings()
        },
    )
    .unwrap();
    assert_eq!(machine.run().notes, shifted);
}

#[test]
fn bundled_exercises_are_valid() {
    for name in [
        "five_note_sequence_c4.json",
        "major_arpeggio_g3.json",
        "interval_major_third_f4.json",
    ] {
        let def = ExerciseDefinition::load(data_file(name)).unwrap();
        assert!(!def.title.is_empty(), "{name} has no title");
        assert!(ExerciseMachine::new(&def, settings()).is_ok(), "{name} does not resolve");
    }
}
