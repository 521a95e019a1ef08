use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::{observer, Event, EventKind, Observable, Observer, ObserverHub};

/// Minimal observable used to exercise the hub in isolation.
#[derive(Default)]
struct Subject {
    hub: Mutex<ObserverHub<Subject>>,
}

impl Observable for Subject {
    fn observer_hub(&self) -> &Mutex<ObserverHub<Self>> {
        &self.hub
    }
}

type Counts = Arc<Mutex<HashMap<String, usize>>>;

fn counting_observer(counts: &Counts) -> Observer<Subject> {
    let counts = counts.clone();
    observer(move |_: &Subject, event: &Event| {
        *counts.lock().entry(event.to_string()).or_default() += 1;
    })
}

fn count(counts: &Counts, key: &str) -> usize {
    counts.lock().get(key).copied().unwrap_or(0)
}

// ── Dispatch ────────────────────────────────────────────────────

#[test]
fn path_scoped_observer_receives_matching_events() {
    let subject = Subject::default();
    let counts = Counts::default();
    subject.subscribe(EventKind::Change, Some("field"), counting_observer(&counts));

    for _ in 0..10 {
        subject.publish(EventKind::Change, Some("field"));
    }
    assert_eq!(count(&counts, "change:field"), 10);
}

#[test]
fn removed_observer_no_longer_fires() {
    let subject = Subject::default();
    let counts = Counts::default();
    let obs = counting_observer(&counts);
    subject.subscribe(EventKind::Change, Some("field"), obs.clone());
    subject.publish(EventKind::Change, Some("field"));

    subject.unsubscribe(EventKind::Change, Some("field"), &obs);
    for _ in 0..10 {
        subject.publish(EventKind::Change, Some("field"));
    }
    assert_eq!(count(&counts, "change:field"), 1);
}

#[test]
fn generic_and_path_observers_both_fire() {
    let subject = Subject::default();
    let counts = Counts::default();
    let obs = counting_observer(&counts);
    subject.subscribe(EventKind::Change, Some("field"), obs.clone());
    subject.subscribe(EventKind::Change, None, obs.clone());

    for _ in 0..10 {
        subject.publish(EventKind::Change, Some("field"));
    }
    assert_eq!(count(&counts, "change:field"), 20);

    // A different path only reaches the generic subscriber.
    for _ in 0..10 {
        subject.publish(EventKind::Change, Some("other"));
    }
    assert_eq!(count(&counts, "change:other"), 10);
}

#[test]
fn generic_observers_run_before_path_observers() {
    let subject = Subject::default();
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    subject.subscribe(
        EventKind::Change,
        Some("name"),
        observer(move |_: &Subject, _: &Event| o.lock().push("path")),
    );
    let o = order.clone();
    subject.subscribe(
        EventKind::Change,
        None,
        observer(move |_: &Subject, _: &Event| o.lock().push("generic")),
    );

    subject.publish(EventKind::Change, Some("name"));
    assert_eq!(*order.lock(), vec!["generic", "path"]);
}

#[test]
fn duplicate_registrations_each_fire_and_are_removed_together() {
    let subject = Subject::default();
    let counts = Counts::default();
    let obs = counting_observer(&counts);
    subject.subscribe(EventKind::Sort, None, obs.clone());
    subject.subscribe(EventKind::Sort, None, obs.clone());

    subject.publish(EventKind::Sort, None);
    assert_eq!(count(&counts, "sort"), 2);

    subject.unsubscribe(EventKind::Sort, None, &obs);
    subject.publish(EventKind::Sort, None);
    assert_eq!(count(&counts, "sort"), 2);
    assert!(subject.observer_hub().lock().is_empty());
}

#[test]
fn unsubscribe_unknown_observer_is_noop() {
    let subject = Subject::default();
    let counts = Counts::default();
    subject.subscribe(EventKind::Add, None, counting_observer(&counts));
    subject.unsubscribe(EventKind::Add, None, &counting_observer(&counts));
    subject.unsubscribe(EventKind::Remove, Some("x"), &counting_observer(&counts));
    assert_eq!(subject.observer_hub().lock().len(), 1);
}

#[test]
fn observer_can_reenter_the_subject() {
    let subject = Arc::new(Subject::default());
    let counts = Counts::default();
    let c = counts.clone();
    subject.on(EventKind::Reset, move |s: &Subject, _| {
        // Publishing from inside an observer must not deadlock.
        s.publish(EventKind::Sort, None);
        *c.lock().entry("reentered".into()).or_default() += 1;
    });
    subject.publish(EventKind::Reset, None);
    assert_eq!(count(&counts, "reentered"), 1);
}

#[test]
fn event_display_includes_path() {
    assert_eq!(Event::new(EventKind::Sync, Some("fetch")).to_string(), "sync:fetch");
    assert_eq!(Event::new(EventKind::Reset, None).to_string(), "reset");
}

// ── Silent runs ─────────────────────────────────────────────────

#[test]
fn run_silent_suppresses_and_restores() {
    let subject = Subject::default();
    let counts = Counts::default();
    let obs = counting_observer(&counts);
    subject.subscribe(EventKind::Change, Some("field"), obs.clone());
    subject.subscribe(EventKind::Change, None, obs.clone());

    subject.run_silent(|s| {
        for _ in 0..10 {
            s.publish(EventKind::Change, Some("field"));
        }
    });
    assert_eq!(count(&counts, "change:field"), 0);

    subject.unsubscribe(EventKind::Change, Some("field"), &obs);
    for _ in 0..10 {
        subject.publish(EventKind::Change, Some("field"));
    }
    assert_eq!(count(&counts, "change:field"), 10);
}

#[test]
fn run_silent_returns_closure_result() {
    let subject = Subject::default();
    let answer = subject.run_silent(|_| 42);
    assert_eq!(answer, 42);
}

#[test]
fn run_silent_restores_after_panic() {
    let subject = Subject::default();
    let counts = Counts::default();
    subject.subscribe(EventKind::Add, None, counting_observer(&counts));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        subject.run_silent(|_| panic!("boom"));
    }));
    assert!(result.is_err());

    subject.publish(EventKind::Add, Some("x"));
    assert_eq!(count(&counts, "add:x"), 1);
}
