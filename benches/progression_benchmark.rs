use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use fitness_progression::config::ProgressionSettings;
use fitness_progression::models::{ProgressEvent, XpCategory};
use fitness_progression::services::reconcile::reconcile;
use fitness_progression::services::{CatalogService, EventRouter, LevelCurve, RecordingNotifier};
use fitness_progression::time_utils::FixedClock;
use std::hint::black_box;
use std::sync::Arc;

fn benchmark_level_curve(c: &mut Criterion) {
    let curve = LevelCurve::default();
    let start = curve.initial_state();

    let mut group = c.benchmark_group("level_curve");

    group.bench_function("apply_small_grant", |b| {
        b.iter(|| curve.apply_xp(black_box(&start), black_box(25)))
    });

    group.bench_function("apply_grant_to_max_level", |b| {
        b.iter(|| curve.apply_xp(black_box(&start), black_box(10_000_000)))
    });

    group.bench_function("state_for_total", |b| {
        b.iter(|| curve.state_for_total(black_box(123_456), &start))
    });

    group.finish();
}

fn benchmark_reconcile(c: &mut Criterion) {
    let settings = ProgressionSettings::default();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap(),
    ));
    let router = EventRouter::new(
        settings.clone(),
        clock.clone(),
        Arc::new(RecordingNotifier::default()),
    );
    let catalog =
        CatalogService::load_from_file("data/catalog.json").expect("Failed to load catalog");

    // Two devices with a shared past and a month of divergent activity each
    let mut local = router.new_state("bench-user");
    router
        .initialize_achievements(&mut local, catalog.catalog())
        .expect("Failed to seed catalog");
    let mut remote = local.clone();

    for day in 0..30 {
        clock.advance(chrono::Duration::days(1));
        router
            .dispatch(
                &mut local,
                ProgressEvent::WorkoutCompleted {
                    workout_id: format!("w{}", day),
                    duration_minutes: 45,
                },
            )
            .expect("Failed to dispatch workout");
        router
            .dispatch(
                &mut remote,
                ProgressEvent::VideoWatched {
                    video_id: format!("v{}", day),
                    duration_seconds: 600,
                },
            )
            .expect("Failed to dispatch video");
        router
            .add_xp(&mut remote, 5, "Bonus", XpCategory::Bonus)
            .expect("Failed to add XP");
    }

    let curve = *router.curve();
    c.bench_function("reconcile_divergent_month", |b| {
        b.iter(|| {
            reconcile(
                black_box(&local),
                black_box(&remote),
                &curve,
                settings.xp_history_cap,
            )
        })
    });
}

criterion_group!(benches, benchmark_level_curve, benchmark_reconcile);
criterion_main!(benches);
