//! Calendar boundary behavior: blocked state must always have an escape
//! path at the day or week rollover, even with no new activity.

use chrono::{Duration, TimeZone, Utc, Weekday};
use std::sync::Arc;
use webtime_limit::infrastructure::mocks::{MockClock, RecordingSink};
use webtime_limit::{
    CanonicalHost, DelayOutcome, EnforcementAction, EnforcementState, HostPattern, LimitEngine,
    LimitKind, LimitRule, RuleId, WeekStart,
};

fn friday_evening() -> chrono::DateTime<Utc> {
    // 2024-03-15 is a Friday
    Utc.with_ymd_and_hms(2024, 3, 15, 22, 0, 0).unwrap()
}

fn engine_with(
    clock: &MockClock,
    sink: &RecordingSink,
    week_start: WeekStart,
) -> LimitEngine {
    LimitEngine::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sink(Arc::new(sink.clone()))
        .with_week_start(week_start)
        .build()
        .unwrap()
}

async fn block_daily(engine: &LimitEngine) -> RuleId {
    let rule = LimitRule::draft(
        HostPattern::parse("example.com").unwrap(),
        LimitKind::Daily,
        600,
    )
    .with_delay(5);
    let rule_id = engine.rules().add(rule).unwrap();
    engine.record("example.com", 600, true).await;
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Blocked
    );
    rule_id
}

#[tokio::test]
async fn test_midnight_resets_blocked_daily_rule() {
    let clock = MockClock::new(friday_evening());
    let sink = RecordingSink::new();
    let engine = engine_with(&clock, &sink, WeekStart::default());
    let rule_id = block_daily(&engine).await;

    // Past midnight, with no new activity recorded.
    clock.advance(Duration::hours(3));
    engine.request_evaluate("example.com");

    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Idle
    );
    assert_eq!(
        sink.actions().last(),
        Some(&EnforcementAction::HideOverlay {
            host: CanonicalHost::new("example.com"),
            rule_id,
        })
    );
}

#[tokio::test]
async fn test_weekly_rule_survives_midnight_resets_at_week_start() {
    let clock = MockClock::new(friday_evening());
    let sink = RecordingSink::new();
    let engine = engine_with(&clock, &sink, WeekStart(Weekday::Mon));
    let rule = LimitRule::draft(
        HostPattern::parse("example.com").unwrap(),
        LimitKind::Weekly,
        600,
    );
    let rule_id = engine.rules().add(rule).unwrap();
    engine.record("example.com", 600, true).await;
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Blocked
    );

    // Saturday: same week, still blocked.
    clock.advance(Duration::hours(12));
    engine.request_evaluate("example.com");
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Blocked
    );

    // Monday: new week, released.
    clock.advance(Duration::days(2));
    engine.request_evaluate("example.com");
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Idle
    );
}

#[tokio::test]
async fn test_delay_crossing_midnight_resets_to_idle() {
    let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 23, 58, 0).unwrap());
    let sink = RecordingSink::new();
    let engine = engine_with(&clock, &sink, WeekStart::default());
    let rule_id = block_daily(&engine).await;

    let outcome = engine.request_delay("example.com", rule_id).await;
    assert_eq!(outcome, DelayOutcome::Granted(5));

    // The delay outlives the day; the boundary wins over the re-block.
    clock.advance(Duration::minutes(6));
    engine.request_evaluate("example.com");
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Idle
    );
}

#[tokio::test]
async fn test_fresh_consumption_after_reset_blocks_again() {
    let clock = MockClock::new(friday_evening());
    let sink = RecordingSink::new();
    let engine = engine_with(&clock, &sink, WeekStart::default());
    let rule_id = block_daily(&engine).await;

    clock.advance(Duration::hours(3));
    engine.request_evaluate("example.com");
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Idle
    );

    // The new day has a fresh budget, which can be spent again.
    engine.record("example.com", 599, true).await;
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Idle
    );
    engine.record("example.com", 1, false).await;
    assert_eq!(
        engine.current_state("example.com", rule_id),
        EnforcementState::Blocked
    );
}
