#![allow(non_snake_case)]

use super::{
    BossEngine,
    EngineResult,
    FixedChance,
};
use crate::{
    app::{
        boss_store::BossStore,
        in_memory_store::InMemoryBossStore,
    },
    clock::{
        Clock,
        ManualClock,
        PhasePolicy,
        week_key,
    },
    config::GameConfig,
    model::{
        CRIT_PERK,
        Character,
        CharacterStatus,
        EngineError,
        Inventory,
        Rejection,
    },
    payment::StaticPaymentVerifier,
};
use chrono::{
    DateTime,
    Duration,
    TimeZone,
    Utc,
};
use proptest::prelude::*;

type TestEngine =
    BossEngine<InMemoryBossStore, StaticPaymentVerifier, ManualClock, FixedChance>;

// A Saturday morning, inside the fight window.
fn saturday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 29, 8, 0, 0).unwrap()
}

fn friday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 28, 8, 0, 0).unwrap()
}

// Roll value that never trips the 10% destabilization threshold.
const CALM: f64 = 0.99;
// Roll value that always trips it.
const UNLUCKY: f64 = 0.0;

fn engine_with(
    config: GameConfig,
    chance: f64,
    payments: StaticPaymentVerifier,
) -> (TestEngine, ManualClock) {
    let clock = ManualClock::new(saturday());
    let engine = BossEngine::new(
        InMemoryBossStore::new(),
        payments,
        clock.clone(),
        FixedChance(chance),
        config,
        PhasePolicy::AlwaysOpen,
    );
    (engine, clock)
}

fn engine() -> (TestEngine, ManualClock) {
    engine_with(
        GameConfig::default(),
        CALM,
        StaticPaymentVerifier::accepting(),
    )
}

/// Active run plus an idle character with the reference gear loadout:
/// armor 2, engine 1, scanner 0, score 300, so base power is 21.
fn enroll(engine: &mut TestEngine, wallet: &str) {
    let week_start = engine.current_week();
    let store = engine.store_mut();
    store.set_active_run(week_start, wallet).unwrap();
    store
        .put_character(&Character {
            wallet: wallet.into(),
            armor: 2,
            engine: 1,
            scanner: 0,
            score: 300,
            status: CharacterStatus::Idle,
            perks: Vec::new(),
        })
        .unwrap();
}

fn give_inventory(engine: &mut TestEngine, wallet: &str, inventory: Inventory) {
    engine.store_mut().put_inventory(wallet, &inventory).unwrap();
}

fn rejection<T: std::fmt::Debug>(result: EngineResult<T>) -> Rejection {
    match result {
        Err(EngineError::Rejected(rejection)) => rejection,
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn spawn_or_get__scales_hp_with_active_players_and_floors_at_base() {
    // given
    let config = GameConfig {
        base_hp: 10_000,
        scaling_factor: 0.05,
        ..GameConfig::default()
    };
    let (mut engine, _clock) =
        engine_with(config, CALM, StaticPaymentVerifier::accepting());
    let week_start = engine.current_week();
    for i in 0..10 {
        engine
            .store_mut()
            .set_active_run(week_start, &format!("wallet-{i}"))
            .unwrap();
    }

    // when
    let boss = engine.spawn_or_get().unwrap();

    // then -- floor(10000 * 10 * 0.05) = 5000, floored at the base
    assert_eq!(boss.max_hp, 10_000);
    assert_eq!(boss.current_hp, 10_000);
    assert!(!boss.killed);
}

#[test]
fn spawn_or_get__scales_above_base_when_population_is_large() {
    // given
    let (mut engine, _clock) = engine();
    let week_start = engine.current_week();
    for i in 0..5 {
        engine
            .store_mut()
            .set_active_run(week_start, &format!("wallet-{i}"))
            .unwrap();
    }

    // when
    let boss = engine.spawn_or_get().unwrap();

    // then -- floor(100000 * 5 * 0.8) = 400000
    assert_eq!(boss.max_hp, 400_000);
}

#[test]
fn spawn_or_get__returns_the_existing_boss_unchanged() {
    // given
    let (mut engine, _clock) = engine();
    let first = engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");

    // when -- population changed, but the week's boss already exists
    let second = engine.spawn_or_get().unwrap();

    // then
    assert_eq!(first, second);
}

#[test]
fn spawn_or_get__is_rejected_outside_the_fight_window() {
    // given
    let clock = ManualClock::new(friday());
    let mut engine = BossEngine::new(
        InMemoryBossStore::new(),
        StaticPaymentVerifier::accepting(),
        clock,
        FixedChance(CALM),
        GameConfig::default(),
        PhasePolicy::WeekendOnly,
    );

    // when / then
    assert_eq!(rejection(engine.spawn_or_get()), Rejection::PhaseClosed);
}

#[test]
fn join__requires_a_spawned_boss() {
    let (mut engine, _clock) = engine();
    enroll(&mut engine, "wallet-a");

    assert_eq!(rejection(engine.join("wallet-a")), Rejection::BossNotSpawned);
}

#[test]
fn join__requires_an_active_weekly_run() {
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();

    assert_eq!(rejection(engine.join("wallet-a")), Rejection::NoActiveRun);
}

#[test]
fn join__requires_a_character() {
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    let week_start = engine.current_week();
    engine
        .store_mut()
        .set_active_run(week_start, "wallet-a")
        .unwrap();

    assert_eq!(rejection(engine.join("wallet-a")), Rejection::NoCharacter);
}

#[test]
fn join__requires_an_idle_character() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    let mut character = engine
        .store_mut()
        .character("wallet-a")
        .unwrap()
        .unwrap();
    character.status = CharacterStatus::OnMission;
    engine.store_mut().put_character(&character).unwrap();

    // when / then
    assert_eq!(rejection(engine.join("wallet-a")), Rejection::CharacterBusy);
}

#[test]
fn join__is_rejected_on_second_attempt() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();

    // when / then
    assert_eq!(rejection(engine.join("wallet-a")), Rejection::AlreadyJoined);
}

#[test]
fn join__enrolls_with_zero_damage_and_flips_the_character_into_the_encounter() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");

    // when
    let participant = engine.join("wallet-a").unwrap();

    // then
    assert_eq!(participant.passive_damage, 0);
    assert_eq!(participant.crit_damage, 0);
    assert!(!participant.crit_used);
    let character = engine
        .store_mut()
        .character("wallet-a")
        .unwrap()
        .unwrap();
    assert_eq!(character.status, CharacterStatus::InEncounter);
}

#[test]
fn tick__recomputes_passive_damage_from_elapsed_hours() {
    // given
    let (mut engine, clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();

    // when -- two hours in the fight
    clock.advance(Duration::hours(2));
    let summary = engine.tick().unwrap().unwrap();

    // then -- floor(21 * 1.0 * 2) = 42
    assert_eq!(summary.total_damage, 42);
    assert_eq!(summary.participant_count, 1);
    assert!(!summary.killed_now);
}

#[test]
fn tick__fractional_score_power_survives_until_the_final_floor() {
    // given -- score 150 makes the score term 1.5, not 1
    let (mut engine, clock) = engine();
    engine.spawn_or_get().unwrap();
    let week_start = engine.current_week();
    engine
        .store_mut()
        .set_active_run(week_start, "wallet-a")
        .unwrap();
    engine
        .store_mut()
        .put_character(&Character {
            wallet: "wallet-a".into(),
            armor: 0,
            engine: 0,
            scanner: 0,
            score: 150,
            status: CharacterStatus::Idle,
            perks: Vec::new(),
        })
        .unwrap();
    engine.join("wallet-a").unwrap();

    // when
    clock.advance(Duration::hours(2));
    let summary = engine.tick().unwrap().unwrap();

    // then -- floor((10 + 1.5) * 2) = 23
    assert_eq!(summary.total_damage, 23);
}

#[test]
fn tick__recompute_is_idempotent_at_a_fixed_instant() {
    // given
    let (mut engine, clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    clock.advance(Duration::hours(2));

    // when
    let first = engine.tick().unwrap().unwrap();
    let second = engine.tick().unwrap().unwrap();

    // then
    assert_eq!(first.total_damage, 42);
    assert_eq!(second.total_damage, 42);
}

#[test]
fn tick__applies_raid_license_efficiency() {
    // given
    let (mut engine, clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    let week_start = engine.current_week();
    let mut state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    state.raid_license = true;
    engine.store_mut().put_epoch_state(&state).unwrap();

    // when
    clock.advance(Duration::hours(2));
    let summary = engine.tick().unwrap().unwrap();

    // then -- floor(21 * 1.05 * 2) = 44
    assert_eq!(summary.total_damage, 44);
}

#[test]
fn tick__lowers_boss_hp_and_kills_when_accrual_exceeds_it() {
    // given
    let config = GameConfig {
        base_hp: 20,
        ..GameConfig::default()
    };
    let (mut engine, clock) =
        engine_with(config, CALM, StaticPaymentVerifier::accepting());
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();

    // when -- floor(21 * 1) = 21 damage against 20 HP
    clock.advance(Duration::hours(1));
    let summary = engine.tick().unwrap().unwrap();

    // then
    assert!(summary.killed_now);
    let week_start = engine.current_week();
    let boss = engine.store_mut().boss(week_start).unwrap().unwrap();
    assert_eq!(boss.current_hp, 0);
    assert!(boss.killed);

    // when -- a later tick must not revive or re-kill
    clock.advance(Duration::hours(1));
    let after = engine.tick().unwrap().unwrap();

    // then
    assert!(!after.killed_now);
    let boss = engine.store_mut().boss(week_start).unwrap().unwrap();
    assert_eq!(boss.current_hp, 0);
    assert!(boss.killed);
}

#[test]
fn tick__destabilized_player_accrues_nothing() {
    // given
    let (mut engine, clock) = engine_with(
        GameConfig::default(),
        UNLUCKY,
        StaticPaymentVerifier::accepting(),
    );
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();

    // when -- the first roll destabilizes immediately
    clock.advance(Duration::hours(1));
    let summary = engine.tick().unwrap().unwrap();

    // then
    assert_eq!(summary.total_damage, 0);
    let week_start = engine.current_week();
    let state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    assert!(state.destabilized);

    // when -- still inside the free recovery window
    clock.advance(Duration::minutes(10));
    let summary = engine.tick().unwrap().unwrap();

    // then -- frozen
    assert_eq!(summary.total_damage, 0);
}

#[test]
fn tick__free_recovery_clears_destabilization_after_the_window() {
    // given
    let (mut engine, clock) = engine_with(
        GameConfig::default(),
        UNLUCKY,
        StaticPaymentVerifier::accepting(),
    );
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    clock.advance(Duration::hours(1));
    engine.tick().unwrap();

    // when -- 16 minutes of downtime, past the 15 minute window
    clock.advance(Duration::minutes(16));
    let summary = engine.tick().unwrap().unwrap();

    // then -- cleared, and the recompute covers the full elapsed time:
    // floor(21 * (76/60)) = 26
    assert_eq!(summary.total_damage, 26);
    let week_start = engine.current_week();
    let state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    assert!(!state.destabilized);
    assert!(state.destabilized_at.is_none());
}

#[tokio::test]
async fn reconnect__clears_destabilization_and_forward_shifts_joined_at() {
    // given
    let (mut engine, clock) = engine_with(
        GameConfig::default(),
        UNLUCKY,
        StaticPaymentVerifier::accepting(),
    );
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    let joined = engine.join("wallet-a").unwrap();
    clock.advance(Duration::hours(1));
    engine.tick().unwrap();

    // when -- pay out of the outage 30 minutes in
    clock.advance(Duration::minutes(30));
    engine.reconnect("wallet-a", "sig-1").await.unwrap();

    // then -- joined_at absorbed the 30 minutes of downtime
    let week_start = engine.current_week();
    let participant = engine
        .store_mut()
        .participant(week_start, "wallet-a")
        .unwrap()
        .unwrap();
    assert_eq!(participant.joined_at, joined.joined_at + Duration::minutes(30));
    let state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    assert!(!state.destabilized);
    assert!(state.reconnect_used);

    // when -- half an hour later the recompute resumes seamlessly
    clock.advance(Duration::minutes(30));
    let summary = engine.tick().unwrap().unwrap();

    // then -- 2h wall time minus 30min downtime: floor(21 * 1.5) = 31
    assert_eq!(summary.total_damage, 31);
}

#[tokio::test]
async fn reconnect__requires_a_destabilized_player() {
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();

    let result = engine.reconnect("wallet-a", "sig-1").await;
    assert_eq!(rejection(result), Rejection::NotDestabilized);
}

#[tokio::test]
async fn reconnect__is_a_one_way_latch() {
    // given
    let (mut engine, clock) = engine_with(
        GameConfig::default(),
        UNLUCKY,
        StaticPaymentVerifier::accepting(),
    );
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    clock.advance(Duration::hours(1));
    engine.tick().unwrap();
    engine.reconnect("wallet-a", "sig-1").await.unwrap();

    // when / then
    let result = engine.reconnect("wallet-a", "sig-2").await;
    assert_eq!(rejection(result), Rejection::ReconnectAlreadyUsed);
}

#[tokio::test]
async fn reconnect__rejected_payment_leaves_state_untouched() {
    // given
    let (mut engine, clock) = engine_with(
        GameConfig::default(),
        UNLUCKY,
        StaticPaymentVerifier::rejecting(),
    );
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    clock.advance(Duration::hours(1));
    engine.tick().unwrap();

    // when
    let result = engine.reconnect("wallet-a", "sig-1").await;

    // then
    assert!(matches!(result, Err(EngineError::Payment(_))));
    let week_start = engine.current_week();
    let state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    assert!(state.destabilized);
    assert!(!state.reconnect_used);
}

#[test]
fn overload__burns_the_inventory_into_weighted_damage() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    give_inventory(
        &mut engine,
        "wallet-a",
        Inventory {
            scrap: 5,
            crystal: 2,
            artifact: 1,
        },
    );

    // when -- 5*1 + 2*3 + 1*10 = 21
    let outcome = engine.overload("wallet-a").unwrap();

    // then
    assert_eq!(outcome.damage, 21);
    assert!(!outcome.boss_killed);
    assert!(engine.store_mut().inventory("wallet-a").unwrap().is_empty());
    let week_start = engine.current_week();
    let boss = engine.store_mut().boss(week_start).unwrap().unwrap();
    assert_eq!(boss.current_hp, boss.max_hp - 21);
}

#[test]
fn overload__applies_amplifier_and_crit_perk_multipliers() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    give_inventory(
        &mut engine,
        "wallet-a",
        Inventory {
            scrap: 5,
            crystal: 2,
            artifact: 1,
        },
    );
    let week_start = engine.current_week();
    let mut state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    state.overload_amp_used = true;
    engine.store_mut().put_epoch_state(&state).unwrap();
    let mut character = engine
        .store_mut()
        .character("wallet-a")
        .unwrap()
        .unwrap();
    character.perks.push(CRIT_PERK.into());
    engine.store_mut().put_character(&character).unwrap();

    // when -- floor(21 * 1.1 * 1.5) = floor(34.65) = 34
    let outcome = engine.overload("wallet-a").unwrap();

    // then
    assert_eq!(outcome.damage, 34);
}

#[test]
fn overload__second_attempt_is_rejected_and_has_no_side_effects() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    give_inventory(
        &mut engine,
        "wallet-a",
        Inventory {
            scrap: 5,
            crystal: 2,
            artifact: 1,
        },
    );
    engine.overload("wallet-a").unwrap();
    let week_start = engine.current_week();
    let hp_after_first = engine
        .store_mut()
        .boss(week_start)
        .unwrap()
        .unwrap()
        .current_hp;
    give_inventory(
        &mut engine,
        "wallet-a",
        Inventory {
            scrap: 9,
            crystal: 9,
            artifact: 9,
        },
    );

    // when
    let result = engine.overload("wallet-a");

    // then
    assert_eq!(rejection(result), Rejection::OverloadAlreadyUsed);
    let boss = engine.store_mut().boss(week_start).unwrap().unwrap();
    assert_eq!(boss.current_hp, hp_after_first);
    assert!(!engine.store_mut().inventory("wallet-a").unwrap().is_empty());
}

#[test]
fn overload__empty_inventory_is_rejected_and_keeps_the_attempt() {
    // given -- joined, but nothing to burn
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();

    // when
    let result = engine.overload("wallet-a");

    // then
    assert_eq!(rejection(result), Rejection::NoInventory);
    let week_start = engine.current_week();
    let participant = engine
        .store_mut()
        .participant(week_start, "wallet-a")
        .unwrap()
        .unwrap();
    assert!(!participant.crit_used);

    // when -- resources arrive later, the one-shot is still available
    give_inventory(
        &mut engine,
        "wallet-a",
        Inventory {
            scrap: 1,
            crystal: 0,
            artifact: 0,
        },
    );

    // then
    assert_eq!(engine.overload("wallet-a").unwrap().damage, 1);
}

#[test]
fn overload__requires_joining_first() {
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();

    assert_eq!(rejection(engine.overload("wallet-a")), Rejection::NotJoined);
}

#[test]
fn overload__can_kill_the_boss_and_the_kill_is_final() {
    // given
    let config = GameConfig {
        base_hp: 100,
        ..GameConfig::default()
    };
    let (mut engine, _clock) =
        engine_with(config, CALM, StaticPaymentVerifier::accepting());
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    enroll(&mut engine, "wallet-b");
    engine.join("wallet-a").unwrap();
    give_inventory(
        &mut engine,
        "wallet-a",
        Inventory {
            scrap: 0,
            crystal: 0,
            artifact: 12,
        },
    );

    // when -- 120 damage against 100 HP
    let outcome = engine.overload("wallet-a").unwrap();

    // then
    assert!(outcome.boss_killed);
    let week_start = engine.current_week();
    let boss = engine.store_mut().boss(week_start).unwrap().unwrap();
    assert_eq!(boss.current_hp, 0);
    assert!(boss.killed);
    assert_eq!(
        rejection(engine.join("wallet-b")),
        Rejection::BossAlreadyKilled
    );
}

#[test]
fn status__reports_totals_and_the_requested_wallet_share() {
    // given
    let (mut engine, clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    enroll(&mut engine, "wallet-b");
    engine.join("wallet-a").unwrap();
    engine.join("wallet-b").unwrap();
    give_inventory(
        &mut engine,
        "wallet-b",
        Inventory {
            scrap: 5,
            crystal: 2,
            artifact: 1,
        },
    );
    clock.advance(Duration::hours(2));
    engine.tick().unwrap();
    engine.overload("wallet-b").unwrap();

    // when -- a: 42 passive, b: 42 passive + 21 crit
    let status = engine.status(Some("wallet-a")).unwrap();

    // then
    assert_eq!(status.participant_count, 2);
    assert_eq!(status.total_damage, 105);
    let share = status.player.unwrap();
    assert_eq!(share.passive_damage, 42);
    assert_eq!(share.crit_damage, 0);
    assert!((share.share - 42.0 / 105.0).abs() < 1e-9);
}

#[test]
fn status__requires_a_spawned_boss() {
    let (engine, _clock) = engine();
    assert_eq!(rejection(engine.status(None)), Rejection::BossNotSpawned);
}

#[test]
fn resolve__is_gated_until_the_boss_dies_or_the_window_closes() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    let week_start = engine.current_week();

    // when / then
    assert_eq!(
        rejection(engine.resolve(week_start)),
        Rejection::BossNotResolved
    );
}

#[test]
fn resolve__fractions_sum_to_one_when_damage_was_dealt() {
    // given
    let config = GameConfig {
        base_hp: 30,
        ..GameConfig::default()
    };
    let (mut engine, clock) =
        engine_with(config, CALM, StaticPaymentVerifier::accepting());
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    enroll(&mut engine, "wallet-b");
    engine.join("wallet-a").unwrap();
    engine.join("wallet-b").unwrap();
    clock.advance(Duration::hours(1));
    engine.tick().unwrap();

    // when -- two participants at 21 damage each killed the 30 HP boss
    let week_start = engine.current_week();
    let resolution = engine.resolve(week_start).unwrap();

    // then
    assert!(resolution.killed);
    assert_eq!(resolution.total_damage, 42);
    let sum: f64 = resolution.shares.iter().map(|s| s.fraction).sum();
    assert!((sum - 1.0).abs() < 1e-9);

    // when -- resolving again is a pure read
    let again = engine.resolve(week_start).unwrap();

    // then
    assert_eq!(resolution, again);
}

#[test]
fn resolve__fractions_are_zero_when_no_damage_was_dealt() {
    // given -- fight window over, boss alive, nobody hit it
    let clock = ManualClock::new(saturday());
    let mut engine = BossEngine::new(
        InMemoryBossStore::new(),
        StaticPaymentVerifier::accepting(),
        clock.clone(),
        FixedChance(CALM),
        GameConfig::default(),
        PhasePolicy::WeekendOnly,
    );
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    let week_start = engine.current_week();
    clock.set(Utc.with_ymd_and_hms(2026, 8, 31, 1, 0, 0).unwrap());

    // when
    let resolution = engine.resolve(week_start).unwrap();

    // then
    assert!(!resolution.killed);
    assert_eq!(resolution.total_damage, 0);
    assert!(resolution.shares.iter().all(|s| s.fraction == 0.0));
}

#[tokio::test]
async fn purchase_overload_amplifier__latches_once_per_epoch() {
    // given
    let (mut engine, _clock) = engine();
    engine.spawn_or_get().unwrap();
    engine
        .purchase_overload_amplifier("wallet-a", "sig-1")
        .await
        .unwrap();

    // when / then
    let result = engine.purchase_overload_amplifier("wallet-a", "sig-2").await;
    assert_eq!(rejection(result), Rejection::AmplifierAlreadyOwned);
}

#[tokio::test]
async fn purchase_raid_license__rejected_payment_leaves_latch_clear() {
    // given
    let (mut engine, _clock) = engine_with(
        GameConfig::default(),
        CALM,
        StaticPaymentVerifier::rejecting(),
    );

    // when
    let result = engine.purchase_raid_license("wallet-a", "sig-1").await;

    // then
    assert!(matches!(result, Err(EngineError::Payment(_))));
    let week_start = engine.current_week();
    let state = engine
        .store_mut()
        .epoch_state(week_start, "wallet-a")
        .unwrap();
    assert!(!state.raid_license);
}

#[test]
fn totals__aggregates_participant_damage_for_the_week() {
    // given
    let (mut engine, clock) = engine();
    engine.spawn_or_get().unwrap();
    enroll(&mut engine, "wallet-a");
    engine.join("wallet-a").unwrap();
    clock.advance(Duration::hours(2));
    engine.tick().unwrap();

    // when
    let week_start = engine.current_week();
    let totals = engine.totals(week_start).unwrap().unwrap();

    // then
    assert_eq!(totals.total_damage, 42);
    assert_eq!(totals.participant_count, 1);
    assert!(!totals.killed);
    assert_eq!(week_key(clock.now()), totals.week_start);
}

proptest! {
    #[test]
    fn passive_accrual__is_monotone_in_elapsed_time(
        armor in 0u64..10,
        engine_level in 0u64..10,
        scanner in 0u64..10,
        score in 0u64..10_000,
        // Both advances together must stay inside the running week: the
        // Saturday 08:00 start is 2400 minutes before the next Monday 00:00.
        first_minutes in 0i64..1_200,
        extra_minutes in 0i64..1_200,
    ) {
        // given
        let (mut engine, clock) = engine();
        engine.spawn_or_get().unwrap();
        let week_start = engine.current_week();
        engine.store_mut().set_active_run(week_start, "wallet-a").unwrap();
        engine
            .store_mut()
            .put_character(&Character {
                wallet: "wallet-a".into(),
                armor,
                engine: engine_level,
                scanner,
                score,
                status: CharacterStatus::Idle,
                perks: Vec::new(),
            })
            .unwrap();
        engine.join("wallet-a").unwrap();

        // when
        clock.advance(Duration::minutes(first_minutes));
        let first = engine.tick().unwrap().unwrap();
        clock.advance(Duration::minutes(extra_minutes));
        let second = engine.tick().unwrap().unwrap();

        // then
        prop_assert!(second.total_damage >= first.total_damage);
    }
}
