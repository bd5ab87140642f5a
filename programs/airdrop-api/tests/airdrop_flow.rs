mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use airdrop_api::clock::DayWindow;
use airdrop_api::config::{Config, Environment};
use airdrop_api::contexts::{
    AdminOperation, AdminOutcome, DashboardPeriod, LookupQuery, ReferralsQuery,
};
use airdrop_api::errors::{AirdropError, StoreResult};
use airdrop_api::instructions::{
    add_referral, admin, admin_dashboard, derive_referral_code, health, lookup_referral_code,
    referrals_for_wallet, register, spin, stats,
};
use airdrop_api::prize_wheel::{PrizeTier, PrizeWheel};
use airdrop_api::state::{
    Credit, DashboardSnapshot, DatabaseInfo, GlobalStats, NewAnalyticsEvent, NewParticipant,
    NewReferral, NewWheelSpin, Participant, PurgeReport, Referral, ReferredParticipant,
    StatsDelta, TableCounts, WheelSpin,
};
use airdrop_api::store::{AirdropStore, DashboardWindow, PurgeCutoff, StoreTx};
use airdrop_api::AppState;

use common::*;

#[tokio::test]
async fn end_to_end_scenario() {
    let h = harness();

    let a = register::process(&h.app, register_req(ALICE)).await.unwrap();
    assert_eq!(a.tokens, 1000);
    assert!(!a.already_registered);
    let b = register::process(&h.app, register_req(BOB)).await.unwrap();
    assert_eq!(b.tokens, 1000);

    let referral = add_referral::process(&h.app, referral_req(ALICE, BOB, &a.referral_code))
        .await
        .unwrap();
    assert_eq!(referral.awarded_tokens, 500);
    assert_eq!(referral.referrer_new_tokens, 1500);
    let edge = h.store.find_referral_of(BOB).await.unwrap().unwrap();
    assert_eq!(edge.referrer_wallet, ALICE);

    let again = add_referral::process(&h.app, referral_req(ALICE, BOB, &a.referral_code))
        .await
        .unwrap_err();
    assert!(matches!(again, AirdropError::AlreadyReferred));
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let spun = spin::process(&h.app, spin_req(ALICE)).await.unwrap();
    assert!(PrizeWheel::standard().contains(spun.prize));
    assert_eq!(spun.new_balance, 1500 + spun.prize);
    assert_eq!(
        spun.next_spin,
        Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
    );

    let twice = spin::process(&h.app, spin_req(ALICE)).await.unwrap_err();
    assert_eq!(twice.code(), "ALREADY_SPUN_TODAY");
    assert_eq!(twice.status(), StatusCode::TOO_MANY_REQUESTS);

    let alice = h.store.find_by_wallet(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.tokens, 1500 + spun.prize);
    assert_eq!(alice.referral_count, 1);
    assert_eq!(alice.total_spins, 1);
}

#[tokio::test]
async fn registering_twice_is_idempotent() {
    let h = harness();
    let first = register::process(&h.app, register_req(ALICE)).await.unwrap();

    h.clock.advance(Duration::minutes(5));
    let mut repeat = register_req(ALICE);
    repeat.session_id = Some("  session-2  ".to_owned());
    let second = register::process(&h.app, repeat).await.unwrap();

    assert_eq!(second.referral_code, first.referral_code);
    assert_eq!(second.tokens, 1000);
    assert!(second.already_registered);

    let alice = h.store.find_by_wallet(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.session_id.as_deref(), Some("session-2"));
    assert_eq!(alice.last_active, start_time() + Duration::minutes(5));

    let stats = h.store.global_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_participants, 1);
    assert_eq!(stats.tokens_reserved, 1000);
    assert_eq!(h.store.table_counts().await.unwrap().participants, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_of_one_wallet_grant_once() {
    let h = harness();
    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move { register::process(&app, register_req(CAROL)).await })
        })
        .collect();

    let mut codes = HashSet::new();
    let mut fresh = 0;
    for task in tasks {
        let data = task.await.unwrap().unwrap();
        assert_eq!(data.tokens, 1000);
        if !data.already_registered {
            fresh += 1;
        }
        codes.insert(data.referral_code);
    }
    assert_eq!(fresh, 1);
    assert_eq!(codes.len(), 1);

    let stats = h.store.global_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_participants, 1);
    assert_eq!(stats.tokens_reserved, 1000);
}

#[tokio::test]
async fn registration_validation() {
    let h = harness();

    let missing = register::process(
        &h.app,
        airdrop_api::contexts::RegisterRequest {
            wallet: Some(ALICE.to_owned()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(missing.code(), "MISSING_FIELDS");

    let bad_address = register::process(&h.app, register_req("not-a-wallet"))
        .await
        .unwrap_err();
    assert_eq!(bad_address.code(), "INVALID_ADDRESS");

    let mut bad_type = register_req(ALICE);
    bad_type.wallet_type = Some("metamask".to_owned());
    assert_eq!(
        register::process(&h.app, bad_type).await.unwrap_err().code(),
        "INVALID_WALLET_TYPE"
    );

    let mut mixed_case = register_req(ALICE);
    mixed_case.wallet_type = Some("Backpack".to_owned());
    mixed_case.utm_source = Some("x".repeat(300));
    mixed_case.user_agent = Some("   ".to_owned());
    register::process(&h.app, mixed_case).await.unwrap();

    let alice = h.store.find_by_wallet(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.wallet_type, "backpack");
    assert_eq!(alice.utm_source.map(|s| s.len()), Some(100));
    assert_eq!(alice.user_agent, None);
}

#[tokio::test]
async fn referral_code_collision_falls_back_to_a_random_code() {
    let h = harness();
    let derived = derive_referral_code(ALICE);

    let mut tx = h.store.begin().await.unwrap();
    tx.insert_participant(&NewParticipant {
        wallet_address: BOB.to_owned(),
        wallet_type: "phantom".to_owned(),
        referral_code: derived.clone(),
        session_id: None,
        user_agent: None,
        referrer: None,
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        registered_at: start_time(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    assert_ne!(alice.referral_code, derived);
    assert!(alice.referral_code.starts_with("REGRET-"));
    assert_eq!(alice.referral_code.len(), 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_spins_have_exactly_one_winner() {
    let h = harness();
    register::process(&h.app, register_req(ALICE)).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move { spin::process(&app, spin_req(ALICE)).await })
        })
        .collect();

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(data) => winners.push(data),
            Err(err) => assert_eq!(err.code(), "ALREADY_SPUN_TODAY"),
        }
    }
    assert_eq!(winners.len(), 1);

    let alice = h.store.find_by_wallet(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.total_spins, 1);
    assert_eq!(alice.tokens, 1000 + winners[0].prize);
    let stats = h.store.global_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_spins, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_referrals_of_one_wallet_have_exactly_one_winner() {
    let h = harness();
    register::process(&h.app, register_req(DAVE)).await.unwrap();

    let mut referrers = Vec::new();
    for n in 0..8 {
        let w = wallet(n);
        let data = register::process(&h.app, register_req(&w)).await.unwrap();
        referrers.push((w, data.referral_code));
    }

    let tasks: Vec<_> = referrers
        .iter()
        .cloned()
        .map(|(referrer, code)| {
            let app = h.app.clone();
            tokio::spawn(async move {
                add_referral::process(&app, referral_req(&referrer, DAVE, &code)).await
            })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(data) => {
                wins += 1;
                assert_eq!(data.referrer_new_tokens, 1500);
            }
            Err(err) => assert_eq!(err.code(), "ALREADY_REFERRED"),
        }
    }
    assert_eq!(wins, 1);

    let mut paid = 0;
    for (referrer, _) in &referrers {
        let p = h.store.find_by_wallet(referrer).await.unwrap().unwrap();
        paid += p.referral_earned;
    }
    assert_eq!(paid, 500);
}

#[tokio::test]
async fn spin_unlocks_at_the_next_calendar_day() {
    let h = harness();
    register::process(&h.app, register_req(ALICE)).await.unwrap();
    spin::process(&h.app, spin_req(ALICE)).await.unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2025, 1, 5, 23, 59, 59).unwrap());
    match spin::process(&h.app, spin_req(ALICE)).await.unwrap_err() {
        AirdropError::AlreadySpunToday { next_spin } => {
            assert_eq!(next_spin, Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap())
        }
        other => panic!("unexpected {other:?}"),
    }

    h.clock.advance(Duration::seconds(1));
    let second = spin::process(&h.app, spin_req(ALICE)).await.unwrap();
    assert_eq!(
        second.next_spin,
        Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap()
    );
    let alice = h.store.find_by_wallet(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.total_spins, 2);
    assert_eq!(
        alice.last_spin,
        Some(Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap().date_naive())
    );
}

#[tokio::test]
async fn spin_validation() {
    let h = harness();
    assert_eq!(
        spin::process(&h.app, airdrop_api::contexts::SpinRequest { wallet: None })
            .await
            .unwrap_err()
            .code(),
        "MISSING_WALLET"
    );
    assert_eq!(
        spin::process(&h.app, spin_req("short")).await.unwrap_err().code(),
        "INVALID_ADDRESS"
    );
    assert_eq!(
        spin::process(&h.app, spin_req(ALICE)).await.unwrap_err().code(),
        "WALLET_NOT_FOUND"
    );
}

#[tokio::test]
async fn referral_validation_order() {
    let h = harness();
    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    register::process(&h.app, register_req(BOB)).await.unwrap();

    let code = alice.referral_code.as_str();
    let cases = [
        (referral_req(ALICE, BOB, ""), "MISSING_FIELDS"),
        (referral_req("bad", BOB, code), "INVALID_REFERRER_ADDRESS"),
        (referral_req(ALICE, "bad", code), "INVALID_REFERRED_ADDRESS"),
        (referral_req(ALICE, ALICE, code), "SELF_REFERRAL"),
        (referral_req(ALICE, BOB, "ABC"), "INVALID_CODE"),
        (referral_req(CAROL, BOB, code), "REFERRER_NOT_FOUND"),
        (referral_req(ALICE, BOB, "REGRET-WRONG"), "CODE_MISMATCH"),
        (referral_req(ALICE, CAROL, code), "REFERRED_NOT_FOUND"),
    ];
    for (req, expected) in cases {
        let err = add_referral::process(&h.app, req).await.unwrap_err();
        assert_eq!(err.code(), expected);
    }

    // Nothing was written by the rejected calls.
    let alice_row = h.store.find_by_wallet(ALICE).await.unwrap().unwrap();
    assert_eq!(alice_row.tokens, 1000);
    assert_eq!(h.store.table_counts().await.unwrap().referrals, 0);
}

#[tokio::test]
async fn stats_follow_the_incremental_ledger_and_rebuild_matches() {
    let h = harness_with(Config {
        admin_token: Some("root".to_owned()),
        ..Config::default()
    });
    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    register::process(&h.app, register_req(BOB)).await.unwrap();
    add_referral::process(&h.app, referral_req(ALICE, BOB, &alice.referral_code))
        .await
        .unwrap();
    let spun = spin::process(&h.app, spin_req(BOB)).await.unwrap();

    let live = stats::process(&h.app).await.unwrap();
    assert_eq!(live.total_participants, 2);
    assert_eq!(live.tokens_reserved, 2500 + spun.prize);
    assert_eq!(live.tokens_remaining, 10_000_000 - live.tokens_reserved);
    assert_eq!(live.participants_today, 2);
    assert_eq!(live.total_spins, 1);
    assert_eq!(live.days_to_launch, 7);

    let rebuilt = match admin::process(&h.app, AdminOperation::RebuildStats)
        .await
        .unwrap()
    {
        AdminOutcome::RebuildStats { stats } => stats,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(rebuilt.total_participants, 2);
    assert_eq!(rebuilt.tokens_reserved, live.tokens_reserved);
    assert_eq!(rebuilt.total_spins, 1);

    // Next day: nobody registered yet, totals unchanged.
    h.clock.advance(Duration::days(1));
    let tomorrow = stats::process(&h.app).await.unwrap();
    assert_eq!(tomorrow.participants_today, 0);
    assert_eq!(tomorrow.total_participants, 2);
    assert_eq!(tomorrow.days_to_launch, 6);
}

#[tokio::test]
async fn stats_fall_back_when_the_store_is_down() {
    let h = harness();
    h.store.set_available(false);

    let response = stats::handler(State(h.app.clone())).await;
    assert!(response.success);
    assert_eq!(response.fallback, Some(true));
    assert!(response.warning.is_some());
    assert_eq!(response.error, None);
    assert_eq!(response.data.total_participants, 1875);
    assert_eq!(response.data.tokens_reserved, 3_875_000);
    assert_eq!(response.data.tokens_remaining, 6_125_000);
    assert_eq!(response.data.days_to_launch, 14);

    let dev = harness_with(Config {
        environment: Environment::Development,
        ..Config::default()
    });
    dev.store.set_available(false);
    let response = stats::handler(State(dev.app.clone())).await;
    assert!(response.error.is_some());
}

#[tokio::test]
async fn health_reports_database_state() {
    let h = harness();
    let (status, report) = health::handler(State(h.app.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report.0.status, "healthy");
    assert_eq!(report.0.database.status, "connected");

    h.store.set_available(false);
    let (status, report) = health::handler(State(h.app.clone())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(report.0.status, "unhealthy");
    assert_eq!(report.0.database.error, None);
}

#[tokio::test]
async fn mutations_report_unavailable_store() {
    let h = harness();
    register::process(&h.app, register_req(ALICE)).await.unwrap();
    h.store.set_available(false);

    let err = spin::process(&h.app, spin_req(ALICE)).await.unwrap_err();
    assert_eq!(err.code(), "DATABASE_UNAVAILABLE");
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn referral_listing_and_lookup() {
    let h = harness();
    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    for (i, referred) in [BOB, CAROL, DAVE].into_iter().enumerate() {
        h.clock.advance(Duration::minutes(i as i64 + 1));
        register::process(&h.app, register_req(referred)).await.unwrap();
        add_referral::process(&h.app, referral_req(ALICE, referred, &alice.referral_code))
            .await
            .unwrap();
    }

    let page = referrals_for_wallet::process(
        &h.app,
        ReferralsQuery {
            wallet: Some(ALICE.to_owned()),
            limit: Some("2".to_owned()),
            offset: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(page.referral_code, alice.referral_code);
    assert_eq!(page.referrals.len(), 2);
    assert_eq!(page.referrals[0].referred_wallet, DAVE);
    assert_eq!(page.referrals[1].referred_wallet, CAROL);
    assert_eq!(page.referral_stats.successful_referrals, 3);
    assert_eq!(page.referral_stats.total_earned, 1500);
    assert_eq!(page.referral_stats.current_tokens, 2500);
    assert_eq!(page.referral_stats.average_earnings_per_referral, 500);
    assert!(page.pagination.has_more);
    assert_eq!(page.pagination.pages, 2);

    let rest = referrals_for_wallet::process(
        &h.app,
        ReferralsQuery {
            wallet: Some(ALICE.to_owned()),
            limit: Some("2".to_owned()),
            offset: Some("2".to_owned()),
        },
    )
    .await
    .unwrap();
    assert_eq!(rest.referrals.len(), 1);
    assert_eq!(rest.referrals[0].referred_wallet, BOB);
    assert!(!rest.pagination.has_more);
    assert_eq!(rest.pagination.current_page, 2);

    let unknown = referrals_for_wallet::process(
        &h.app,
        ReferralsQuery {
            wallet: Some(wallet(99)),
            ..ReferralsQuery::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(unknown.code(), "WALLET_NOT_FOUND");

    let found = lookup_referral_code::process(
        &h.app,
        LookupQuery {
            code: Some(alice.referral_code.clone()),
        },
    )
    .await
    .unwrap();
    assert_eq!(found.referrer_wallet, ALICE);

    let missing = lookup_referral_code::process(
        &h.app,
        LookupQuery {
            code: Some("REGRET-NOPE0000".to_owned()),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(missing.code(), "CODE_NOT_FOUND");
}

#[tokio::test]
async fn referral_listing_tolerates_the_largest_offset() {
    let h = harness();
    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    register::process(&h.app, register_req(BOB)).await.unwrap();
    add_referral::process(&h.app, referral_req(ALICE, BOB, &alice.referral_code))
        .await
        .unwrap();

    let page = referrals_for_wallet::process(
        &h.app,
        ReferralsQuery {
            wallet: Some(ALICE.to_owned()),
            limit: None,
            offset: Some(i64::MAX.to_string()),
        },
    )
    .await
    .unwrap();
    assert!(page.referrals.is_empty());
    assert_eq!(page.pagination.total, 1);
    assert!(!page.pagination.has_more);
    assert!(page.pagination.current_page > 1);
}

#[tokio::test]
async fn admin_purge_and_reset() {
    let h = harness();
    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    register::process(&h.app, register_req(BOB)).await.unwrap();
    add_referral::process(&h.app, referral_req(ALICE, BOB, &alice.referral_code))
        .await
        .unwrap();
    spin::process(&h.app, spin_req(ALICE)).await.unwrap();
    spin::process(&h.app, spin_req(BOB)).await.unwrap();

    h.clock.advance(Duration::days(45));
    let purged = admin::process(&h.app, AdminOperation::PurgeOldData { days: 30 })
        .await
        .unwrap();
    match purged {
        AdminOutcome::PurgeOldData { days, report } => {
            assert_eq!(days, 30);
            // Alice is a referrer; her spin is retained.
            assert_eq!(report.deleted_wheel_spins, 1);
            assert_eq!(report.deleted_analytics_events, 5);
        }
        other => panic!("unexpected {other:?}"),
    }

    match admin::process(&h.app, AdminOperation::HealthCheck).await.unwrap() {
        AdminOutcome::HealthCheck { tables } => {
            assert_eq!(tables.participants, 2);
            assert_eq!(tables.wheel_spins, 1);
            assert_eq!(tables.analytics_events, 0);
        }
        other => panic!("unexpected {other:?}"),
    }

    admin::process(&h.app, AdminOperation::ResetTestData)
        .await
        .unwrap();
    let counts = h.store.table_counts().await.unwrap();
    assert_eq!(counts.participants, 0);
    assert_eq!(counts.referrals, 0);
    let live = stats::process(&h.app).await.unwrap();
    assert_eq!(live.total_participants, 0);
    assert_eq!(live.tokens_reserved, 0);
}

#[tokio::test]
async fn purge_with_an_oversized_window_is_rejected() {
    let h = harness();
    register::process(&h.app, register_req(ALICE)).await.unwrap();
    spin::process(&h.app, spin_req(ALICE)).await.unwrap();

    let err = admin::process(&h.app, AdminOperation::PurgeOldData { days: 100_000_000 })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_DAYS");
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let counts = h.store.table_counts().await.unwrap();
    assert_eq!(counts.wheel_spins, 1);
}

#[tokio::test]
async fn admin_dashboard_summarises_the_period() {
    let h = harness();
    let alice = register::process(&h.app, register_req(ALICE)).await.unwrap();
    let mut bob = register_req(BOB);
    bob.wallet_type = Some("solflare".to_owned());
    bob.session_id = Some("sess-bob".to_owned());
    bob.utm_source = Some("twitter".to_owned());
    register::process(&h.app, bob).await.unwrap();
    add_referral::process(&h.app, referral_req(ALICE, BOB, &alice.referral_code))
        .await
        .unwrap();
    let a = spin::process(&h.app, spin_req(ALICE)).await.unwrap();
    let b = spin::process(&h.app, spin_req(BOB)).await.unwrap();

    let data = admin_dashboard::process(&h.app, DashboardPeriod::Day)
        .await
        .unwrap();
    assert_eq!(data.period, DashboardPeriod::Day);
    assert_eq!(data.overview.total_participants, 2);
    assert_eq!(
        data.overview.tokens_reserved,
        2000 + 500 + a.prize + b.prize
    );
    assert_eq!(data.user_metrics.period_new, 2);
    assert_eq!(data.user_metrics.conversion_rate, 100.0);
    assert_eq!(data.spin_metrics.total_spins, 2);
    assert_eq!(data.spin_metrics.period_spins, 2);
    assert_eq!(data.spin_metrics.min_prize, a.prize.min(b.prize));
    assert_eq!(data.spin_metrics.max_prize, a.prize.max(b.prize));
    assert_eq!(data.referral_metrics.total_tokens_awarded, 500);
    assert_eq!(data.referral_metrics.average_per_referral, 500);

    assert_eq!(data.top_referrers.len(), 1);
    assert_eq!(data.top_referrers[0].wallet, "7xKXtg2C...uJosgAsU");
    assert_eq!(data.top_referrers[0].earned, 500);

    let shares: Vec<(&str, f64)> = data
        .wallet_distribution
        .iter()
        .map(|w| (w.wallet_type.as_str(), w.percentage))
        .collect();
    assert_eq!(shares, [("phantom", 50.0), ("solflare", 50.0)]);

    assert_eq!(data.recent_registrations.len(), 2);
    let bob_row = data
        .recent_registrations
        .iter()
        .find(|r| r.wallet_type == "solflare")
        .unwrap();
    assert_eq!(bob_row.utm_source.as_deref(), Some("twitter"));
    assert_eq!(data.active_sessions.unique_users, 2);
    assert_eq!(data.active_sessions.active_sessions, 1);

    // Two days later nothing falls inside a one-day period.
    h.clock.advance(Duration::days(2));
    let later = admin_dashboard::process(&h.app, DashboardPeriod::Day)
        .await
        .unwrap();
    assert_eq!(later.user_metrics.period_new, 0);
    assert_eq!(later.spin_metrics.period_spins, 0);
    assert_eq!(later.spin_metrics.total_spins, 2);
    assert_eq!(later.active_sessions.unique_users, 0);
    let month = admin_dashboard::process(&h.app, DashboardPeriod::Month)
        .await
        .unwrap();
    assert_eq!(month.user_metrics.period_new, 2);
    assert_eq!(month.referral_metrics.period_referrals, 1);
}

/// Store whose transactions report every referral code as already taken.
struct CollidingStore {
    inner: Arc<airdrop_api::store::MemoryStore>,
    code_checks: Arc<AtomicUsize>,
}

struct CollidingTx {
    inner: Box<dyn StoreTx>,
    code_checks: Arc<AtomicUsize>,
}

#[async_trait]
impl AirdropStore for CollidingStore {
    async fn find_by_wallet(&self, wallet: &str) -> StoreResult<Option<Participant>> {
        self.inner.find_by_wallet(wallet).await
    }

    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<Participant>> {
        self.inner.find_by_referral_code(code).await
    }

    async fn touch_activity(
        &self,
        wallet: &str,
        session_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.touch_activity(wallet, session_id, at).await
    }

    async fn find_referral_of(&self, referred_wallet: &str) -> StoreResult<Option<Referral>> {
        self.inner.find_referral_of(referred_wallet).await
    }

    async fn find_spin_on(&self, wallet: &str, day: NaiveDate) -> StoreResult<Option<WheelSpin>> {
        self.inner.find_spin_on(wallet, day).await
    }

    async fn referrals_by_referrer(
        &self,
        referrer_wallet: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<ReferredParticipant>> {
        self.inner
            .referrals_by_referrer(referrer_wallet, limit, offset)
            .await
    }

    async fn count_referrals_by_referrer(&self, referrer_wallet: &str) -> StoreResult<i64> {
        self.inner.count_referrals_by_referrer(referrer_wallet).await
    }

    async fn global_stats(&self) -> StoreResult<Option<GlobalStats>> {
        self.inner.global_stats().await
    }

    async fn count_registrations_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<i64> {
        self.inner.count_registrations_between(from, to).await
    }

    async fn record_event(&self, event: &NewAnalyticsEvent) -> StoreResult<()> {
        self.inner.record_event(event).await
    }

    async fn table_counts(&self) -> StoreResult<TableCounts> {
        self.inner.table_counts().await
    }

    async fn dashboard(&self, window: DashboardWindow) -> StoreResult<DashboardSnapshot> {
        self.inner.dashboard(window).await
    }

    async fn ping(&self) -> StoreResult<DatabaseInfo> {
        self.inner.ping().await
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        Ok(Box::new(CollidingTx {
            inner: self.inner.begin().await?,
            code_checks: self.code_checks.clone(),
        }))
    }
}

#[async_trait]
impl StoreTx for CollidingTx {
    async fn referral_code_taken(&mut self, _code: &str) -> StoreResult<bool> {
        self.code_checks.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn insert_participant(&mut self, new: &NewParticipant) -> StoreResult<Participant> {
        self.inner.insert_participant(new).await
    }

    async fn credit_tokens(
        &mut self,
        wallet: &str,
        credit: Credit,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        self.inner.credit_tokens(wallet, credit, at).await
    }

    async fn insert_referral(&mut self, new: &NewReferral) -> StoreResult<Referral> {
        self.inner.insert_referral(new).await
    }

    async fn insert_wheel_spin(&mut self, new: &NewWheelSpin) -> StoreResult<WheelSpin> {
        self.inner.insert_wheel_spin(new).await
    }

    async fn increment_stats(
        &mut self,
        delta: StatsDelta,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats> {
        self.inner.increment_stats(delta, at).await
    }

    async fn rebuild_stats(
        &mut self,
        today: DayWindow,
        at: DateTime<Utc>,
    ) -> StoreResult<GlobalStats> {
        self.inner.rebuild_stats(today, at).await
    }

    async fn purge_before(&mut self, cutoff: PurgeCutoff) -> StoreResult<PurgeReport> {
        self.inner.purge_before(cutoff).await
    }

    async fn reset_all(&mut self, at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.reset_all(at).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn registration_gives_up_after_five_taken_codes() {
    let h = harness();
    let code_checks = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(CollidingStore {
        inner: h.store.clone(),
        code_checks: code_checks.clone(),
    });
    let app = AppState::new(store, Config::default()).with_clock(h.clock.clone());
    let before = h.store.global_stats().await.unwrap();

    let err = register::process(&app, register_req(ALICE)).await.unwrap_err();
    assert_eq!(err.code(), "CODE_GENERATION_EXHAUSTED");
    assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(code_checks.load(Ordering::SeqCst), 5);

    assert!(h.store.find_by_wallet(ALICE).await.unwrap().is_none());
    assert_eq!(h.store.table_counts().await.unwrap().participants, 0);
    assert_eq!(h.store.global_stats().await.unwrap(), before);

    // The store is left usable.
    let ok = register::process(&h.app, register_req(ALICE)).await.unwrap();
    assert_eq!(ok.tokens, 1000);
}

#[tokio::test]
async fn spin_pays_from_the_configured_wheel() {
    let h = harness();
    let wheel = PrizeWheel::new([PrizeTier {
        amount: 250,
        weight: 1,
    }])
    .unwrap();
    let app = h.app.clone().with_wheel(wheel);

    register::process(&app, register_req(ALICE)).await.unwrap();
    let spun = spin::process(&app, spin_req(ALICE)).await.unwrap();
    assert_eq!(spun.prize, 250);
    assert_eq!(spun.new_balance, 1250);
    assert_eq!(spun.message, "Congratulations! You won 250 $REGRET");

    let stats = h.store.global_stats().await.unwrap().unwrap();
    assert_eq!(stats.total_spins, 1);
    assert_eq!(stats.tokens_reserved, 1250);
}
