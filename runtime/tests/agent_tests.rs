use broker::{Broker, ConnectionEvent, PaperBroker};
use chrono::{DateTime, Duration, TimeZone, Utc};
use config::{AgentConfig, AgentSettings, EndingProcess};
use market::{SeriesConfig, SeriesOption};
use portfolio::{AllocatorConfig, PortfolioView, ScopePolicy};
use ratchet::{Action, AgentError, Bar, Instrument, Period, RangeType};
use runtime::{Agent, CycleOutcome, ShutdownReason, StopFlag};
use strategy::BreakoutConfig;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 14, 0, 0).single().expect("valid dt")
}

fn start() -> DateTime<Utc> {
    t0() + Duration::minutes(30) + Duration::seconds(10)
}

/// Flat at 100, a clean upward break at bar 35, flat at 105 after.
fn bars() -> Vec<Bar> {
    (0..60)
        .map(|i| {
            let at = t0() + Duration::minutes(i);
            match i {
                0..=34 => Bar::new(at, 100.0, 100.5, 99.5, 100.0, 1.0),
                35 => Bar::new(at, 100.0, 105.5, 100.0, 105.0, 1.0),
                _ => Bar::new(at, 105.0, 105.5, 104.5, 105.0, 1.0),
            }
        })
        .collect()
}

fn spy() -> Instrument {
    Instrument {
        id: "SPY".to_string(),
        symbol: "SPY".to_string(),
        exchange: "SMART".to_string(),
        sec_type: "STK".to_string(),
        currency: "USD".to_string(),
        multiplier: None,
        tick_size: Some(0.01),
    }
}

fn config(min_balance: f64, ending_process: EndingProcess, max_cycles: Option<u64>) -> AgentConfig {
    AgentConfig {
        agent: AgentSettings {
            base_currency: "USD".to_string(),
            min_balance,
            min_portfolio_pnl: -10_000.0,
            sleep_time: Period::seconds(2),
            buffer_time: Period::seconds(5),
            loop_interval: Period::minutes(1),
            ending_process,
            run_for: Period::weeks(1),
            max_cycles,
            log_level: "info".to_string(),
        },
        instruments: vec![spy()],
        instrument_file: None,
        market_data: vec![SeriesConfig {
            id: "SPY".to_string(),
            instrument_id: "SPY".to_string(),
            bar_size: Period::minutes(1),
            lookback: Period::days(1),
            option: SeriesOption::LiveUpdating,
            keep_up_to_date: true,
            max_len: 1_000,
            start_date: None,
            stream_capacity: 64,
        }],
        shadow_data: Vec::new(),
        strategies: vec![BreakoutConfig {
            strategy_id: "ATRTrailing1".to_string(),
            instrument_id: "SPY".to_string(),
            series_id: "SPY".to_string(),
            tag: "EW1".to_string(),
            window: 14,
            multiplier: 3.0,
            range_type: RangeType::Full,
            signal_valid_latency: Period::minutes(1),
            signal_valid_survival: Period::days(1),
            send_initial_signal: false,
        }],
        allocators: vec![AllocatorConfig {
            id: "EW1".to_string(),
            scope: ScopePolicy::BySignals,
            min_cash: 0.2,
            max_weight: 0.1,
            universe: Vec::new(),
            min_weight_diff: 0.02,
        }],
        paper: None,
    }
}

fn paper() -> PaperBroker {
    let mut broker = PaperBroker::new(start(), 100_000.0);
    broker.add_instrument(spy());
    broker.add_bars("SPY", bars());
    broker
}

#[test]
fn breakout_flows_into_one_order() {
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Cancel, Some(8)), paper()).expect("agent");
    let summary = agent.run(&StopFlag::new()).expect("run");

    assert_eq!(summary.cycles, 8);
    assert_eq!(summary.signals, 1);
    assert_eq!(summary.orders, 1);

    let (_, intent) = &agent.orders()[0];
    assert_eq!(intent.instrument_id, "SPY");
    assert_eq!(intent.action, Action::Buy);
    assert_eq!(intent.quantity, 95.0);

    let holdings = agent.broker().holdings();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].quantity, 95.0);
    assert_eq!(agent.allocators()[0].archive().len(), 1);
    assert_eq!(agent.shutdown_reason(), Some(ShutdownReason::Interrupt));
    assert!(agent.broker().is_connected());
}

#[test]
fn long_outage_is_fatal_with_one_cleanup() {
    let mut broker = paper();
    broker.schedule(t0() + Duration::minutes(31), ConnectionEvent::Lost);
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Cancel, None), broker).expect("agent");

    let err = agent.run(&StopFlag::new()).expect_err("connectivity");
    assert!(matches!(err, AgentError::Connectivity(_)));
    assert_eq!(agent.shutdown_reason(), Some(ShutdownReason::Error));

    agent.shutdown(ShutdownReason::Error);
    let stats = agent.broker().stats();
    assert_eq!(stats.cancel_all_calls, 1);
    assert_eq!(stats.disconnects, 1);
    assert_eq!(stats.cancelled_subscriptions, 1);
    assert!(agent.broker().clock() - (t0() + Duration::minutes(31)) > Duration::minutes(1));
}

#[test]
fn short_outage_resubscribes_and_keeps_history() {
    let mut broker = paper();
    broker.schedule(t0() + Duration::minutes(31), ConnectionEvent::Lost);
    broker.schedule(t0() + Duration::minutes(31) + Duration::seconds(20), ConnectionEvent::Restored);
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Cancel, None), broker).expect("agent");
    agent.start().expect("start");
    let before = agent.registry().series("SPY").expect("series").table().len();

    agent.broker_mut().sleep(Duration::minutes(1));
    assert!(!agent.broker().is_connected());

    let outcome = agent.run_cycle(&StopFlag::new());
    assert!(matches!(outcome, CycleOutcome::Completed { .. }));
    assert!(agent.broker().is_connected());
    assert!(!agent.broker().connection().needs_resubscription());
    assert_eq!(agent.broker().stats().cancelled_subscriptions, 1);
    assert_eq!(agent.broker().live_subscriptions().len(), 1);
    assert!(agent.registry().series("SPY").expect("series").table().len() >= before);
}

#[test]
fn guardrail_breach_shuts_down() {
    let mut agent = Agent::new(config(200_000.0, EndingProcess::Cancel, Some(3)), paper()).expect("agent");
    let err = agent.run(&StopFlag::new()).expect_err("breach");
    assert!(matches!(err, AgentError::GuardrailBreach(_)));

    let stats = agent.broker().stats();
    assert_eq!(stats.cancel_all_calls, 1);
    assert_eq!(stats.disconnects, 1);
    assert!(!agent.broker().is_connected());
}

#[test]
fn interrupt_cancels_without_disconnecting() {
    let stop = StopFlag::new();
    stop.raise();
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Cancel, None), paper()).expect("agent");
    let summary = agent.run(&stop).expect("run");

    assert_eq!(summary.cycles, 0);
    let stats = agent.broker().stats();
    assert_eq!(stats.cancel_all_calls, 1);
    assert_eq!(stats.cancelled_subscriptions, 1);
    assert_eq!(stats.disconnects, 0);
    assert!(agent.broker().is_connected());
}

#[test]
fn interrupt_can_disconnect_when_configured() {
    let stop = StopFlag::new();
    stop.raise();
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Disconnect, None), paper()).expect("agent");
    agent.run(&stop).expect("run");
    assert_eq!(agent.broker().stats().disconnects, 1);
}

#[test]
fn constraint_violation_skips_the_cycle() {
    let mut broker = paper();
    broker.set_position("QQQ", 5_000.0, 100.0);
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Cancel, Some(8)), broker).expect("agent");

    let summary = agent.run(&StopFlag::new()).expect("run");
    assert_eq!(summary.cycles, 8);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.orders, 0);
    assert!(agent.broker().fills().is_empty());
    assert!(agent.signals().consumed().is_empty());
    assert_eq!(agent.signals().discarded().len(), 1);
    assert_eq!(agent.signals().discarded()[0].tag, "EW1");
}

#[test]
fn interrupt_during_outage_stops_waiting() {
    let mut broker = paper();
    broker.schedule(t0() + Duration::minutes(31), ConnectionEvent::Lost);
    let mut agent = Agent::new(config(50_000.0, EndingProcess::Cancel, None), broker).expect("agent");
    agent.start().expect("start");
    agent.broker_mut().sleep(Duration::minutes(1));
    assert!(!agent.broker().is_connected());

    let stop = StopFlag::new();
    stop.raise();
    let before = agent.broker().clock();
    let outcome = agent.run_cycle(&stop);

    assert!(matches!(outcome, CycleOutcome::Interrupted));
    assert_eq!(agent.broker().clock(), before);
    assert_eq!(agent.summary().cycles, 0);
    assert!(agent.shutdown_reason().is_none());
}
