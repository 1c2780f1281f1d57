//! End-to-end paper trading against a fixed price source

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use ashare_bot::paper_trading::{state, Clock, OrderStatus, PaperTradingConfig, PaperTradingEngine};
use ashare_bot::types::{DataSource, Snapshot, MARKET_TZ};
use ashare_bot::{MarketDataError, SnapshotSource, TradeError};

/// Quotes every symbol at the same price with a ±10% band around `pre_close`.
struct FixedQuote {
    last: Mutex<f64>,
    pre_close: f64,
}

impl FixedQuote {
    fn new(last: f64, pre_close: f64) -> Self {
        Self {
            last: Mutex::new(last),
            pre_close,
        }
    }

    fn set_last(&self, last: f64) {
        *self.last.lock().unwrap() = last;
    }
}

#[async_trait]
impl SnapshotSource for FixedQuote {
    async fn get_snapshot(&self, symbol: &str) -> Result<(Snapshot, DataSource), MarketDataError> {
        let last = *self.last.lock().unwrap();
        Ok((
            Snapshot::with_limits(symbol.to_string(), last, last, last, self.pre_close, 0),
            DataSource::Fallback,
        ))
    }
}

/// Settable simulated time
#[derive(Clone)]
struct SimClock(Arc<Mutex<DateTime<Utc>>>);

impl SimClock {
    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> Self {
        Self(Arc::new(Mutex::new(shanghai(y, m, d, hh, mm))))
    }

    fn set(&self, y: i32, m: u32, d: u32, hh: u32, mm: u32) {
        *self.0.lock().unwrap() = shanghai(y, m, d, hh, mm);
    }

    fn clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock().unwrap())
    }
}

fn shanghai(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
    MARKET_TZ
        .with_ymd_and_hms(y, m, d, hh, mm, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn config(cash: f64) -> PaperTradingConfig {
    PaperTradingConfig {
        account_id: format!("scenario-{}", uuid::Uuid::new_v4()),
        initial_cash: cash,
        state_dir: std::env::temp_dir()
            .join("ashare_scenario_tests")
            .to_string_lossy()
            .into_owned(),
        ..Default::default()
    }
}

#[tokio::test]
async fn buy_then_sell_across_settlement() {
    let quote = Arc::new(FixedQuote::new(100.0, 100.0));
    // 2026-02-16 is a Monday
    let sim = SimClock::at(2026, 2, 16, 10, 0);
    let engine = PaperTradingEngine::new(config(100_000.0), quote.clone()).with_clock(sim.clock());

    let buy = engine.open_long("600519.SH", 250.0, 1).await.unwrap();
    assert_eq!(buy.status, OrderStatus::Filled);
    assert_eq!(buy.executed_qty, 200.0);
    assert_eq!(buy.avg_price, 100.0);
    assert_eq!(buy.commission, 0.0);

    let balance = engine.get_balance().await.unwrap();
    assert!((balance.wallet_balance - 80_000.0).abs() < 1e-6);
    assert!((balance.market_value - 20_000.0).abs() < 1e-6);

    let err = engine.close_long("600519.SH", 0.0).await.unwrap_err();
    assert!(matches!(err, TradeError::TPlusOneRestricted(ref s) if s == "600519.SH"));

    let positions = engine.get_positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, "long");
    assert_eq!(positions[0].available_qty, 0.0);

    // Next weekday
    sim.set(2026, 2, 17, 10, 0);
    let positions = engine.get_positions().await.unwrap();
    assert_eq!(positions[0].available_qty, 200.0);

    let sell = engine.close_long("600519.SH", 0.0).await.unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);
    assert_eq!(sell.executed_qty, 200.0);
    assert!((sell.commission - 26.0).abs() < 1e-9);
    assert!(sell.order_id.starts_with("ashare-close-long-"));

    let balance = engine.get_balance().await.unwrap();
    assert!((balance.wallet_balance - (100_000.0 - 26.0)).abs() < 1e-6);
    assert_eq!(balance.market_value, 0.0);
    assert!(engine.get_positions().await.unwrap().is_empty());

    let orders = engine.orders().await;
    assert_eq!(orders.len(), 2);
    assert!(orders.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[tokio::test]
async fn partial_sell_rounds_to_lots_and_caps_at_sellable() {
    let quote = Arc::new(FixedQuote::new(50.0, 50.0));
    let sim = SimClock::at(2026, 2, 16, 13, 30);
    let engine = PaperTradingEngine::new(config(100_000.0), quote.clone()).with_clock(sim.clock());

    engine.open_long("000001", 500.0, 1).await.unwrap();
    sim.set(2026, 2, 17, 9, 45);
    // Fresh buy today is not sellable
    engine.open_long("000001", 100.0, 1).await.unwrap();

    let sell = engine.close_long("000001", 250.0).await.unwrap();
    assert_eq!(sell.executed_qty, 200.0);

    let sell = engine.close_long("000001", 10_000.0).await.unwrap();
    assert_eq!(sell.executed_qty, 300.0);

    assert!(matches!(
        engine.close_long("000001", 0.0).await,
        Err(TradeError::TPlusOneRestricted(_))
    ));

    let positions = engine.get_positions().await.unwrap();
    assert_eq!(positions[0].position_amt, 100.0);
}

#[tokio::test]
async fn weekend_and_lunch_are_outside_session() {
    let quote = Arc::new(FixedQuote::new(100.0, 100.0));
    let sim = SimClock::at(2026, 2, 21, 10, 0);
    let engine = PaperTradingEngine::new(config(100_000.0), quote).with_clock(sim.clock());

    assert!(matches!(
        engine.open_long("600519", 100.0, 1).await,
        Err(TradeError::OutsideTradingSession)
    ));

    sim.set(2026, 2, 16, 12, 0);
    assert!(matches!(
        engine.open_long("600519", 100.0, 1).await,
        Err(TradeError::OutsideTradingSession)
    ));

    sim.set(2026, 2, 16, 15, 0);
    assert!(matches!(
        engine.close_long("600519", 100.0).await,
        Err(TradeError::OutsideTradingSession)
    ));
}

#[tokio::test]
async fn odd_lots_and_cash_account_operations_are_rejected() {
    let quote = Arc::new(FixedQuote::new(100.0, 100.0));
    let sim = SimClock::at(2026, 2, 16, 10, 0);
    let engine = PaperTradingEngine::new(config(100_000.0), quote).with_clock(sim.clock());

    assert!(matches!(
        engine.open_long("600519", 99.0, 1).await,
        Err(TradeError::InvalidLotSize)
    ));
    assert!(matches!(
        engine.open_short("600519", 100.0, 1),
        Err(TradeError::UnsupportedForCashAccount(_))
    ));
    assert!(matches!(
        engine.close_short("600519", 100.0),
        Err(TradeError::UnsupportedForCashAccount(_))
    ));
    assert!(matches!(
        engine.set_leverage("600519", 2),
        Err(TradeError::UnsupportedForCashAccount(_))
    ));
    assert!(matches!(
        engine.set_margin_mode("600519", false),
        Err(TradeError::UnsupportedForCashAccount(_))
    ));
    assert!(engine.cancel_all_orders("600519").is_ok());
}

#[tokio::test]
async fn limit_up_rejects_buys() {
    let quote = Arc::new(FixedQuote::new(100.0, 100.0));
    let sim = SimClock::at(2026, 2, 16, 10, 0);
    let engine = PaperTradingEngine::new(config(100_000.0), quote.clone()).with_clock(sim.clock());

    quote.set_last(110.0);
    let err = engine.open_long("600519", 100.0, 1).await.unwrap_err();
    assert_eq!(err.to_string(), "price limit reached (limit-up): 600519.SH");
}

#[tokio::test]
async fn state_survives_restart() {
    let cfg = config(100_000.0);
    let quote = Arc::new(FixedQuote::new(100.0, 100.0));
    let sim = SimClock::at(2026, 2, 16, 10, 0);

    let first = PaperTradingEngine::new(cfg.clone(), quote.clone()).with_clock(sim.clock());
    let fill = first.open_long("600519", 300.0, 1).await.unwrap();
    let path = first.state_path().to_path_buf();
    drop(first);
    assert!(path.exists());

    let second = PaperTradingEngine::new(cfg, quote).with_clock(sim.clock());
    let balance = second.get_balance().await.unwrap();
    assert!((balance.wallet_balance - 70_000.0).abs() < 1e-6);

    let order = second.get_order_status("600519", &fill.order_id).await.unwrap();
    assert_eq!(order.executed_qty, 300.0);

    // Still the buy date, so still unsettled
    assert!(matches!(
        second.close_long("600519", 0.0).await,
        Err(TradeError::TPlusOneRestricted(_))
    ));

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn read_only_rollover_is_written_to_disk() {
    let quote = Arc::new(FixedQuote::new(20.0, 20.0));
    let sim = SimClock::at(2026, 2, 16, 10, 0);
    let engine = PaperTradingEngine::new(config(100_000.0), quote).with_clock(sim.clock());

    engine.open_long("600519", 300.0, 1).await.unwrap();
    let saved = state::try_load(engine.state_path()).unwrap();
    assert_eq!(saved.positions["600519.SH"].today_buy_qty, 300);

    sim.set(2026, 2, 17, 9, 31);
    let positions = engine.get_positions().await.unwrap();
    assert_eq!(positions[0].available_qty, 300.0);

    let saved = state::try_load(engine.state_path()).unwrap();
    let pos = &saved.positions["600519.SH"];
    assert_eq!(pos.today_buy_qty, 0);
    assert_eq!(pos.quantity, 300);
    assert_eq!(pos.last_buy_date, "2026-02-16");

    let _ = std::fs::remove_file(engine.state_path());
}

#[tokio::test]
async fn corrupt_state_file_starts_fresh() {
    let cfg = config(42_000.0);
    let probe = PaperTradingEngine::new(cfg.clone(), Arc::new(FixedQuote::new(1.0, 1.0)));
    let path = probe.state_path().to_path_buf();
    drop(probe);

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json at all").unwrap();

    let engine = PaperTradingEngine::new(cfg, Arc::new(FixedQuote::new(1.0, 1.0)));
    let balance = engine.get_balance().await.unwrap();
    assert_eq!(balance.wallet_balance, 42_000.0);
    assert!(engine.orders().await.is_empty());

    let _ = std::fs::remove_file(path);
}
