//! Paper Trading Engine
//!
//! Simulates a long-only A-share cash account against live snapshot prices.
//!
//! Rules enforced on every trade:
//! - **Sessions**: weekdays 09:30-11:30 and 13:00-15:00, Asia/Shanghai
//! - **Lots**: quantities floor to multiples of 100 shares
//! - **T+1**: shares bought today become sellable on the next trading date
//! - **Price limits**: no buys at limit-up, no sells at limit-down
//!
//! Every order fills immediately at the last price. State is written to a
//! JSON file after each mutation and reloaded on construction.

pub mod session;
pub mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{PriceLimit, TradeError};
use crate::provider::SnapshotSource;
use crate::symbol::normalize_symbol;
use crate::types::{Snapshot, DEFAULT_MARKET};
pub use session::TradingSession;
pub use state::{OrderRecord, OrderSide, OrderStatus, PersistedState, PositionRecord};

/// Minimum tradable unit
pub const LOT_SIZE: i64 = 100;

/// Limit-up when last >= upper * this
const LIMIT_UP_TOLERANCE: f64 = 0.999;
/// Limit-down when last <= lower * this
const LIMIT_DOWN_TOLERANCE: f64 = 1.001;

const OPEN_LONG_PREFIX: &str = "ashare-open-long-";
const CLOSE_LONG_PREFIX: &str = "ashare-close-long-";

/// Source of "now" for session and settlement checks
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Paper trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTradingConfig {
    pub account_id: String,
    pub market: String,
    /// Starting cash (CNY) when no prior state exists
    pub initial_cash: f64,
    /// Charged on sell proceeds (fees plus stamp duty)
    pub commission_rate: f64,
    /// Directory for the state file; empty means the temp dir
    #[serde(default)]
    pub state_dir: String,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            account_id: "ashare-paper".to_string(),
            market: DEFAULT_MARKET.to_string(),
            initial_cash: 1_000_000.0,
            commission_rate: 0.0013,
            state_dir: String::new(),
        }
    }
}

/// Result of a trade request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFill {
    /// Empty for `NoPosition`
    pub order_id: String,
    pub status: OrderStatus,
    pub symbol: String,
    pub executed_qty: f64,
    pub avg_price: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub total_equity: f64,
    pub wallet_balance: f64,
    pub available_balance: f64,
    pub unrealized_profit: f64,
    pub market_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub symbol: String,
    pub side: &'static str,
    pub entry_price: f64,
    pub mark_price: f64,
    pub position_amt: f64,
    pub unrealized_profit: f64,
    pub available_qty: f64,
    pub leverage: f64,
    pub liquidation_price: f64,
    pub update_time: i64,
}

/// Floor to a whole number of lots. Non-positive input is 0.
pub fn lot_shares(quantity: f64) -> i64 {
    if !quantity.is_finite() || quantity <= 0.0 {
        return 0;
    }
    (quantity.floor() as i64) / LOT_SIZE * LOT_SIZE
}

pub struct PaperTradingEngine {
    config: PaperTradingConfig,
    source: Arc<dyn SnapshotSource>,
    session: TradingSession,
    state_path: PathBuf,
    state: Mutex<PersistedState>,
    clock: Clock,
}

impl PaperTradingEngine {
    /// Create an engine, restoring any prior state for the account.
    pub fn new(config: PaperTradingConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let state_path = state::state_file_path(Path::new(&config.state_dir), &config.account_id);

        let mut account = PersistedState {
            cash: config.initial_cash,
            ..Default::default()
        };
        if let Some(prior) = state::try_load(&state_path) {
            if prior.cash > 0.0 {
                account.cash = prior.cash;
            }
            if !prior.positions.is_empty() {
                account.positions = prior.positions;
            }
            if !prior.orders.is_empty() {
                account.orders = prior.orders;
            }
        }

        info!(
            account = %config.account_id,
            market = %config.market,
            cash = %format!("{:.2}", account.cash),
            positions = account.positions.len(),
            "📄 [PAPER] Engine ready"
        );

        Self {
            config,
            source,
            session: TradingSession::a_share(),
            state_path,
            state: Mutex::new(account),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_session(mut self, session: TradingSession) -> Self {
        self.session = session;
        self
    }

    pub fn account_id(&self) -> &str {
        &self.config.account_id
    }

    pub fn market(&self) -> &str {
        &self.config.market
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn ensure_trading_session(&self) -> Result<(), TradeError> {
        if self.session.is_open(self.now()) {
            Ok(())
        } else {
            Err(TradeError::OutsideTradingSession)
        }
    }

    fn today(&self) -> String {
        self.session.trading_date(self.now()).format("%Y-%m-%d").to_string()
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, TradeError> {
        let (snapshot, source) = self.source.get_snapshot(symbol).await?;
        if !snapshot.is_valid() {
            return Err(TradeError::InvalidPrice(symbol.to_string()));
        }
        debug!(symbol = %symbol, price = snapshot.last_price, source = %source, "[PAPER] Priced");
        Ok(snapshot)
    }

    /// Shares bought on an earlier date become sellable. Returns whether
    /// anything changed.
    fn roll_to_next_trading_day(&self, account: &mut PersistedState) -> bool {
        let today = self.today();
        let mut changed = false;
        for pos in account.positions.values_mut() {
            if pos.last_buy_date != today && pos.today_buy_qty != 0 {
                pos.today_buy_qty = 0;
                changed = true;
            }
        }
        if changed {
            debug!(date = %today, "[PAPER] Settlement rollover");
        }
        changed
    }

    /// Failures are logged; a trade never fails because the file could not
    /// be written.
    fn persist(&self, account: &PersistedState) {
        if let Err(e) = state::save(&self.state_path, account) {
            error!(path = %self.state_path.display(), error = %e, "💾 [PAPER] Failed to save state");
        }
    }

    fn order_id(&self, prefix: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}-{}", prefix, self.now().timestamp_millis(), &suffix[..8])
    }

    /// Buy `quantity` shares (floored to a lot) at the last price.
    ///
    /// `leverage` is accepted and ignored: cash accounts trade at 1x.
    pub async fn open_long(
        &self,
        symbol: &str,
        quantity: f64,
        _leverage: u32,
    ) -> Result<OrderFill, TradeError> {
        let symbol = normalize_symbol(symbol);
        self.ensure_trading_session()?;

        let mut account = self.state.lock().await;

        let snapshot = self.fetch_snapshot(&symbol).await?;
        if snapshot.upper_limit > 0.0
            && snapshot.last_price >= snapshot.upper_limit * LIMIT_UP_TOLERANCE
        {
            return Err(TradeError::PriceLimitReached {
                limit: PriceLimit::LimitUp,
                symbol,
            });
        }

        let shares = lot_shares(quantity);
        if shares < LOT_SIZE {
            return Err(TradeError::InvalidLotSize);
        }

        let price = snapshot.last_price;
        let cost = shares as f64 * price;
        if account.cash < cost {
            return Err(TradeError::InsufficientCash {
                need: cost,
                available: account.cash,
            });
        }

        self.roll_to_next_trading_day(&mut account);

        let today = self.today();
        let pos = account
            .positions
            .entry(symbol.clone())
            .or_insert_with(|| PositionRecord::new(symbol.clone()));
        let total_cost = pos.average_price * pos.quantity as f64 + cost;
        pos.quantity += shares;
        pos.average_price = total_cost / pos.quantity as f64;
        pos.today_buy_qty += shares;
        pos.last_buy_date = today;
        account.cash -= cost;

        let order_id = self.order_id(OPEN_LONG_PREFIX);
        account.orders.insert(
            order_id.clone(),
            OrderRecord {
                symbol: symbol.clone(),
                status: OrderStatus::Filled,
                side: OrderSide::Buy,
                executed_qty: shares as f64,
                avg_price: price,
                commission: 0.0,
                update_time: self.now().timestamp_millis(),
            },
        );
        self.persist(&account);

        info!(
            order_id = %order_id,
            symbol = %symbol,
            shares,
            price = %format!("{:.2}", price),
            cash = %format!("{:.2}", account.cash),
            "📈 [PAPER] Bought"
        );

        Ok(OrderFill {
            order_id,
            status: OrderStatus::Filled,
            symbol,
            executed_qty: shares as f64,
            avg_price: price,
            commission: 0.0,
        })
    }

    /// Sell settled shares. `quantity <= 0` sells everything sellable.
    ///
    /// Closing a symbol with no holding is a `NoPosition` result, not an
    /// error.
    pub async fn close_long(&self, symbol: &str, quantity: f64) -> Result<OrderFill, TradeError> {
        let symbol = normalize_symbol(symbol);
        self.ensure_trading_session()?;

        let mut account = self.state.lock().await;

        let snapshot = self.fetch_snapshot(&symbol).await?;
        if snapshot.lower_limit > 0.0
            && snapshot.last_price <= snapshot.lower_limit * LIMIT_DOWN_TOLERANCE
        {
            return Err(TradeError::PriceLimitReached {
                limit: PriceLimit::LimitDown,
                symbol,
            });
        }

        if self.roll_to_next_trading_day(&mut account) {
            self.persist(&account);
        }

        let sellable = match account.positions.get(&symbol) {
            Some(pos) if pos.quantity > 0 => pos.sellable(),
            _ => {
                debug!(symbol = %symbol, "[PAPER] Close requested with no position");
                return Ok(OrderFill {
                    order_id: String::new(),
                    status: OrderStatus::NoPosition,
                    symbol,
                    executed_qty: 0.0,
                    avg_price: 0.0,
                    commission: 0.0,
                });
            }
        };
        if sellable <= 0 {
            return Err(TradeError::TPlusOneRestricted(symbol));
        }

        let requested = if quantity <= 0.0 {
            sellable
        } else {
            lot_shares(quantity).min(sellable)
        };
        let shares = lot_shares(requested as f64);
        if shares < LOT_SIZE {
            return Err(TradeError::InvalidLotSize);
        }

        let price = snapshot.last_price;
        let proceeds = shares as f64 * price;
        let commission = proceeds * self.config.commission_rate;

        let remaining = match account.positions.get_mut(&symbol) {
            Some(pos) => {
                pos.quantity -= shares;
                pos.quantity
            }
            None => 0,
        };
        if remaining <= 0 {
            account.positions.remove(&symbol);
        }
        account.cash += proceeds - commission;

        let order_id = self.order_id(CLOSE_LONG_PREFIX);
        account.orders.insert(
            order_id.clone(),
            OrderRecord {
                symbol: symbol.clone(),
                status: OrderStatus::Filled,
                side: OrderSide::Sell,
                executed_qty: shares as f64,
                avg_price: price,
                commission,
                update_time: self.now().timestamp_millis(),
            },
        );
        self.persist(&account);

        info!(
            order_id = %order_id,
            symbol = %symbol,
            shares,
            price = %format!("{:.2}", price),
            commission = %format!("{:.2}", commission),
            cash = %format!("{:.2}", account.cash),
            "📉 [PAPER] Sold"
        );

        Ok(OrderFill {
            order_id,
            status: OrderStatus::Filled,
            symbol,
            executed_qty: shares as f64,
            avg_price: price,
            commission,
        })
    }

    pub fn open_short(
        &self,
        _symbol: &str,
        _quantity: f64,
        _leverage: u32,
    ) -> Result<OrderFill, TradeError> {
        Err(TradeError::UnsupportedForCashAccount("open_short"))
    }

    pub fn close_short(&self, _symbol: &str, _quantity: f64) -> Result<OrderFill, TradeError> {
        Err(TradeError::UnsupportedForCashAccount("close_short"))
    }

    pub fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("leverage"))
    }

    pub fn set_margin_mode(&self, _symbol: &str, _cross_margin: bool) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("margin mode"))
    }

    pub fn set_stop_loss(
        &self,
        _symbol: &str,
        _position_side: &str,
        _quantity: f64,
        _stop_price: f64,
    ) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("stop loss"))
    }

    pub fn set_take_profit(
        &self,
        _symbol: &str,
        _position_side: &str,
        _quantity: f64,
        _take_profit_price: f64,
    ) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("take profit"))
    }

    pub fn cancel_stop_loss_orders(&self, _symbol: &str) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("cancel stop loss"))
    }

    pub fn cancel_take_profit_orders(&self, _symbol: &str) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("cancel take profit"))
    }

    pub fn cancel_stop_orders(&self, _symbol: &str) -> Result<(), TradeError> {
        Err(TradeError::UnsupportedForCashAccount("cancel stop orders"))
    }

    /// Nothing ever rests on the book, so there is nothing to cancel.
    pub fn cancel_all_orders(&self, _symbol: &str) -> Result<(), TradeError> {
        Ok(())
    }

    pub async fn get_market_price(&self, symbol: &str) -> Result<f64, TradeError> {
        let symbol = normalize_symbol(symbol);
        Ok(self.fetch_snapshot(&symbol).await?.last_price)
    }

    /// Lot-rounded share count as a string.
    pub fn format_quantity(&self, _symbol: &str, quantity: f64) -> Result<String, TradeError> {
        let shares = lot_shares(quantity);
        if shares < LOT_SIZE {
            return Err(TradeError::InvalidLotSize);
        }
        Ok(shares.to_string())
    }

    pub async fn get_order_status(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderRecord, TradeError> {
        let account = self.state.lock().await;
        account
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| TradeError::OrderNotFound(order_id.to_string()))
    }

    /// Always empty: every order fills on submission.
    pub fn open_orders(&self, _symbol: &str) -> Vec<OrderRecord> {
        Vec::new()
    }

    /// Full order history sorted by order id.
    pub async fn orders(&self) -> Vec<(String, OrderRecord)> {
        let account = self.state.lock().await;
        let mut orders: Vec<(String, OrderRecord)> = account
            .orders
            .iter()
            .map(|(id, order)| (id.clone(), order.clone()))
            .collect();
        orders.sort_by(|a, b| a.0.cmp(&b.0));
        orders
    }

    /// Mark each holding at the last price, falling back to average cost
    /// when no price is available.
    async fn mark_price(&self, pos: &PositionRecord) -> f64 {
        match self.fetch_snapshot(&pos.symbol).await {
            Ok(snapshot) => snapshot.last_price,
            Err(e) => {
                debug!(symbol = %pos.symbol, error = %e, "[PAPER] No mark price, using cost");
                pos.average_price
            }
        }
    }

    pub async fn get_balance(&self) -> Result<AccountBalance, TradeError> {
        let mut account = self.state.lock().await;
        if self.roll_to_next_trading_day(&mut account) {
            self.persist(&account);
        }

        let mut market_value = 0.0;
        let mut unrealized_profit = 0.0;
        for pos in account.positions.values() {
            let mark = self.mark_price(pos).await;
            market_value += pos.quantity as f64 * mark;
            unrealized_profit += (mark - pos.average_price) * pos.quantity as f64;
        }

        Ok(AccountBalance {
            total_equity: account.cash + market_value,
            wallet_balance: account.cash,
            available_balance: account.cash,
            unrealized_profit,
            market_value,
        })
    }

    /// Open positions sorted by symbol.
    pub async fn get_positions(&self) -> Result<Vec<PositionView>, TradeError> {
        let mut account = self.state.lock().await;
        if self.roll_to_next_trading_day(&mut account) {
            self.persist(&account);
        }

        let now_ms = self.now().timestamp_millis();
        let mut symbols: Vec<&String> = account.positions.keys().collect();
        symbols.sort();

        let mut views = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let Some(pos) = account.positions.get(symbol) else {
                continue;
            };
            let mark = self.mark_price(pos).await;
            views.push(PositionView {
                symbol: pos.symbol.clone(),
                side: "long",
                entry_price: pos.average_price,
                mark_price: mark,
                position_amt: pos.quantity as f64,
                unrealized_profit: (mark - pos.average_price) * pos.quantity as f64,
                available_qty: pos.sellable() as f64,
                leverage: 1.0,
                liquidation_price: 0.0,
                update_time: now_ms,
            });
        }
        Ok(views)
    }
}
