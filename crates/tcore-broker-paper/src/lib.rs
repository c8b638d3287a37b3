//! Deterministic in-memory exchange adapter (C2): the "testnet-backed"
//! implementation of `ExchangePort` referenced by spec §4.2. Every value it
//! returns is whatever a test or the composition root seeded explicitly —
//! no randomness, no wall-clock dependence beyond the injected `Clock` used
//! to mint order ids. Used for local development, CI, and tenants
//! configured with `BINANCE_USE_TESTNET=true`-equivalent paper trading.

pub mod types;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tcore_clock::Clock;
use tcore_exchange::{ExchangeError, ExchangePort, MarginAccountInfo, OrderHandle, TransferDirection};
use tcore_schemas::{AccountType, Candle, Decimal8, Micros, Side, TenantId};

use types::{BalanceKey, SeededPrice, TransferRecord};

fn account_type_key(account_type: AccountType) -> String {
    match account_type {
        AccountType::Spot => "spot".to_string(),
        AccountType::IsolatedMargin => "isolated_margin".to_string(),
    }
}

#[derive(Default)]
struct PaperState {
    prices: BTreeMap<String, SeededPrice>,
    klines: BTreeMap<(String, String), Vec<Candle>>,
    balances: BTreeMap<BalanceKey, Micros>,
    orders: BTreeMap<String, OrderHandle>,
    cancelled: std::collections::BTreeSet<String>,
    margin_accounts: BTreeMap<String, MarginAccountInfo>,
    margin_levels: BTreeMap<String, f64>,
    transfers: Vec<TransferRecord>,
    next_order_seq: u64,
}

/// Deterministic paper/testnet broker. Cheap to clone (an `Arc` handle);
/// share one instance across a tenant's composition root.
#[derive(Clone)]
pub struct PaperBroker {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<PaperState>>,
}

impl PaperBroker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(PaperState::default())),
        }
    }

    pub fn set_price(&self, symbol: &str, bid: Micros, ask: Micros) {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.prices.insert(symbol.to_string(), SeededPrice { bid, ask });
    }

    pub fn set_klines(&self, symbol: &str, interval: &str, candles: Vec<Candle>) {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.klines.insert((symbol.to_string(), interval.to_string()), candles);
    }

    pub fn set_balance(
        &self,
        tenant_id: TenantId,
        quote_asset: &str,
        account_type: AccountType,
        amount: Micros,
    ) {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.balances.insert(
            (tenant_id, quote_asset.to_string(), account_type_key(account_type)),
            amount,
        );
    }

    pub fn set_margin_account(&self, symbol: &str, info: MarginAccountInfo) {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.margin_accounts.insert(symbol.to_string(), info);
    }

    pub fn set_margin_level(&self, symbol: &str, level: f64) {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.margin_levels.insert(symbol.to_string(), level);
    }

    pub fn placed_orders(&self) -> Vec<OrderHandle> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        st.orders.values().cloned().collect()
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        st.transfers.clone()
    }

    fn next_order_id(&self, st: &mut PaperState, kind: &str) -> String {
        st.next_order_seq += 1;
        format!("paper:{kind}:{}", st.next_order_seq)
    }
}

#[async_trait]
impl ExchangePort for PaperBroker {
    async fn best_bid(&self, symbol: &str) -> Result<Micros, ExchangeError> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        st.prices
            .get(symbol)
            .map(|p| p.bid)
            .ok_or_else(|| ExchangeError::Connection {
                operation: "best_bid".to_string(),
                detail: format!("no price seeded for {symbol}"),
            })
    }

    async fn best_ask(&self, symbol: &str) -> Result<Micros, ExchangeError> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        st.prices
            .get(symbol)
            .map(|p| p.ask)
            .ok_or_else(|| ExchangeError::Connection {
                operation: "best_ask".to_string(),
                detail: format!("no price seeded for {symbol}"),
            })
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        let key = (symbol.to_string(), interval.to_string());
        let mut rows = st.klines.get(&key).cloned().unwrap_or_default();
        if rows.len() > limit {
            let drop = rows.len() - limit;
            rows.drain(0..drop);
        }
        Ok(rows)
    }

    async fn get_available_quote_balance(
        &self,
        tenant_id: TenantId,
        quote_asset: &str,
        account_type: AccountType,
        _symbol: Option<&str>,
    ) -> Result<Micros, ExchangeError> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        let key = (tenant_id, quote_asset.to_string(), account_type_key(account_type));
        Ok(st.balances.get(&key).copied().unwrap_or(Micros::ZERO))
    }

    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
    ) -> Result<OrderHandle, ExchangeError> {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        let price = st.prices.get(symbol).map(|p| match side {
            Side::Buy => p.ask,
            Side::Sell => p.bid,
        });
        let order_id = self.next_order_id(&mut st, "market");
        let handle = OrderHandle {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            price,
            stop_price: None,
            placed_at: self.clock.now_millis(),
        };
        st.orders.insert(order_id, handle.clone());
        Ok(handle)
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
        price: Micros,
    ) -> Result<OrderHandle, ExchangeError> {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        let order_id = self.next_order_id(&mut st, "limit");
        let handle = OrderHandle {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            price: Some(price),
            stop_price: None,
            placed_at: self.clock.now_millis(),
        };
        st.orders.insert(order_id, handle.clone());
        Ok(handle)
    }

    async fn place_stop_loss(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
        stop_price: Micros,
    ) -> Result<OrderHandle, ExchangeError> {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        let order_id = self.next_order_id(&mut st, "stop");
        let handle = OrderHandle {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            price: None,
            stop_price: Some(stop_price),
            placed_at: self.clock.now_millis(),
        };
        st.orders.insert(order_id, handle.clone());
        Ok(handle)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.cancelled.insert(order_id.to_string());
        Ok(())
    }

    async fn transfer(
        &self,
        direction: TransferDirection,
        asset: &str,
        amount: Micros,
        symbol: Option<&str>,
    ) -> Result<(), ExchangeError> {
        let mut st = self.state.lock().expect("paper broker lock poisoned");
        st.transfers.push(TransferRecord {
            direction,
            asset: asset.to_string(),
            amount,
            symbol: symbol.map(str::to_string),
        });
        Ok(())
    }

    async fn margin_account(&self, symbol: &str) -> Result<MarginAccountInfo, ExchangeError> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        Ok(st.margin_accounts.get(symbol).cloned().unwrap_or(MarginAccountInfo {
            symbol: symbol.to_string(),
            borrowed: Micros::ZERO,
            collateral: Micros::ZERO,
            margin_level: 999.0,
        }))
    }

    async fn get_margin_level(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let st = self.state.lock().expect("paper broker lock poisoned");
        Ok(st.margin_levels.get(symbol).copied().unwrap_or(10.0))
    }
}
