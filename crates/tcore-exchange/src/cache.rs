use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tcore_schemas::{AccountType, Candle, Decimal8, Micros, Side, TenantId};

use crate::error::ExchangeError;
use crate::port::ExchangePort;
use crate::types::{MarginAccountInfo, OrderHandle, TransferDirection};

#[derive(Clone, Copy, Hash, PartialEq, Eq)]
enum PriceKind {
    Bid,
    Ask,
}

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Short-TTL cache decorating an `ExchangePort` (C3). Bid/ask are cached
/// for 5s by default; candle windows for 30s, keyed by
/// `(symbol, interval, limit)`. Process-local only — no distributed
/// coherency is promised. Cache misses and expirations fall through to the
/// wrapped port; everything else (orders, transfers, balances, margin) is
/// passed straight through uncached.
pub struct MarketDataCache {
    inner: Arc<dyn ExchangePort>,
    price_ttl: Duration,
    kline_ttl: Duration,
    prices: Mutex<HashMap<(String, PriceKind), Cached<Micros>>>,
    klines: Mutex<HashMap<(String, String, usize), Cached<Vec<Candle>>>>,
}

impl MarketDataCache {
    pub fn new(inner: Arc<dyn ExchangePort>) -> Self {
        MarketDataCache {
            inner,
            price_ttl: Duration::from_secs(5),
            kline_ttl: Duration::from_secs(30),
            prices: Mutex::new(HashMap::new()),
            klines: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttls(inner: Arc<dyn ExchangePort>, price_ttl: Duration, kline_ttl: Duration) -> Self {
        MarketDataCache {
            inner,
            price_ttl,
            kline_ttl,
            prices: Mutex::new(HashMap::new()),
            klines: Mutex::new(HashMap::new()),
        }
    }

    async fn price(&self, symbol: &str, kind: PriceKind) -> Result<Micros, ExchangeError> {
        let key = (symbol.to_string(), kind);
        if let Some(cached) = self.prices.lock().expect("cache lock poisoned").get(&key) {
            if cached.fetched_at.elapsed() < self.price_ttl {
                return Ok(cached.value);
            }
        }

        let value = match kind {
            PriceKind::Bid => self.inner.best_bid(symbol).await?,
            PriceKind::Ask => self.inner.best_ask(symbol).await?,
        };

        self.prices.lock().expect("cache lock poisoned").insert(
            key,
            Cached {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(value)
    }
}

#[async_trait]
impl ExchangePort for MarketDataCache {
    async fn best_bid(&self, symbol: &str) -> Result<Micros, ExchangeError> {
        self.price(symbol, PriceKind::Bid).await
    }

    async fn best_ask(&self, symbol: &str) -> Result<Micros, ExchangeError> {
        self.price(symbol, PriceKind::Ask).await
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let key = (symbol.to_string(), interval.to_string(), limit);
        if let Some(cached) = self.klines.lock().expect("cache lock poisoned").get(&key) {
            if cached.fetched_at.elapsed() < self.kline_ttl {
                return Ok(cached.value.clone());
            }
        }

        let value = self.inner.klines(symbol, interval, limit).await?;

        self.klines.lock().expect("cache lock poisoned").insert(
            key,
            Cached {
                value: value.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(value)
    }

    async fn get_available_quote_balance(
        &self,
        tenant_id: TenantId,
        quote_asset: &str,
        account_type: AccountType,
        symbol: Option<&str>,
    ) -> Result<Micros, ExchangeError> {
        self.inner
            .get_available_quote_balance(tenant_id, quote_asset, account_type, symbol)
            .await
    }

    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
    ) -> Result<OrderHandle, ExchangeError> {
        self.inner.place_market(symbol, side, qty).await
    }

    async fn place_limit(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
        price: Micros,
    ) -> Result<OrderHandle, ExchangeError> {
        self.inner.place_limit(symbol, side, qty, price).await
    }

    async fn place_stop_loss(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal8,
        stop_price: Micros,
    ) -> Result<OrderHandle, ExchangeError> {
        self.inner.place_stop_loss(symbol, side, qty, stop_price).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.inner.cancel_order(order_id).await
    }

    async fn transfer(
        &self,
        direction: TransferDirection,
        asset: &str,
        amount: Micros,
        symbol: Option<&str>,
    ) -> Result<(), ExchangeError> {
        self.inner.transfer(direction, asset, amount, symbol).await
    }

    async fn margin_account(&self, symbol: &str) -> Result<MarginAccountInfo, ExchangeError> {
        self.inner.margin_account(symbol).await
    }

    async fn get_margin_level(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.inner.get_margin_level(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPort {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExchangePort for CountingPort {
        async fn best_bid(&self, _symbol: &str) -> Result<Micros, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Micros::from_f64(100.0))
        }
        async fn best_ask(&self, _symbol: &str) -> Result<Micros, ExchangeError> {
            Ok(Micros::from_f64(101.0))
        }
        async fn klines(&self, _s: &str, _i: &str, _l: usize) -> Result<Vec<Candle>, ExchangeError> {
            Ok(vec![])
        }
        async fn get_available_quote_balance(
            &self,
            _t: TenantId,
            _q: &str,
            _a: AccountType,
            _s: Option<&str>,
        ) -> Result<Micros, ExchangeError> {
            Ok(Micros::ZERO)
        }
        async fn place_market(&self, _s: &str, _side: Side, _q: Decimal8) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn place_limit(
            &self,
            _s: &str,
            _side: Side,
            _q: Decimal8,
            _p: Micros,
        ) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn place_stop_loss(
            &self,
            _s: &str,
            _side: Side,
            _q: Decimal8,
            _p: Micros,
        ) -> Result<OrderHandle, ExchangeError> {
            unimplemented!()
        }
        async fn cancel_order(&self, _o: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn transfer(
            &self,
            _d: TransferDirection,
            _a: &str,
            _amt: Micros,
            _s: Option<&str>,
        ) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn margin_account(&self, _s: &str) -> Result<MarginAccountInfo, ExchangeError> {
            unimplemented!()
        }
        async fn get_margin_level(&self, _s: &str) -> Result<f64, ExchangeError> {
            Ok(1.0)
        }
    }

    #[tokio::test]
    async fn repeated_best_bid_within_ttl_hits_cache_once() {
        let inner = Arc::new(CountingPort {
            calls: AtomicUsize::new(0),
        });
        let cache = MarketDataCache::with_ttls(
            inner.clone(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        );

        cache.best_bid("BTCUSDC").await.unwrap();
        cache.best_bid("BTCUSDC").await.unwrap();
        cache.best_bid("BTCUSDC").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_symbols_are_cached_independently() {
        let inner = Arc::new(CountingPort {
            calls: AtomicUsize::new(0),
        });
        let cache = MarketDataCache::new(inner.clone());

        cache.best_bid("BTCUSDC").await.unwrap();
        cache.best_bid("ETHUSDC").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
