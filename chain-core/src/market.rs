//! The on-chain order book: bids, asks, shorts, outstanding margin calls,
//! and per-pair price history.
//!
//! The book is an in-memory mirror, keyed for price-time priority, of the
//! `ByBid` / `ByLong` / `ByCover` outputs the UTXO store already holds as the
//! durable source of truth; it is rebuilt from a UTXO scan at startup and
//! mutated in lock-step with every block the matching engine clears.

use std::collections::BTreeMap;

use crate::asset::{Asset, AssetType};
use crate::price::Price;
use crate::transaction::OutputRef;

/// A resting bid or ask (or short offer), keyed for price-time priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketOrder {
    pub output_ref: OutputRef,
    pub pay_address: [u8; 20],
    pub price: Price,
    pub amount: Asset,
}

/// An outstanding short position eligible for forced liquidation once the
/// market price crosses `call_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginCall {
    pub output_ref: OutputRef,
    pub owner: [u8; 20],
    pub call_price: Price,
    pub payoff: Asset,
    pub collateral: Asset,
}

/// One bar of price/volume history for a trading pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub block_num: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Key type ordering orders by price then time (output ref as a stable
/// tiebreak), ascending. Bids negate their ratio so the lowest key is always
/// the best (highest-price) bid.
type BookKey = (u16, u16, u128, OutputRef);

fn ask_key(pair: (u16, u16), order: &MarketOrder) -> BookKey {
    (pair.0, pair.1, order.price.ratio, order.output_ref)
}

fn bid_key(pair: (u16, u16), order: &MarketOrder) -> BookKey {
    (pair.0, pair.1, u128::MAX - order.price.ratio, order.output_ref)
}

#[derive(Default, Clone)]
pub struct MarketDb {
    bids: BTreeMap<BookKey, MarketOrder>,
    asks: BTreeMap<BookKey, MarketOrder>,
    shorts: BTreeMap<BookKey, MarketOrder>,
    margin_calls: BTreeMap<(u16, u128, OutputRef), MarginCall>,
    price_history: BTreeMap<(u16, u16), Vec<PricePoint>>,
    /// BTS backing resting bids, by quote unit: each bid's quote-denominated
    /// amount converted to BTS at its own price.
    bid_depth: BTreeMap<u16, u64>,
    /// BTS backing resting asks, by quote unit. Short offers back the same
    /// side of the book as asks (both deliver BTS against the quote unit) so
    /// they are folded into the same tally.
    ask_depth: BTreeMap<u16, u64>,
}

fn pair_of(quote: AssetType, base: AssetType) -> (u16, u16) {
    (quote.0, base.0)
}

impl MarketDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_bid(&mut self, order: MarketOrder) {
        let pair = pair_of(order.price.quote, order.price.base);
        let bts = order.price.convert_quote_to_base(order.amount.amount);
        *self.bid_depth.entry(pair.0).or_insert(0) += bts;
        self.bids.insert(bid_key(pair, &order), order);
    }

    pub fn insert_ask(&mut self, order: MarketOrder) {
        let pair = pair_of(order.price.quote, order.price.base);
        *self.ask_depth.entry(pair.0).or_insert(0) += order.amount.amount;
        self.asks.insert(ask_key(pair, &order), order);
    }

    pub fn insert_short(&mut self, order: MarketOrder) {
        let pair = pair_of(order.price.quote, order.price.base);
        *self.ask_depth.entry(pair.0).or_insert(0) += order.amount.amount;
        self.shorts.insert(ask_key(pair, &order), order);
    }

    pub fn remove_bid(&mut self, order: &MarketOrder) {
        let pair = pair_of(order.price.quote, order.price.base);
        let bts = order.price.convert_quote_to_base(order.amount.amount);
        if let Some(depth) = self.bid_depth.get_mut(&pair.0) {
            *depth = depth.saturating_sub(bts);
        }
        self.bids.remove(&bid_key(pair, order));
    }

    pub fn remove_ask(&mut self, order: &MarketOrder) {
        let pair = pair_of(order.price.quote, order.price.base);
        if let Some(depth) = self.ask_depth.get_mut(&pair.0) {
            *depth = depth.saturating_sub(order.amount.amount);
        }
        self.asks.remove(&ask_key(pair, order));
    }

    pub fn remove_short(&mut self, order: &MarketOrder) {
        let pair = pair_of(order.price.quote, order.price.base);
        if let Some(depth) = self.ask_depth.get_mut(&pair.0) {
            *depth = depth.saturating_sub(order.amount.amount);
        }
        self.shorts.remove(&ask_key(pair, order));
    }

    /// The BTS depth of the thinner side of the book for `quote_unit`, used
    /// to gauge whether a market has enough resting liquidity to facilitate
    /// trading.
    #[must_use]
    pub fn get_depth(&self, quote_unit: u16) -> u64 {
        let bid = self.bid_depth.get(&quote_unit).copied().unwrap_or(0);
        let ask = self.ask_depth.get(&quote_unit).copied().unwrap_or(0);
        bid.min(ask)
    }

    #[must_use]
    pub fn best_bid(&self, pair: (u16, u16)) -> Option<MarketOrder> {
        self.bids
            .range((pair.0, pair.1, 0, OutputRef::new(chain_primitives::SmallHash::zero(), 0))..)
            .take_while(|(k, _)| k.0 == pair.0 && k.1 == pair.1)
            .map(|(_, v)| *v)
            .next()
    }

    #[must_use]
    pub fn best_ask(&self, pair: (u16, u16)) -> Option<MarketOrder> {
        self.asks
            .range((pair.0, pair.1, 0, OutputRef::new(chain_primitives::SmallHash::zero(), 0))..)
            .take_while(|(k, _)| k.0 == pair.0 && k.1 == pair.1)
            .map(|(_, v)| *v)
            .next()
    }

    #[must_use]
    pub fn best_short(&self, pair: (u16, u16)) -> Option<MarketOrder> {
        self.shorts
            .range((pair.0, pair.1, 0, OutputRef::new(chain_primitives::SmallHash::zero(), 0))..)
            .take_while(|(k, _)| k.0 == pair.0 && k.1 == pair.1)
            .map(|(_, v)| *v)
            .next()
    }

    pub fn insert_margin_call(&mut self, call: MarginCall) {
        let key = (call.call_price.base.0, call.call_price.ratio, call.output_ref);
        self.margin_calls.insert(key, call);
    }

    pub fn remove_margin_call(&mut self, call: &MarginCall) {
        let key = (call.call_price.base.0, call.call_price.ratio, call.output_ref);
        self.margin_calls.remove(&key);
    }

    /// The lowest call price outstanding for `base_unit`, i.e. the first
    /// margin call that would trigger as the market price falls.
    #[must_use]
    pub fn lowest_margin_call(&self, base_unit: u16) -> Option<MarginCall> {
        self.margin_calls
            .range((base_unit, 0, OutputRef::new(chain_primitives::SmallHash::zero(), 0))..)
            .take_while(|(k, _)| k.0 == base_unit)
            .map(|(_, v)| *v)
            .next()
    }

    /// Every pair with at least one resting order, for sweeping.
    #[must_use]
    pub fn active_pairs(&self) -> Vec<(u16, u16)> {
        let mut pairs: Vec<(u16, u16)> = self
            .bids
            .keys()
            .map(|k| (k.0, k.1))
            .chain(self.asks.keys().map(|k| (k.0, k.1)))
            .chain(self.shorts.keys().map(|k| (k.0, k.1)))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    pub fn record_price_point(&mut self, pair: (u16, u16), block_num: u64, trade_price: f64, volume: u64) {
        let history = self.price_history.entry(pair).or_default();
        if let Some(last) = history.last_mut().filter(|p| p.block_num == block_num) {
            last.high = last.high.max(trade_price);
            last.low = last.low.min(trade_price);
            last.close = trade_price;
            last.volume += volume;
        } else {
            history.push(PricePoint {
                block_num,
                open: trade_price,
                high: trade_price,
                low: trade_price,
                close: trade_price,
                volume,
            });
        }
    }

    #[must_use]
    pub fn price_history(&self, pair: (u16, u16)) -> &[PricePoint] {
        self.price_history
            .get(&pair)
            .map_or(&[][..], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_primitives::SmallHash;

    fn order(ratio: u128, output_idx: u32, quote: AssetType) -> MarketOrder {
        MarketOrder {
            output_ref: OutputRef::new(SmallHash::digest(&output_idx.to_le_bytes()), output_idx),
            pay_address: [0u8; 20],
            price: Price {
                ratio,
                base: AssetType::BTS,
                quote,
            },
            amount: Asset::bts(100),
        }
    }

    #[test]
    fn best_bid_is_highest_price() {
        let mut db = MarketDb::new();
        let usd = AssetType(1);
        db.insert_bid(order(1 << 64, 0, usd));
        db.insert_bid(order(3 << 64, 1, usd));
        db.insert_bid(order(2 << 64, 2, usd));

        let best = db.best_bid((usd.0, AssetType::BTS.0)).unwrap();
        assert_eq!(best.price.ratio, 3 << 64);
    }

    #[test]
    fn best_ask_is_lowest_price() {
        let mut db = MarketDb::new();
        let usd = AssetType(1);
        db.insert_ask(order(5 << 64, 0, usd));
        db.insert_ask(order(1 << 64, 1, usd));
        db.insert_ask(order(3 << 64, 2, usd));

        let best = db.best_ask((usd.0, AssetType::BTS.0)).unwrap();
        assert_eq!(best.price.ratio, 1 << 64);
    }

    #[test]
    fn removing_an_order_clears_it_from_best_lookup() {
        let mut db = MarketDb::new();
        let usd = AssetType(1);
        let o = order(1 << 64, 0, usd);
        db.insert_ask(o);
        db.remove_ask(&o);
        assert!(db.best_ask((usd.0, AssetType::BTS.0)).is_none());
    }

    #[test]
    fn depth_tracks_the_thinner_side_and_unwinds_on_removal() {
        let mut db = MarketDb::new();
        let usd = AssetType(1);
        let bid = order(1 << 64, 0, usd);
        let ask = order(1 << 64, 1, usd);
        db.insert_bid(bid);
        assert_eq!(db.get_depth(usd.0), 0, "no ask side yet");
        db.insert_ask(ask);
        assert_eq!(db.get_depth(usd.0), 100, "both sides back 100 BTS at parity");

        db.remove_ask(&ask);
        assert_eq!(db.get_depth(usd.0), 0);
        db.remove_bid(&bid);
        assert_eq!(db.get_depth(usd.0), 0);
    }

    #[test]
    fn price_points_accumulate_within_a_block() {
        let mut db = MarketDb::new();
        let pair = (1u16, 0u16);
        db.record_price_point(pair, 5, 2.0, 10);
        db.record_price_point(pair, 5, 2.5, 5);
        db.record_price_point(pair, 6, 1.0, 3);

        let history = db.price_history(pair);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].high, 2.5);
        assert_eq!(history[0].volume, 15);
    }
}
