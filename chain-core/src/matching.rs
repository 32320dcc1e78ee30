//! The continuous double-auction matching engine.
//!
//! Runs once per block, after user transactions, clearing every pair whose
//! best bid crosses its best ask (or best short). Each crossing produces one
//! synthetic transaction consuming the matched resting orders and paying out
//! (or re-resting) the result; the matcher updates the in-memory book
//! immediately so later pairs in the same sweep see a consistent view.

use tracing::{debug, info};

use crate::asset::{Asset, AssetType};
use crate::claim::ClaimData;
use crate::market::{MarginCall, MarketDb, MarketOrder};
use crate::price::Price;
use crate::transaction::{OutputRef, Transaction, TxInput, TxOutput};

/// Short positions are collateralised at this multiple of the trade value.
const SHORT_COLLATERAL_RATIO: u64 = 2;
/// A cover's liquidation call price sits at this fraction of the short's
/// opening price.
const CALL_PRICE_NUMERATOR: u64 = 3;
const CALL_PRICE_DENOMINATOR: u64 = 4;

/// Runs the matcher to exhaustion, returning every synthetic transaction
/// produced, in the order the block should append them.
pub fn match_orders(market: &mut MarketDb, block_num: u64) -> Vec<Transaction> {
    let mut produced = Vec::new();
    for pair in market.active_pairs() {
        loop {
            match clear_one(market, pair, block_num) {
                Some(trx) => produced.push(trx),
                None => break,
            }
        }
    }
    produced
}

fn clear_one(market: &mut MarketDb, pair: (u16, u16), block_num: u64) -> Option<Transaction> {
    let bid = market.best_bid(pair)?;
    let ask = market.best_ask(pair);
    let short = market.best_short(pair);

    let counter_is_ask = match (ask, short) {
        (Some(a), Some(s)) => a.price.ratio <= s.price.ratio,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => return None,
    };

    if counter_is_ask {
        let ask = ask?;
        if bid.price.checked_cmp(&ask.price).ok()? != std::cmp::Ordering::Less {
            Some(clear_bid_ask(market, bid, ask, pair, block_num))
        } else {
            None
        }
    } else {
        let short = short?;
        if bid.price.checked_cmp(&short.price).ok()? != std::cmp::Ordering::Less {
            Some(clear_bid_short(market, bid, short, pair, block_num))
        } else {
            None
        }
    }
}

fn clear_bid_ask(
    market: &mut MarketDb,
    bid: MarketOrder,
    ask: MarketOrder,
    pair: (u16, u16),
    block_num: u64,
) -> Transaction {
    market.remove_bid(&bid);
    market.remove_ask(&ask);

    // Maker priority: trade happens at the ask's price (the order that was
    // resting first on this side of the book).
    let trade_price = ask.price;
    let max_base_from_bid = trade_price.convert_quote_to_base(bid.amount.amount);
    let trade_base = max_base_from_bid.min(ask.amount.amount);
    let trade_quote = trade_price.convert_base_to_quote(trade_base);

    let mut outputs = vec![
        TxOutput {
            amount: Asset::new(trade_base, AssetType(pair.1)),
            claim: ClaimData::BySignature {
                address: bid.pay_address,
            },
        },
        TxOutput {
            amount: Asset::new(trade_quote, AssetType(pair.0)),
            claim: ClaimData::BySignature {
                address: ask.pay_address,
            },
        },
    ];

    let bid_residual_quote = bid
        .amount
        .amount
        .saturating_sub(trade_price.convert_base_to_quote(trade_base));
    if bid_residual_quote > 0 {
        outputs.push(TxOutput {
            amount: Asset::new(bid_residual_quote, AssetType(pair.0)),
            claim: ClaimData::ByBid {
                pay_address: bid.pay_address,
                price: bid.price,
            },
        });
    }

    let ask_residual_base = ask.amount.amount.saturating_sub(trade_base);
    if ask_residual_base > 0 {
        outputs.push(TxOutput {
            amount: Asset::new(ask_residual_base, AssetType(pair.1)),
            claim: ClaimData::ByBid {
                pay_address: ask.pay_address,
                price: ask.price,
            },
        });
    }

    let trx = build_market_transaction(vec![bid.output_ref, ask.output_ref], outputs);
    reinsert_residuals(
        market,
        &trx,
        pair,
        bid.pay_address,
        bid.price,
        bid_residual_quote,
        ask.pay_address,
        ask.price,
        ask_residual_base,
    );

    market.record_price_point(pair, block_num, trade_price.as_f64(), trade_base);
    info!(?pair, trade_base, trade_quote, "matched bid against ask");
    trx
}

fn clear_bid_short(
    market: &mut MarketDb,
    bid: MarketOrder,
    short: MarketOrder,
    pair: (u16, u16),
    block_num: u64,
) -> Transaction {
    market.remove_bid(&bid);
    market.remove_short(&short);

    let trade_price = short.price;
    let max_base_from_bid = trade_price.convert_quote_to_base(bid.amount.amount);
    let trade_base = max_base_from_bid.min(short.amount.amount);
    let trade_quote = trade_price.convert_base_to_quote(trade_base);
    let collateral_amount = short.amount.amount.saturating_mul(SHORT_COLLATERAL_RATIO);
    let call_price_ratio = (trade_price.ratio / u128::from(CALL_PRICE_DENOMINATOR))
        .saturating_mul(u128::from(CALL_PRICE_NUMERATOR));
    let call_price = Price {
        ratio: call_price_ratio,
        base: trade_price.base,
        quote: trade_price.quote,
    };

    let outputs = vec![
        TxOutput {
            amount: Asset::new(trade_base, AssetType(pair.1)),
            claim: ClaimData::BySignature {
                address: bid.pay_address,
            },
        },
        TxOutput {
            amount: Asset::new(collateral_amount, AssetType::BTS),
            claim: ClaimData::ByCover {
                owner: short.pay_address,
                payoff: Asset::new(trade_base, AssetType(pair.1)),
                collateral: Asset::new(collateral_amount, AssetType::BTS),
                call_price,
            },
        },
    ];

    let trx = build_market_transaction(vec![bid.output_ref, short.output_ref], outputs);
    let cover_ref = OutputRef::new(trx.id(), 1);
    market.insert_margin_call(MarginCall {
        output_ref: cover_ref,
        owner: short.pay_address,
        call_price,
        payoff: Asset::new(trade_base, AssetType(pair.1)),
        collateral: Asset::new(collateral_amount, AssetType::BTS),
    });

    let bid_residual_quote = bid
        .amount
        .amount
        .saturating_sub(trade_price.convert_base_to_quote(trade_base));
    if bid_residual_quote > 0 {
        market.insert_bid(MarketOrder {
            output_ref: OutputRef::new(trx.id(), 2),
            pay_address: bid.pay_address,
            price: bid.price,
            amount: Asset::new(bid_residual_quote, AssetType(pair.0)),
        });
    }

    market.record_price_point(pair, block_num, trade_price.as_f64(), trade_base);
    debug!(?pair, trade_base, "matched bid against short, opened cover");
    trx
}

#[allow(clippy::too_many_arguments)]
fn reinsert_residuals(
    market: &mut MarketDb,
    trx: &Transaction,
    pair: (u16, u16),
    bid_address: [u8; 20],
    bid_price: Price,
    bid_residual_quote: u64,
    ask_address: [u8; 20],
    ask_price: Price,
    ask_residual_base: u64,
) {
    let mut next_idx = 2u32;
    if bid_residual_quote > 0 {
        market.insert_bid(MarketOrder {
            output_ref: OutputRef::new(trx.id(), next_idx),
            pay_address: bid_address,
            price: bid_price,
            amount: Asset::new(bid_residual_quote, AssetType(pair.0)),
        });
        next_idx += 1;
    }
    if ask_residual_base > 0 {
        market.insert_ask(MarketOrder {
            output_ref: OutputRef::new(trx.id(), next_idx),
            pay_address: ask_address,
            price: ask_price,
            amount: Asset::new(ask_residual_base, AssetType(pair.1)),
        });
    }
}

fn build_market_transaction(inputs: Vec<OutputRef>, outputs: Vec<TxOutput>) -> Transaction {
    Transaction::new(
        1,
        0,
        0,
        0,
        inputs
            .into_iter()
            .map(|output_ref| TxInput { output_ref })
            .collect(),
        outputs,
    )
}

/// Sweeps outstanding margin calls against the current best bid for their
/// base asset, force-liquidating any cover whose call price has been
/// reached.
pub fn sweep_margin_calls(market: &mut MarketDb, base_unit: u16, block_num: u64) -> Vec<Transaction> {
    let mut produced = Vec::new();
    loop {
        let Some(call) = market.lowest_margin_call(base_unit) else {
            break;
        };
        let Some(bid) = market.best_bid((call.call_price.quote.0, base_unit)) else {
            break;
        };
        if bid.price.checked_cmp(&call.call_price).ok() == Some(std::cmp::Ordering::Less) {
            break;
        }

        market.remove_margin_call(&call);
        market.remove_bid(&bid);

        let trade_base = call.payoff.amount.min(bid.price.convert_quote_to_base(bid.amount.amount));
        let outputs = vec![
            TxOutput {
                amount: Asset::new(trade_base, AssetType(base_unit)),
                claim: ClaimData::BySignature {
                    address: bid.pay_address,
                },
            },
            TxOutput {
                amount: call.collateral,
                claim: ClaimData::BySignature {
                    address: call.owner,
                },
            },
        ];
        let trx = build_market_transaction(vec![call.output_ref, bid.output_ref], outputs);
        market.record_price_point(
            (call.call_price.quote.0, base_unit),
            block_num,
            call.call_price.as_f64(),
            trade_base,
        );
        produced.push(trx);
    }
    produced
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_primitives::SmallHash;

    fn resting_order(idx: u32, ratio: u128, amount: u64, asset_type: AssetType) -> MarketOrder {
        MarketOrder {
            output_ref: OutputRef::new(SmallHash::digest(&idx.to_le_bytes()), idx),
            pay_address: [idx as u8; 20],
            price: Price {
                ratio,
                base: AssetType::BTS,
                quote: AssetType(1),
            },
            amount: Asset::new(amount, asset_type),
        }
    }

    #[test]
    fn crossing_bid_and_ask_produce_a_trade() {
        let mut market = MarketDb::new();
        // Bid: willing to pay up to 2.0 USD per BTS, backed by 100 USD.
        market.insert_bid(resting_order(0, 2u128 << 64, 100, AssetType(1)));
        // Ask: offering 40 BTS at 1.0 USD per BTS.
        market.insert_ask(resting_order(1, 1u128 << 64, 40, AssetType::BTS));

        let produced = match_orders(&mut market, 1);
        assert_eq!(produced.len(), 1);
        assert!(produced[0].outputs.len() >= 2);

        // The ask fully cleared at its own (maker) price.
        assert!(market.best_ask((1, 0)).is_none());
        // The bid had excess buying power, so a residual bid should remain.
        assert!(market.best_bid((1, 0)).is_some());
    }

    #[test]
    fn non_crossing_book_produces_nothing() {
        let mut market = MarketDb::new();
        market.insert_bid(resting_order(0, 1u128 << 64, 10, AssetType(1)));
        market.insert_ask(resting_order(1, 2u128 << 64, 10, AssetType::BTS));

        let produced = match_orders(&mut market, 1);
        assert!(produced.is_empty());
    }
}
