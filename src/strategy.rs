//! Buy/sell alternation rule.

use ethers::types::U256;

use crate::models::SwapDirection;

/// Pick the direction of the next swap.
///
/// Alternates after each completed swap, except that an empty token balance
/// always forces a buy since there is nothing to sell.
pub fn decide(last_completed: SwapDirection, token_balance: U256) -> SwapDirection {
    if last_completed == SwapDirection::Sell || token_balance.is_zero() {
        SwapDirection::Buy
    } else {
        SwapDirection::Sell
    }
}
