/// Contract interfaces using the Alloy sol! macro
/// These cover the three contracts the ledger reads: the pool's Trade log,
/// the ERC-20 tokens it swaps, and the per-asset USD price feeds.

use alloy::sol;

sol! {
    /// Two-asset pool. Every swap emits one Trade log.
    #[sol(rpc)]
    interface ITradingPool {
        event Trade(
            address indexed trader,
            address indexed origin,
            address indexed target,
            uint256 originAmount,
            uint256 targetAmount
        );
    }

    /// ERC-20 token. Transfer logs carry the protocol fee leg.
    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function decimals() external view returns (uint8);
    }

    /// Aggregator-style USD price feed, read at historical blocks.
    #[sol(rpc)]
    interface IPriceFeed {
        function latestAnswer() external view returns (int256);

        function decimals() external view returns (uint8);
    }
}
