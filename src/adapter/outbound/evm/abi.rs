//! Contract bindings for the oracle, the market factory and markets.

use alloy_sol_types::sol;

sol! {
    #[sol(rpc)]
    interface IOracle {
        function disputeWindow() external view returns (uint64);
        function pending(address market)
            external
            view
            returns (uint8 outcome, bytes32 dataHash, uint64 commitTime, bool committed, bool finalized);
        function commit(address market, uint8 outcome, bytes32 dataHash) external;
        function finalize(address market) external;
    }

    #[sol(rpc)]
    interface IMarket {
        function title() external view returns (string memory);
        function resolveTime() external view returns (uint64);
        function resolved() external view returns (bool);
    }

    interface IMarketFactory {
        /// `params` is UTF-8 JSON `MarketParams`.
        event MarketCreated(address indexed market, address indexed creator, string marketType, bytes params);
    }
}
