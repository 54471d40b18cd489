//! AAVE V3 contract interfaces.
//!
//! Read-only subset of the Pool, PoolAddressesProvider, PriceOracle and
//! UiPoolDataProviderV3 ABIs. Every call here is a `view` call and may be
//! pinned to a historical block.

use alloy::sol;

// AAVE V3 Pool interface
sol! {
    /// Aave V3 Pool interface (account data only)
    #[sol(rpc)]
    interface IPool {
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralBase,
            uint256 totalDebtBase,
            uint256 availableBorrowsBase,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );
    }
}

// Oracle resolution goes through the addresses provider, so the oracle
// address itself is never cached.
sol! {
    /// Aave V3 PoolAddressesProvider (oracle lookup only)
    #[sol(rpc)]
    interface IPoolAddressesProvider {
        function getPriceOracle() external view returns (address);
    }

    /// Aave V3 price oracle, prices in 8-decimal USD
    #[sol(rpc)]
    interface IPriceOracle {
        function getAssetPrice(address asset) external view returns (uint256);
    }
}

// UiPoolDataProviderV3 aggregate reserve read. The struct layout must match the
// deployed contract exactly or the whole response fails to decode.
sol! {
    #[derive(Debug)]
    struct AggregatedReserveData {
        address underlyingAsset;
        string name;
        string symbol;
        uint256 decimals;
        uint256 baseLTVasCollateral;
        uint256 reserveLiquidationThreshold;
        uint256 reserveLiquidationBonus;
        uint256 reserveFactor;
        bool usageAsCollateralEnabled;
        bool borrowingEnabled;
        bool isActive;
        bool isFrozen;
        uint128 liquidityIndex;
        uint128 variableBorrowIndex;
        uint128 liquidityRate;
        uint128 variableBorrowRate;
        uint40 lastUpdateTimestamp;
        address aTokenAddress;
        address variableDebtTokenAddress;
        address interestRateStrategyAddress;
        uint256 availableLiquidity;
        uint256 totalScaledVariableDebt;
        uint256 priceInMarketReferenceCurrency;
        address priceOracle;
        uint256 variableRateSlope1;
        uint256 variableRateSlope2;
        uint256 baseVariableBorrowRate;
        uint256 optimalUsageRatio;
        bool isPaused;
        bool isSiloedBorrowing;
        uint128 accruedToTreasury;
        uint128 unbacked;
        uint128 isolationModeTotalDebt;
        bool flashLoanEnabled;
        uint256 debtCeiling;
        uint256 debtCeilingDecimals;
        uint256 borrowCap;
        uint256 supplyCap;
        bool borrowableInIsolation;
        bool virtualAccActive;
        uint128 virtualUnderlyingBalance;
    }

    #[derive(Debug)]
    struct BaseCurrencyInfo {
        uint256 marketReferenceCurrencyUnit;
        int256 marketReferenceCurrencyPriceInUsd;
        int256 networkBaseTokenPriceInUsd;
        uint8 networkBaseTokenPriceDecimals;
    }

    /// UiPoolDataProviderV3 interface
    #[sol(rpc)]
    interface IUiPoolDataProviderV3 {
        function getReservesData(address provider) external view returns (
            AggregatedReserveData[] memory,
            BaseCurrencyInfo memory
        );
    }
}
