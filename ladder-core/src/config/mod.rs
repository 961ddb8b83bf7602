//! Runtime configuration: typed settings structs plus named profiles.

pub mod profiles;
pub mod types;

pub use profiles::{aggressive, conservative, default_profile};
pub use types::{
    EngineConfig, ExecutorConfig, GovernorConfig, InventoryConfig, LayersConfig, LedgerConfig,
    MarketDataConfig, SpreadConfig, ToxicityConfig,
};
