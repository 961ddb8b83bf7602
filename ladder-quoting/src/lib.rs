//! Ladder Quoting - the decision pipeline behind the engine's `Quoter`
//! trait.
//!
//! Five cooperating estimators feed the layered planner:
//! - `volatility`: rolling and EWMA realized-vol estimators
//! - `toxicity`: order-flow toxicity score and defense adjustments
//! - `depth`: adaptive L0/L1 slot allocation
//! - `spread`: EV-gated dynamic spread per side
//! - `inventory`: proactive inventory-aware size multipliers
//! - `planner`: assembles everything into a post-only ladder

pub mod depth;
pub mod inventory;
pub mod planner;
pub mod spread;
pub mod toxicity;
pub mod volatility;

pub use depth::{AdaptiveDepth, DepthAllocation};
pub use inventory::{ConvergenceReport, InventoryAllocator, SizeMultipliers};
pub use planner::LayeredQuoter;
pub use spread::SpreadOptimizer;
pub use toxicity::{ToxicityAnalysis, ToxicityFilter};
pub use volatility::{EwmaVolatility, RollingVolatility};
