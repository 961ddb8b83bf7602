//! Rate and risk control plane: pre-trade quantization, token-bucket
//! admission, the budget governor and allocator, and the venue weight fuse.

pub mod budget_allocator;
pub mod budget_governor;
pub mod quantize;
pub mod rate_limiter;
pub mod weight_monitor;

pub use budget_allocator::{Allocation, BudgetAllocator};
pub use budget_governor::{BudgetGovernor, GovernorInputs, MsgCounts};
pub use quantize::{
    min_qty_for_notional, pretrade_sanitize, quantize_price, quantize_qty, FilterReject,
    GuardContext, MakerGuard, Sanitized,
};
pub use rate_limiter::{RateGate, TokenBucket};
pub use weight_monitor::WeightMonitor;
