// In crates/signal-store/src/keys.rs

//! Store keys. They match the keys the execution front-end has always used,
//! so an exported browser store can be dropped in as-is.

pub const LAST_SIGNAL: &str = "last_tv_signal";
pub const ATR: &str = "atr.value";

pub const LEVERAGE: &str = "atr.lev";
pub const MAINTENANCE_MARGIN_RATE: &str = "atr.mmr";
pub const LIQUIDATION_BUFFER_ATR: &str = "atr.liqBufATR";
pub const MAX_NOTIONAL: &str = "atr.maxNotional";
pub const ALLOW_UNSAFE: &str = "atr.allowUnsafe";
pub const RISK_PERCENT: &str = "atr.riskPct";
pub const TAKE_PROFIT_MULTIPLE: &str = "atr.tpMult";
pub const STOP_LOSS_MULTIPLE: &str = "atr.slMult";
pub const ENTRY_OFFSET_RATIO: &str = "atr.marginMult";
pub const REJECT_CROSSED: &str = "atr.rejectCrossed";
