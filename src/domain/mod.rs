//! Domain Layer - Core detection, scoring and position logic
//!
//! Pure types and logic. Everything that touches the network goes through
//! the ports layer.
//!
//! ## Detection
//! - `log_classifier`: Pool-creation detection from transaction logs
//! - `layouts`: Fixed-offset account decoders (AMM, market, CP-Swap, mint)
//! - `extraction`: Ordered fallback strategies producing `PoolInfo`
//! - `known_programs`: Program ids and the address-scan denylist
//!
//! ## Decision
//! - `signal_aggregator`: Multi-provider market data with confidence
//! - `risk_scorer`: Composite 0-100 token risk score
//! - `rate_limit`: Hourly trade window and per-token cooldowns
//! - `trade_gate`: Ordered buy approval and planning
//! - `swap`: Raydium swap instruction builders
//!
//! ## Positions
//! - `triggers`: Exit rules and the per-token position lifecycle

pub mod extraction;
pub mod known_programs;
pub mod layouts;
pub mod log_classifier;
pub mod pool;
pub mod rate_limit;
pub mod risk_scorer;
pub mod signal_aggregator;
pub mod swap;
pub mod trade_gate;
pub mod triggers;

pub use extraction::{ExtractionContext, ExtractionStrategy, PoolExtractor};
pub use known_programs::{RAYDIUM_AMM_V4, RAYDIUM_CP_SWAP, WSOL_MINT};
pub use layouts::{AccountLayoutDecoder, DecodeError, MintInfo};
pub use log_classifier::{Classification, LogClassifier};
pub use pool::{ExtractionSource, PoolInfo, PoolVariant, SwapPoolKeys};
pub use rate_limit::{RateLimitError, RateLimitState};
pub use risk_scorer::{
    CheckOutcome, RiskAssessment, RiskCheck, RiskCheckKind, RiskScorer, RiskScorerConfig,
    TokenPolicy,
};
pub use signal_aggregator::{
    SignalAggregator, SignalAggregatorConfig, SourceReading, ValidatedSignal, ValidationMethod,
};
pub use swap::{PriorityFee, SwapBuildError, SwapDirection, SwapRequest};
pub use trade_gate::{BuyPlan, GateCheck, GateDecision, GateError, Rejection, TradeGate, TradeGateConfig};
pub use triggers::{
    ExitRule, ExitSignal, Position, PositionState, PositionTriggerEngine, TriggerConfig,
    TriggerError, TriggerSettings,
};
