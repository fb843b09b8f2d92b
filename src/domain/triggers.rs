//! Position Trigger Engine
//!
//! Owns open positions and their exit triggers. Per token the lifecycle is
//! `Open -> Closing -> Closed`, falling back to `Open` when a sell fails.
//!
//! Each price tick first raises the highest observed price, then walks the
//! exit rules in the configured order. The first rule that fires disables
//! the trigger and moves the position to `Closing`, so a position never has
//! two sells in flight.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    #[error("Position already open for {0}")]
    PositionAlreadyOpen(Pubkey),

    #[error("No position for {0}")]
    PositionNotFound(Pubkey),

    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(Decimal),

    #[error("Invalid token amount: {0}")]
    InvalidAmount(u64),

    #[error("Position {0} is not closing")]
    NotClosing(Pubkey),

    #[error("Unknown exit rule: {0}")]
    UnknownRule(String),
}

/// One exit condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitRule {
    TrailingStop,
    MaxHold,
    TakeProfit,
    StopLoss,
}

impl ExitRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitRule::TrailingStop => "trailing_stop",
            ExitRule::MaxHold => "max_hold",
            ExitRule::TakeProfit => "take_profit",
            ExitRule::StopLoss => "stop_loss",
        }
    }
}

impl FromStr for ExitRule {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trailing_stop" | "trailing" => Ok(ExitRule::TrailingStop),
            "max_hold" | "max_hold_time" => Ok(ExitRule::MaxHold),
            "take_profit" | "tp" => Ok(ExitRule::TakeProfit),
            "stop_loss" | "sl" => Ok(ExitRule::StopLoss),
            other => Err(TriggerError::UnknownRule(other.to_string())),
        }
    }
}

pub const DEFAULT_EXIT_ORDER: [ExitRule; 4] = [
    ExitRule::TrailingStop,
    ExitRule::MaxHold,
    ExitRule::TakeProfit,
    ExitRule::StopLoss,
];

/// Exit thresholds for one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    /// `None` disables the trailing stop
    pub trailing_stop_pct: Option<Decimal>,
    /// Zero disables the hold limit
    pub max_hold_secs: u64,
    /// False while a sell is in flight
    pub enabled: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: dec!(30),
            stop_loss_pct: dec!(15),
            trailing_stop_pct: Some(dec!(10)),
            max_hold_secs: 4 * 3_600,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub token_mint: Pubkey,
    pub pool_address: Pubkey,
    pub entry_price: Decimal,
    pub token_amount: u64,
    /// Unix seconds
    pub entry_time: u64,
    /// Never decreases
    pub highest_price: Decimal,
    pub last_price: Decimal,
    pub state: PositionState,
    pub trigger: TriggerConfig,
}

impl Position {
    pub fn pnl_pct(&self, price: Decimal) -> Decimal {
        pnl_pct(self.entry_price, price)
    }

    pub fn held_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.entry_time)
    }

    fn observe(&mut self, price: Decimal) {
        self.last_price = price;
        if price > self.highest_price {
            self.highest_price = price;
        }
    }
}

/// A fired exit rule
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub token_mint: Pubkey,
    pub rule: ExitRule,
    pub price: Decimal,
    pub pnl_pct: Decimal,
    pub reason: String,
}

pub fn pnl_pct(entry: Decimal, price: Decimal) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    (price - entry) / entry * dec!(100)
}

/// First rule in `order` that fires for `position` at `price`
pub fn evaluate_rules(position: &Position, price: Decimal, now: u64, order: &[ExitRule]) -> Option<ExitSignal> {
    let trigger = &position.trigger;
    let pnl = position.pnl_pct(price);

    order.iter().find_map(|rule| {
        let reason = match rule {
            ExitRule::TrailingStop => {
                let pct = trigger.trailing_stop_pct?;
                let stop = position.highest_price * (Decimal::ONE - pct / dec!(100));
                (price <= stop).then(|| {
                    format!(
                        "trailing stop: {} <= {} ({}% below high {})",
                        price, stop, pct, position.highest_price
                    )
                })
            }
            ExitRule::MaxHold => {
                let held = position.held_secs(now);
                (trigger.max_hold_secs > 0 && held >= trigger.max_hold_secs)
                    .then(|| format!("max hold: held {}s >= {}s", held, trigger.max_hold_secs))
            }
            ExitRule::TakeProfit => (pnl >= trigger.take_profit_pct)
                .then(|| format!("take profit: {:.2}% >= {}%", pnl, trigger.take_profit_pct)),
            ExitRule::StopLoss => (pnl <= -trigger.stop_loss_pct)
                .then(|| format!("stop loss: {:.2}% <= -{}%", pnl, trigger.stop_loss_pct)),
        }?;

        Some(ExitSignal {
            token_mint: position.token_mint,
            rule: *rule,
            price,
            pnl_pct: pnl,
            reason,
        })
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSettings {
    pub template: TriggerConfig,
    pub exit_order: Vec<ExitRule>,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            template: TriggerConfig::default(),
            exit_order: DEFAULT_EXIT_ORDER.to_vec(),
        }
    }
}

/// Open positions keyed by token mint
#[derive(Debug, Default)]
pub struct PositionTriggerEngine {
    positions: HashMap<Pubkey, Position>,
    settings: TriggerSettings,
}

impl PositionTriggerEngine {
    pub fn new(settings: TriggerSettings) -> Self {
        Self {
            positions: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.settings
    }

    /// Register a confirmed buy. At most one position per mint.
    pub fn open(
        &mut self,
        token_mint: Pubkey,
        pool_address: Pubkey,
        entry_price: Decimal,
        token_amount: u64,
        now: u64,
    ) -> Result<&Position, TriggerError> {
        if self.positions.contains_key(&token_mint) {
            return Err(TriggerError::PositionAlreadyOpen(token_mint));
        }
        if entry_price <= Decimal::ZERO {
            return Err(TriggerError::InvalidEntryPrice(entry_price));
        }
        if token_amount == 0 {
            return Err(TriggerError::InvalidAmount(token_amount));
        }

        let position = Position {
            token_mint,
            pool_address,
            entry_price,
            token_amount,
            entry_time: now,
            highest_price: entry_price,
            last_price: entry_price,
            state: PositionState::Open,
            trigger: TriggerConfig {
                enabled: true,
                ..self.settings.template.clone()
            },
        };
        tracing::info!(
            "Position opened: {} @ {} ({} tokens)",
            token_mint,
            entry_price,
            token_amount
        );
        Ok(self.positions.entry(token_mint).or_insert(position))
    }

    /// Record a price tick. Returns the exit to execute, if one fired.
    pub fn on_price(
        &mut self,
        token_mint: &Pubkey,
        price: Decimal,
        now: u64,
    ) -> Result<Option<ExitSignal>, TriggerError> {
        let position = self
            .positions
            .get_mut(token_mint)
            .ok_or(TriggerError::PositionNotFound(*token_mint))?;
        position.observe(price);

        if position.state != PositionState::Open || !position.trigger.enabled {
            return Ok(None);
        }

        let signal = evaluate_rules(position, price, now, &self.settings.exit_order);
        if let Some(s) = &signal {
            position.trigger.enabled = false;
            position.state = PositionState::Closing;
            tracing::info!("Exit triggered for {}: {}", token_mint, s.reason);
        }
        Ok(signal)
    }

    /// Move to `Closing` without a rule firing (manual exit)
    pub fn begin_close(&mut self, token_mint: &Pubkey) -> Result<(), TriggerError> {
        let position = self
            .positions
            .get_mut(token_mint)
            .ok_or(TriggerError::PositionNotFound(*token_mint))?;
        if position.state != PositionState::Open {
            return Err(TriggerError::NotClosing(*token_mint));
        }
        position.trigger.enabled = false;
        position.state = PositionState::Closing;
        Ok(())
    }

    /// Sell confirmed: the position and its trigger are removed together
    pub fn confirm_close(&mut self, token_mint: &Pubkey) -> Result<Position, TriggerError> {
        match self.positions.get(token_mint).map(|p| p.state) {
            None => Err(TriggerError::PositionNotFound(*token_mint)),
            Some(PositionState::Closing) => {
                let mut position = self
                    .positions
                    .remove(token_mint)
                    .ok_or(TriggerError::PositionNotFound(*token_mint))?;
                position.state = PositionState::Closed;
                tracing::info!("Position closed: {}", token_mint);
                Ok(position)
            }
            Some(_) => Err(TriggerError::NotClosing(*token_mint)),
        }
    }

    /// Sell failed: re-arm the trigger for the next tick
    pub fn abort_close(&mut self, token_mint: &Pubkey) -> Result<(), TriggerError> {
        let position = self
            .positions
            .get_mut(token_mint)
            .ok_or(TriggerError::PositionNotFound(*token_mint))?;
        if position.state != PositionState::Closing {
            return Err(TriggerError::NotClosing(*token_mint));
        }
        position.trigger.enabled = true;
        position.state = PositionState::Open;
        tracing::warn!("Sell failed for {}, trigger re-armed", token_mint);
        Ok(())
    }

    pub fn get(&self, token_mint: &Pubkey) -> Option<&Position> {
        self.positions.get(token_mint)
    }

    pub fn contains(&self, token_mint: &Pubkey) -> bool {
        self.positions.contains_key(token_mint)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    fn engine(template: TriggerConfig) -> (PositionTriggerEngine, Pubkey) {
        let mut engine = PositionTriggerEngine::new(TriggerSettings {
            template,
            ..TriggerSettings::default()
        });
        let mint = Pubkey::new_unique();
        engine.open(mint, Pubkey::new_unique(), dec!(1.0), 1_000, T0).unwrap();
        (engine, mint)
    }

    fn no_trailing() -> TriggerConfig {
        TriggerConfig {
            trailing_stop_pct: None,
            ..TriggerConfig::default()
        }
    }

    #[test]
    fn test_take_profit_at_130() {
        let (mut engine, mint) = engine(no_trailing());
        assert!(engine.on_price(&mint, dec!(1.29), T0 + 1).unwrap().is_none());

        let signal = engine.on_price(&mint, dec!(1.30), T0 + 2).unwrap().unwrap();
        assert_eq!(signal.rule, ExitRule::TakeProfit);
        assert_eq!(signal.pnl_pct, dec!(30));
        assert_eq!(engine.get(&mint).unwrap().state, PositionState::Closing);
    }

    #[test]
    fn test_stop_loss_at_085() {
        let (mut engine, mint) = engine(no_trailing());
        assert!(engine.on_price(&mint, dec!(0.86), T0 + 1).unwrap().is_none());

        let signal = engine.on_price(&mint, dec!(0.85), T0 + 2).unwrap().unwrap();
        assert_eq!(signal.rule, ExitRule::StopLoss);
    }

    #[test]
    fn test_trailing_stop_from_high() {
        let (mut engine, mint) = engine(TriggerConfig {
            take_profit_pct: dec!(100),
            ..TriggerConfig::default()
        });

        assert!(engine.on_price(&mint, dec!(1.5), T0 + 1).unwrap().is_none());
        assert!(engine.on_price(&mint, dec!(1.36), T0 + 2).unwrap().is_none());
        assert_eq!(engine.get(&mint).unwrap().highest_price, dec!(1.5));

        let signal = engine.on_price(&mint, dec!(1.35), T0 + 3).unwrap().unwrap();
        assert_eq!(signal.rule, ExitRule::TrailingStop);
    }

    #[test]
    fn test_trailing_takes_priority_over_take_profit() {
        let (mut engine, mint) = engine(TriggerConfig::default());
        engine.positions.get_mut(&mint).unwrap().highest_price = dec!(1.5);

        // 1.35 is both a trailing stop hit and a 35% gain
        let signal = engine.on_price(&mint, dec!(1.35), T0 + 1).unwrap().unwrap();
        assert_eq!(signal.rule, ExitRule::TrailingStop);
    }

    #[test]
    fn test_configurable_order() {
        let mut engine = PositionTriggerEngine::new(TriggerSettings {
            template: TriggerConfig::default(),
            exit_order: vec![ExitRule::TakeProfit, ExitRule::TrailingStop],
        });
        let mint = Pubkey::new_unique();
        engine.open(mint, Pubkey::new_unique(), dec!(1.0), 1, T0).unwrap();
        engine.positions.get_mut(&mint).unwrap().highest_price = dec!(1.5);

        let signal = engine.on_price(&mint, dec!(1.35), T0 + 1).unwrap().unwrap();
        assert_eq!(signal.rule, ExitRule::TakeProfit);
    }

    #[test]
    fn test_max_hold() {
        let (mut engine, mint) = engine(no_trailing());
        assert!(engine.on_price(&mint, dec!(1.0), T0 + 4 * 3_600 - 1).unwrap().is_none());
        let signal = engine.on_price(&mint, dec!(1.0), T0 + 4 * 3_600).unwrap().unwrap();
        assert_eq!(signal.rule, ExitRule::MaxHold);
    }

    #[test]
    fn test_highest_is_monotonic() {
        let (mut engine, mint) = engine(TriggerConfig {
            take_profit_pct: dec!(1000),
            trailing_stop_pct: Some(dec!(90)),
            ..TriggerConfig::default()
        });
        for p in [dec!(1.1), dec!(1.4), dec!(1.2), dec!(1.3)] {
            engine.on_price(&mint, p, T0 + 1).unwrap();
        }
        let pos = engine.get(&mint).unwrap();
        assert_eq!(pos.highest_price, dec!(1.4));
        assert_eq!(pos.last_price, dec!(1.3));
    }

    #[test]
    fn test_single_sell_in_flight_and_rearm() {
        let (mut engine, mint) = engine(no_trailing());
        assert!(engine.on_price(&mint, dec!(2.0), T0 + 1).unwrap().is_some());
        assert!(!engine.get(&mint).unwrap().trigger.enabled);
        // Still above target, but the trigger is disabled while closing
        assert!(engine.on_price(&mint, dec!(2.1), T0 + 2).unwrap().is_none());

        engine.abort_close(&mint).unwrap();
        assert_eq!(engine.get(&mint).unwrap().state, PositionState::Open);
        assert!(engine.on_price(&mint, dec!(2.1), T0 + 3).unwrap().is_some());

        let closed = engine.confirm_close(&mint).unwrap();
        assert_eq!(closed.state, PositionState::Closed);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let (mut engine, mint) = engine(TriggerConfig::default());
        let err = engine
            .open(mint, Pubkey::new_unique(), dec!(2.0), 5, T0)
            .unwrap_err();
        assert_eq!(err, TriggerError::PositionAlreadyOpen(mint));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get(&mint).unwrap().entry_price, dec!(1.0));
    }

    #[test]
    fn test_confirm_requires_closing() {
        let (mut engine, mint) = engine(TriggerConfig::default());
        assert_eq!(engine.confirm_close(&mint), Err(TriggerError::NotClosing(mint)));
        engine.begin_close(&mint).unwrap();
        assert!(engine.confirm_close(&mint).is_ok());
        assert!(matches!(
            engine.on_price(&mint, dec!(1), T0),
            Err(TriggerError::PositionNotFound(_))
        ));
    }

    #[test]
    fn test_parse_rules() {
        assert_eq!("trailing_stop".parse::<ExitRule>(), Ok(ExitRule::TrailingStop));
        assert_eq!("TP".parse::<ExitRule>(), Ok(ExitRule::TakeProfit));
        assert!("moon".parse::<ExitRule>().is_err());
    }
}
