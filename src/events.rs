use crate::config::ConfigError;
use crate::rpc::TransactionView;
use alloy_primitives::U256;
use alloy_primitives::utils::{format_units, parse_units};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("IN"),
            Direction::Out => f.write_str("OUT"),
        }
    }
}

/// Converts a minor-unit amount into major units, e.g. wei into whole coins.
///
/// Lossy; only for display. Thresholds are compared in minor units.
pub fn to_major_units(value: U256, decimals: u8) -> f64 {
    format_units(value, decimals)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::INFINITY)
}

/// Smallest minor-unit amount that is at least `amount` major units.
pub fn to_minor_units_ceil(amount: f64, decimals: u8) -> Result<U256, ConfigError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "amount must be a non-negative number, got {amount}"
        )));
    }

    // Shortest round-trip text, never exponent notation
    let text = amount.to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let kept = fraction.len().min(decimals as usize);
    let remainder = fraction[kept..].bytes().any(|b| b != b'0');

    let exact = if kept == 0 {
        whole.to_string()
    } else {
        format!("{whole}.{}", &fraction[..kept])
    };
    let minor = parse_units(&exact, decimals)
        .map_err(|e| ConfigError::Invalid(format!("amount {amount} not representable: {e}")))?
        .get_absolute();

    Ok(if remainder { minor + U256::from(1) } else { minor })
}

/// Which transfers are worth an alert.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub notify_incoming: bool,
    pub notify_outgoing: bool,
    min_amount: f64,
    min_minor: U256,
    decimals: u8,
    symbol: String,
}

impl AlertPolicy {
    /// Both directions enabled; `min_amount` is in major units.
    pub fn new(min_amount: f64, decimals: u8, symbol: &str) -> Result<Self, ConfigError> {
        Ok(AlertPolicy {
            notify_incoming: true,
            notify_outgoing: true,
            min_amount,
            min_minor: to_minor_units_ceil(min_amount, decimals)?,
            decimals,
            symbol: symbol.to_string(),
        })
    }

    pub fn min_amount(&self) -> f64 {
        self.min_amount
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Incoming is checked first; a transfer between two watched addresses is
    /// reported once, as `IN`.
    pub fn evaluate(
        &self,
        block_number: u64,
        tx: &TransactionView,
        watched: &HashSet<String>,
    ) -> Option<TransferAlert> {
        if tx.value < self.min_minor {
            return None;
        }

        let hit_in = self.notify_incoming
            && tx.to.as_ref().is_some_and(|to| watched.contains(to));
        let hit_out = self.notify_outgoing && watched.contains(&tx.from);

        let direction = if hit_in {
            Direction::In
        } else if hit_out {
            Direction::Out
        } else {
            return None;
        };

        Some(TransferAlert {
            direction,
            block_number,
            from: tx.from.clone(),
            to: tx.to.clone(),
            amount: to_major_units(tx.value, self.decimals),
            threshold: self.min_amount,
            symbol: self.symbol.clone(),
            tx_hash: tx.hash.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferAlert {
    pub direction: Direction,
    pub block_number: u64,
    pub from: String,
    pub to: Option<String>,
    pub amount: f64,
    pub threshold: f64,
    pub symbol: String,
    pub tx_hash: String,
}

impl fmt::Display for TransferAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "💸 Wallet Tx Alert ({})", self.direction)?;
        writeln!(f, "Block: {}", self.block_number)?;
        writeln!(f, "From: {}", self.from)?;
        writeln!(f, "To: {}", self.to.as_deref().unwrap_or("(contract creation)"))?;
        writeln!(
            f,
            "Value: {:.6} {} (>= {})",
            self.amount, self.symbol, self.threshold
        )?;
        write!(f, "Tx: {}", self.tx_hash)
    }
}
