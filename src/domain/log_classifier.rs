//! Log Classifier
//!
//! Decides whether a transaction's log lines describe a new Raydium pool.
//!
//! A transaction counts as pool creation only when all four hold:
//! 1. a target program was invoked
//! 2. a `ray_log:` entry is present
//! 3. that entry decodes to log type 0 (initialize)
//! 4. the same program reports success
//!
//! Swaps and deposits also invoke the program and emit `ray_log`, and a
//! reverted initialize still logs the invoke, so no subset is sufficient.

use base64::{engine::general_purpose::STANDARD, Engine};
use solana_sdk::pubkey::Pubkey;

use super::known_programs::{variant_for_program, RAYDIUM_AMM_V4, RAYDIUM_CP_SWAP};
use super::pool::PoolVariant;

/// Marker preceding the base64 payload of the native event log
pub const RAY_LOG_MARKER: &str = "ray_log:";

/// `ray_log` type byte for pool initialization
pub const RAY_LOG_INIT_TYPE: u8 = 0;

/// Shortest payload that can carry an init record
pub const RAY_LOG_MIN_INIT_LEN: usize = 100;

/// Result of classifying one transaction's logs
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub is_pool_creation: bool,
    pub variant: PoolVariant,
    /// Decoded init payload, kept for the extraction chain
    pub init_log: Option<Vec<u8>>,
}

impl Classification {
    pub fn negative() -> Self {
        Self {
            is_pool_creation: false,
            variant: PoolVariant::Unknown,
            init_log: None,
        }
    }
}

/// Pure log classifier over a fixed set of target programs
#[derive(Debug, Clone)]
pub struct LogClassifier {
    /// Checked in order; the first invoked program wins
    programs: Vec<(Pubkey, String, String)>,
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new(&[RAYDIUM_CP_SWAP, RAYDIUM_AMM_V4])
    }
}

impl LogClassifier {
    pub fn new(program_ids: &[Pubkey]) -> Self {
        let programs = program_ids
            .iter()
            .map(|id| {
                (
                    *id,
                    format!("Program {} invoke", id),
                    format!("Program {} success", id),
                )
            })
            .collect();
        Self { programs }
    }

    pub fn program_ids(&self) -> Vec<Pubkey> {
        self.programs.iter().map(|(id, _, _)| *id).collect()
    }

    /// Classify one transaction's log lines
    pub fn classify(&self, logs: &[String]) -> Classification {
        let Some((program, _, success)) = self
            .programs
            .iter()
            .find(|(_, invoke, _)| logs.iter().any(|l| l.contains(invoke.as_str())))
        else {
            return Classification::negative();
        };

        let Some(init_log) = find_init_log(logs) else {
            return Classification::negative();
        };

        if !logs.iter().any(|l| l.contains(success.as_str())) {
            tracing::debug!("Initialize for {} did not report success", program);
            return Classification::negative();
        }

        Classification {
            is_pool_creation: true,
            variant: variant_for_program(program),
            init_log: Some(init_log),
        }
    }
}

/// First `ray_log` entry whose payload is an init record
fn find_init_log(logs: &[String]) -> Option<Vec<u8>> {
    logs.iter()
        .filter_map(|line| decode_ray_log(line))
        .find(|data| is_init_payload(data))
}

/// Decode the base64 payload of a `ray_log:` line
pub fn decode_ray_log(line: &str) -> Option<Vec<u8>> {
    let (_, payload) = line.split_once(RAY_LOG_MARKER)?;
    STANDARD.decode(payload.trim()).ok()
}

pub fn is_init_payload(data: &[u8]) -> bool {
    data.len() >= RAY_LOG_MIN_INIT_LEN && data[0] == RAY_LOG_INIT_TYPE
}
