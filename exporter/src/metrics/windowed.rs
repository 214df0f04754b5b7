//! Gauges created on demand, one per block window.
//!
//! Hash-rate and fee-estimate series are parameterised by a configured
//! window, so they cannot be declared up front. [`WindowedGauges`] creates
//! and registers a gauge the first time a window is seen and hands out the
//! same gauge for that window from then on. Entries are never removed.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use prometheus::{Gauge, Opts, Registry};

use super::registry::NAMESPACE;

/// Lazily populated `window -> gauge` cache bound to a registry.
pub struct WindowedGauges {
    registry: Registry,
    name: fn(i64) -> String,
    help: fn(i64) -> String,
    gauges: RwLock<HashMap<i64, Gauge>>,
}

impl WindowedGauges {
    pub fn new(registry: Registry, name: fn(i64) -> String, help: fn(i64) -> String) -> Self {
        Self {
            registry,
            name,
            help,
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the gauge for `window`, creating and registering it on first
    /// use. Concurrent callers asking for the same window get the same gauge.
    pub fn get_or_create(&self, window: i64) -> Result<Gauge, prometheus::Error> {
        if let Some(gauge) = self
            .gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&window)
        {
            return Ok(gauge.clone());
        }

        let mut gauges = self.gauges.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race between the two locks.
        if let Some(gauge) = gauges.get(&window) {
            return Ok(gauge.clone());
        }

        let gauge = Gauge::with_opts(
            Opts::new((self.name)(window), (self.help)(window)).namespace(NAMESPACE),
        )?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(window, gauge.clone());
        Ok(gauge)
    }

    /// Gauge for `window` if it has been created.
    pub fn get(&self, window: i64) -> Option<Gauge> {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&window)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.gauges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name of the hash-rate series for `window` (without namespace).
///
/// Negative windows get `_neg{N}`, the node's default window of 120 blocks
/// gets the bare name, every other window gets `_{N}`.
pub fn hash_ps_name(window: i64) -> String {
    if window < 0 {
        format!("hash_ps_neg{}", window.unsigned_abs())
    } else if window == 120 {
        "hash_ps".to_string()
    } else {
        format!("hash_ps_{window}")
    }
}

pub fn hash_ps_help(window: i64) -> String {
    if window == -1 {
        "Estimated network hash rate per second since the last difficulty change".to_string()
    } else {
        format!("Estimated network hash rate per second for the last {window} blocks")
    }
}

/// Name of the fee-estimate series for `window` (without namespace).
pub fn smart_fee_name(window: i64) -> String {
    format!("estimate_smart_fee_{window}")
}

pub fn smart_fee_help(window: i64) -> String {
    format!("Estimated smart fee per kilobyte for confirmation in {window} blocks")
}
