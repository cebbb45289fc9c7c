use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::model::PortsConfig;

use super::error::InstanceError;

/// A (backend, frontend) port tuple reserved for exactly one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortPair {
    pub backend: u16,
    pub frontend: u16,
}

/// The two disjoint ranges instance ports are drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRange {
    pub backend_start: u16,
    pub frontend_start: u16,
    pub max_instances: u16,
}

impl PortRange {
    pub fn from_config(cfg: &PortsConfig) -> Self {
        Self {
            backend_start: cfg.backend_start,
            frontend_start: cfg.frontend_start,
            max_instances: cfg.max_instances,
        }
    }

    /// Candidate pair at `index`, or `None` if it would overflow `u16`.
    fn candidate(&self, index: u16) -> Option<PortPair> {
        Some(PortPair {
            backend: self.backend_start.checked_add(index)?,
            frontend: self.frontend_start.checked_add(index)?,
        })
    }
}

/// Check whether a port can be bound on the loopback interface right now.
/// The probe listener is dropped immediately.
pub async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .is_ok()
}

/// Hands out unique port pairs from a bounded pool.
///
/// `allocate` calls are served one at a time in arrival order, so two
/// concurrent requests never probe and claim the same candidate.
#[derive(Debug)]
pub struct PortAllocator {
    range: PortRange,
    allocated: Mutex<HashSet<u16>>,
    // tokio's Mutex is FIFO-fair; holding it for the whole scan serializes
    // allocations in arrival order.
    turn: tokio::sync::Mutex<()>,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            allocated: Mutex::new(HashSet::new()),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn range(&self) -> &PortRange {
        &self.range
    }

    fn table(&self) -> MutexGuard<'_, HashSet<u16>> {
        self.allocated.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_claimed(&self, pair: PortPair) -> bool {
        let table = self.table();
        table.contains(&pair.backend) || table.contains(&pair.frontend)
    }

    /// Reserve the first candidate pair that is free both in the internal
    /// table and at the OS level.
    pub async fn allocate(&self) -> Result<PortPair, InstanceError> {
        let _turn = self.turn.lock().await;

        for index in 0..self.range.max_instances {
            let Some(pair) = self.range.candidate(index) else {
                break;
            };
            if self.is_claimed(pair) {
                continue;
            }

            if !check_port_available(pair.backend).await
                || !check_port_available(pair.frontend).await
            {
                debug!(
                    backend_port = pair.backend,
                    frontend_port = pair.frontend,
                    "candidate ports busy at OS level, skipping"
                );
                continue;
            }

            let mut table = self.table();
            // Re-check after the probe's await points.
            if table.contains(&pair.backend) || table.contains(&pair.frontend) {
                continue;
            }
            table.insert(pair.backend);
            table.insert(pair.frontend);
            info!(
                backend_port = pair.backend,
                frontend_port = pair.frontend,
                "ports allocated"
            );
            return Ok(pair);
        }

        Err(InstanceError::PortsExhausted {
            max: self.range.max_instances,
        })
    }

    /// Return both ports to the pool. Safe to call for ports that were never
    /// allocated or were already released.
    pub fn release(&self, backend: u16, frontend: u16) {
        let mut table = self.table();
        let had_backend = table.remove(&backend);
        let had_frontend = table.remove(&frontend);
        if had_backend || had_frontend {
            debug!(backend_port = backend, frontend_port = frontend, "ports released");
        }
    }

    /// Snapshot of the currently reserved pairs, sorted by backend port.
    pub fn allocated(&self) -> Vec<PortPair> {
        let table = self.table();
        let mut pairs: Vec<PortPair> = (0..self.range.max_instances)
            .filter_map(|i| self.range.candidate(i))
            .filter(|p| table.contains(&p.backend) && table.contains(&p.frontend))
            .collect();
        pairs.sort();
        pairs
    }
}
