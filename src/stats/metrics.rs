//! Client and bitrate counters
//!
//! The same counter type is kept at stream, program and server level. Every
//! admitted connection adds its bitrate once at each level and removes it once
//! on teardown.

/// Concurrent client count and aggregate bitrate (bits/sec)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Connected clients
    pub n_clients: u32,
    /// Sum of the bitrates of all connected clients
    pub bitrate: u64,
    /// Highest client count seen
    pub max_clients: u32,
    /// Connections ever admitted
    pub total_clients: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one more client at `bitrate`
    pub fn add_client(&mut self, bitrate: u64) {
        self.n_clients += 1;
        self.bitrate += bitrate;
        self.total_clients += 1;
        self.max_clients = self.max_clients.max(self.n_clients);
    }

    /// Remove a client previously added with the same `bitrate`
    pub fn remove_client(&mut self, bitrate: u64) {
        if self.n_clients == 0 || self.bitrate < bitrate {
            tracing::warn!(
                n_clients = self.n_clients,
                bitrate = self.bitrate,
                removed = bitrate,
                "Unbalanced metrics removal"
            );
        }
        self.n_clients = self.n_clients.saturating_sub(1);
        self.bitrate = self.bitrate.saturating_sub(bitrate);
    }

    /// Reset the live counters, keeping historical totals
    pub fn clear(&mut self) {
        self.n_clients = 0;
        self.bitrate = 0;
    }
}

/// Server-wide admission ceilings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Maximum concurrent clients (0 = unlimited)
    pub max_connections: u32,
    /// Maximum aggregate bitrate in bits/sec (0 = unlimited)
    pub max_bitrate: u64,
}

impl Limits {
    /// Whether a candidate at `bitrate` would exceed these limits given the
    /// current server-level counters.
    pub fn would_exceed(&self, current: &Metrics, bitrate: u64) -> Option<LimitHit> {
        if self.max_connections > 0 && current.n_clients >= self.max_connections {
            return Some(LimitHit::Connections);
        }
        if self.max_bitrate > 0 && current.bitrate + bitrate >= self.max_bitrate {
            return Some(LimitHit::Bitrate);
        }
        None
    }
}

/// Which ceiling a rejected admission hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitHit {
    Connections,
    Bitrate,
}
