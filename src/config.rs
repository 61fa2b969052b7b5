// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Runtime settings for the settlement engine.

use crate::store::MemoryStore;
use std::time::Duration;

/// Settlement engine settings.
///
/// The binaries fill this from command-line flags and their environment
/// fallbacks (`ENABLE_SETTLEMENT_TRACING`, `SETTLEMENT_LOCK_TIMEOUT_MS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Wrap each settlement call in a span tagged with a fresh request ID.
    pub trace_settlements: bool,
    /// Longest a unit of work waits for a busy transaction before failing
    /// with a retryable persistence error.
    pub lock_timeout: Duration,
}

impl SettlementConfig {
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace_settlements = enabled;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            trace_settlements: false,
            lock_timeout: MemoryStore::DEFAULT_LOCK_TIMEOUT,
        }
    }
}
