// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Tally.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tally_types::TrendLogId;
use tokio::sync::OwnedMutexGuard;

type Slots = Arc<Mutex<HashMap<TrendLogId, Arc<tokio::sync::Mutex<()>>>>>;

/// Per-trend-log async locks held across a baseline read-modify-write.
///
/// Locks are always taken in ascending id order, so two callers with
/// overlapping sets cannot deadlock. Disjoint sets never contend. A slot is
/// dropped again once no guard holds it and nobody waits for it.
#[derive(Debug, Default)]
pub struct TrendLogLocks {
    slots: Slots,
}

#[derive(Debug)]
pub struct TrendLogGuard {
    held: Vec<(TrendLogId, OwnedMutexGuard<()>)>,
    slots: Slots,
}

impl Drop for TrendLogGuard {
    fn drop(&mut self) {
        let ids: Vec<TrendLogId> = self.held.drain(..).map(|(id, _)| id).collect();
        let mut map = self.slots.lock();
        for id in ids {
            if map.get(&id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                map.remove(&id);
            }
        }
    }
}

impl TrendLogLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, ids: &[TrendLogId]) -> TrendLogGuard {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let slots: Vec<_> = {
            let mut map = self.slots.lock();
            ids.iter()
                .map(|id| (*id, Arc::clone(map.entry(*id).or_default())))
                .collect()
        };

        let mut held = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            held.push((id, slot.lock_owned().await));
        }
        TrendLogGuard {
            held,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of trend logs that currently have a lock slot.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}
