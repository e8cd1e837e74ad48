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

//! Record of payment events received from the processor.
//!
//! Every delivery is recorded before it is dispatched, so operators can see
//! which intents were redelivered and in what order intents first arrived.
//!
//! The per-intent records are an audit trail and live as long as the engine;
//! nothing trims them. Only the arrival queue is drained, through
//! [`DeliveryLog::drain_arrivals`]. Confirmation idempotency does not depend on
//! either: it comes from the guarded transitions on plans and bills.

use crate::base::IntentId;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

/// The ledger entity a payment event was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum EntityRef {
    Plan(crate::PlanId),
    Bill(crate::BillId),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub intent_id: IntentId,
    pub entity: EntityRef,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub deliveries: u32,
}

#[derive(Debug)]
pub struct DeliveryLog {
    /// Records keyed by intent for O(1) redelivery detection.
    records: DashMap<IntentId, DeliveryRecord>,

    /// Intents in the order they were first seen.
    arrival_order: SegQueue<IntentId>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            arrival_order: SegQueue::new(),
        }
    }

    /// Records a delivery and returns how many times this intent has now been seen.
    pub fn record(&self, intent_id: &IntentId, entity: EntityRef, now: DateTime<Utc>) -> u32 {
        // Entry API keeps check-and-insert atomic under concurrent redelivery.
        match self.records.entry(intent_id.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.deliveries += 1;
                record.last_seen = now;
                record.deliveries
            }
            Entry::Vacant(entry) => {
                entry.insert(DeliveryRecord {
                    intent_id: intent_id.clone(),
                    entity,
                    first_seen: now,
                    last_seen: now,
                    deliveries: 1,
                });
                self.arrival_order.push(intent_id.clone());
                1
            }
        }
    }

    pub fn get(&self, intent_id: &IntentId) -> Option<DeliveryRecord> {
        self.records.get(intent_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Intents that were delivered more than once.
    pub fn redelivered(&self) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self
            .records
            .iter()
            .filter(|r| r.deliveries > 1)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        records
    }

    /// Drains the first-arrival order. Each intent appears once.
    pub fn drain_arrivals(&self) -> Vec<IntentId> {
        std::iter::from_fn(|| self.arrival_order.pop()).collect()
    }
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BillId;
    use chrono::TimeZone;

    #[test]
    fn counts_redeliveries() {
        let log = DeliveryLog::new();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 0, 5, 0).unwrap();
        let intent = IntentId::from("pi_1");

        assert_eq!(log.record(&intent, EntityRef::Bill(BillId(1)), t0), 1);
        assert_eq!(log.record(&intent, EntityRef::Bill(BillId(1)), t1), 2);

        let record = log.get(&intent).unwrap();
        assert_eq!(record.first_seen, t0);
        assert_eq!(record.last_seen, t1);
        assert_eq!(log.redelivered().len(), 1);
    }

    #[test]
    fn arrival_order_lists_each_intent_once() {
        let log = DeliveryLog::new();
        let now = Utc::now();
        log.record(&"pi_a".into(), EntityRef::Unknown, now);
        log.record(&"pi_b".into(), EntityRef::Unknown, now);
        log.record(&"pi_a".into(), EntityRef::Unknown, now);

        assert_eq!(
            log.drain_arrivals(),
            vec![IntentId::from("pi_a"), IntentId::from("pi_b")]
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn records_outlive_a_drained_arrival_queue() {
        let log = DeliveryLog::new();
        let now = Utc::now();
        let intent = IntentId::from("pi_a");
        log.record(&intent, EntityRef::Unknown, now);
        log.record(&intent, EntityRef::Unknown, now);

        assert_eq!(log.drain_arrivals().len(), 1);
        assert!(log.drain_arrivals().is_empty());
        assert_eq!(log.get(&intent).map(|r| r.deliveries), Some(2));
        assert_eq!(log.redelivered().len(), 1);
    }
}
