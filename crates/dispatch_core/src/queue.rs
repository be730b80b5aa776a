//! Pending bookings awaiting a vehicle, plus the id -> entity index for every booking.

use std::collections::{BTreeMap, HashMap};

use bevy_ecs::prelude::{Entity, Resource};

use crate::ecs::BookingId;

/// A booking waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedBooking {
    pub id: BookingId,
    pub request_time: u64,
    pub entity: Entity,
}

/// Bookings with status `pending`, ordered by `(request_time, id)`.
///
/// A booking leaves the queue exactly when its status leaves `pending`: either
/// through [`BookingQueue::expire_overdue`] or [`BookingQueue::take`] on assignment.
#[derive(Debug, Default, Resource)]
pub struct BookingQueue {
    pending: BTreeMap<(u64, BookingId), Entity>,
}

impl BookingQueue {
    pub fn admit(&mut self, id: BookingId, request_time: u64, entity: Entity) {
        self.pending.insert((request_time, id), entity);
    }

    /// Remove and return every booking with `request_time + max_pending_ms < now`,
    /// oldest first.
    pub fn expire_overdue(&mut self, now: u64, max_pending_ms: u64) -> Vec<QueuedBooking> {
        let mut expired = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let (request_time, id) = *entry.key();
            if request_time.saturating_add(max_pending_ms) >= now {
                break;
            }
            let entity = entry.remove();
            expired.push(QueuedBooking {
                id,
                request_time,
                entity,
            });
        }
        expired
    }

    /// Ordered view of the pending bookings.
    pub fn peek_pending(&self) -> impl Iterator<Item = QueuedBooking> + '_ {
        self.pending
            .iter()
            .map(|(&(request_time, id), &entity)| QueuedBooking {
                id,
                request_time,
                entity,
            })
    }

    /// Remove a booking that was just assigned.
    pub fn take(&mut self, id: BookingId, request_time: u64) -> Option<Entity> {
        self.pending.remove(&(request_time, id))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Entity of every booking ever admitted. Bookings are never despawned.
#[derive(Debug, Default, Resource)]
pub struct BookingIndex(pub HashMap<BookingId, Entity>);

impl BookingIndex {
    pub fn get(&self, id: BookingId) -> Option<Entity> {
        self.0.get(&id).copied()
    }
}
