//! Pending publishes awaiting acknowledgement, keyed by message id.

use heapless::Vec;
use rand_core::RngCore;

use crate::packet::QoS;

/// How many random draws [`InFlight::allocate_id`] makes before giving up.
const ID_DRAWS: usize = 32;

/// Where a pending publish is in its acknowledgement handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// At-least-once, waiting for PUBACK.
    AwaitingPubAck,
    /// Exactly-once, waiting for PUBREC.
    AwaitingPubRec,
    /// Exactly-once, PUBREL sent, waiting for PUBCOMP.
    AwaitingPubComp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingPublish {
    pub id: u16,
    pub qos: QoS,
    pub phase: Phase,
}

/// Bounded table of publishes the broker has not finished acknowledging.
#[derive(Debug, Default)]
pub struct InFlight<const N: usize> {
    entries: Vec<PendingPublish, N>,
}

impl<const N: usize> InFlight<N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: u16) -> Option<&PendingPublish> {
        self.entries.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingPublish> {
        self.entries.iter()
    }

    /// Draws a random message id that is non-zero and not already in flight.
    pub fn allocate_id<R: RngCore + ?Sized>(&self, rng: &mut R) -> Option<u16> {
        (0..ID_DRAWS)
            .map(|_| rng.next_u32() as u16)
            .find(|id| *id != 0 && !self.contains(*id))
    }

    /// Starts tracking a publish that needs acknowledgement.
    ///
    /// At-most-once publishes are never tracked. Gives the entry back if the
    /// table is full or the id is already in flight.
    pub fn track(&mut self, id: u16, qos: QoS) -> Result<(), PendingPublish> {
        let phase = match qos {
            QoS::AtMostOnce => return Ok(()),
            QoS::AtLeastOnce => Phase::AwaitingPubAck,
            QoS::ExactlyOnce => Phase::AwaitingPubRec,
        };
        let pending = PendingPublish { id, qos, phase };
        if self.contains(id) {
            return Err(pending);
        }
        self.entries.push(pending)
    }

    /// PUBACK received. Returns the completed publish, if it was known.
    pub fn puback(&mut self, id: u16) -> Option<PendingPublish> {
        self.remove_where(|p| p.id == id && p.phase == Phase::AwaitingPubAck)
    }

    /// PUBREC received. Returns `true` if `id` is a known exactly-once publish.
    ///
    /// A repeated PUBREC leaves the entry in [`Phase::AwaitingPubComp`].
    pub fn pubrec(&mut self, id: u16) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|p| p.id == id && p.qos == QoS::ExactlyOnce)
        {
            Some(pending) => {
                pending.phase = Phase::AwaitingPubComp;
                true
            }
            None => false,
        }
    }

    /// PUBCOMP received. Returns the completed publish, if it was known.
    pub fn pubcomp(&mut self, id: u16) -> Option<PendingPublish> {
        self.remove_where(|p| p.id == id && p.qos == QoS::ExactlyOnce)
    }

    fn remove_where(&mut self, f: impl Fn(&PendingPublish) -> bool) -> Option<PendingPublish> {
        let index = self.entries.iter().position(f)?;
        Some(self.entries.swap_remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SequenceRng;

    #[test]
    fn test_at_most_once_is_not_tracked() {
        let mut table = InFlight::<4>::new();
        assert_eq!(table.track(1, QoS::AtMostOnce), Ok(()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_at_least_once_completes_on_puback() {
        let mut table = InFlight::<4>::new();
        table.track(7, QoS::AtLeastOnce).unwrap();
        assert_eq!(table.get(7).map(|p| p.phase), Some(Phase::AwaitingPubAck));

        assert_eq!(table.puback(8), None);
        assert_eq!(table.len(), 1);

        let done = table.puback(7).unwrap();
        assert_eq!(done.qos, QoS::AtLeastOnce);
        assert!(table.is_empty());
    }

    #[test]
    fn test_exactly_once_handshake() {
        let mut table = InFlight::<4>::new();
        table.track(42, QoS::ExactlyOnce).unwrap();
        assert_eq!(table.get(42).map(|p| p.phase), Some(Phase::AwaitingPubRec));

        // A PUBACK does not complete an exactly-once publish.
        assert_eq!(table.puback(42), None);

        assert!(table.pubrec(42));
        assert!(table.pubrec(42));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(42).map(|p| p.phase), Some(Phase::AwaitingPubComp));

        assert!(table.pubcomp(42).is_some());
        assert!(table.is_empty());
        assert!(!table.pubrec(42));
    }

    #[test]
    fn test_duplicate_and_full() {
        let mut table = InFlight::<2>::new();
        table.track(1, QoS::AtLeastOnce).unwrap();
        assert!(table.track(1, QoS::ExactlyOnce).is_err());
        table.track(2, QoS::ExactlyOnce).unwrap();
        assert!(table.is_full());
        assert!(table.track(3, QoS::AtLeastOnce).is_err());
    }

    #[test]
    fn test_allocate_id_skips_zero_and_in_flight() {
        let mut table = InFlight::<4>::new();
        table.track(5, QoS::AtLeastOnce).unwrap();

        // Only the low 16 bits are used: 0x0001_0000 maps to id 0.
        let mut rng = SequenceRng::new(&[0x0001_0000, 5, 0x0002_0009]);
        assert_eq!(table.allocate_id(&mut rng), Some(9));
    }

    #[test]
    fn test_allocate_id_gives_up() {
        let mut table = InFlight::<4>::new();
        table.track(5, QoS::AtLeastOnce).unwrap();
        let mut rng = SequenceRng::new(&[5]);
        assert_eq!(table.allocate_id(&mut rng), None);
    }

    #[test]
    fn test_clear() {
        let mut table = InFlight::<4>::new();
        table.track(1, QoS::AtLeastOnce).unwrap();
        table.track(2, QoS::ExactlyOnce).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }
}
