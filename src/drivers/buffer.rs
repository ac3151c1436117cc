use crate::drivers::AcquisitionError;
use crate::types::Sample;

/// Fixed-length sliding window of the most recent samples.
///
/// Always holds exactly `capacity` values (zero-filled at construction);
/// each push evicts the oldest one. Storage is circular so a push is O(1),
/// while [`SampleRing::snapshot`] still reads oldest to newest.
#[derive(Clone, Debug)]
pub struct SampleRing {
    slots: Vec<Sample>,
    // index of the oldest sample, which is also the next slot to overwrite
    head: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Result<Self, AcquisitionError> {
        Self::filled(capacity, 0)
    }

    pub fn filled(capacity: usize, value: Sample) -> Result<Self, AcquisitionError> {
        if capacity == 0 {
            return Err(AcquisitionError::InvalidCapacity);
        }
        Ok(Self {
            slots: vec![value; capacity],
            head: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, value: Sample) {
        self.slots[self.head] = value;
        self.head = (self.head + 1) % self.slots.len();
    }

    pub fn latest(&self) -> Sample {
        let newest = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots[newest]
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer).copied()
    }

    /// Owned copy, oldest first, newest last.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.iter().collect()
    }

    pub fn reset(&mut self) {
        self.slots.fill(0);
        self.head = 0;
    }
}
