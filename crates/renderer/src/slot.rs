//! Frame-slot bookkeeping.
//!
//! The active slot and the acquired image index are separate values: the
//! slot cycles round-robin over the frames in flight, while the image index
//! is whatever the presentation engine handed out.

/// Tracks the active frame slot and the image acquired for it.
#[derive(Debug, Clone)]
pub struct SlotCursor {
    /// Active slot (0 to slot_count - 1)
    current_slot: usize,
    slot_count: usize,
    /// Image acquired for the frame being recorded
    image_index: Option<u32>,
}

impl SlotCursor {
    /// Create a cursor over `slot_count` frame slots, starting at slot 0.
    pub fn new(slot_count: usize) -> Self {
        debug_assert!(slot_count > 0, "at least one frame slot is required");
        Self {
            current_slot: 0,
            slot_count,
            image_index: None,
        }
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Image acquired for the open frame, if any.
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    pub fn set_image_index(&mut self, index: u32) {
        self.image_index = Some(index);
    }

    /// Finish the frame: forget its image and move to the next slot.
    pub fn advance(&mut self) {
        self.image_index = None;
        self.current_slot = (self.current_slot + 1) % self.slot_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_cycle_with_period_n() {
        for n in 1..=4 {
            let mut cursor = SlotCursor::new(n);
            let visited: Vec<usize> = (0..2 * n)
                .map(|_| {
                    let slot = cursor.current_slot();
                    cursor.advance();
                    slot
                })
                .collect();
            let expected: Vec<usize> = (0..2 * n).map(|i| i % n).collect();
            assert_eq!(visited, expected);
        }
    }

    #[test]
    fn test_advance_clears_image_index() {
        let mut cursor = SlotCursor::new(2);
        cursor.set_image_index(2);
        assert_eq!(cursor.image_index(), Some(2));
        assert_eq!(cursor.current_slot(), 0);

        cursor.advance();
        assert_eq!(cursor.image_index(), None);
        assert_eq!(cursor.current_slot(), 1);
    }
}
