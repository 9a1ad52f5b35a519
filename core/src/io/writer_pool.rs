use std::sync::{Arc, Mutex};

use cascade_lib::error::EngineResult;
use tracing::warn;

use crate::io::record_channel::RecordChannel;
use crate::io::writer_seat::WriterSeat;

/// Fixed-capacity pool of writer seats over one record channel.
///
/// `acquire` hands out a reserved seat while any remain; writers created
/// through a seat stay with it across release/acquire cycles, so at most
/// `capacity` writers ever exist.
pub struct WriterPool {
    capacity: usize,
    seats: Mutex<Vec<WriterSeat>>,
}

impl WriterPool {
    pub fn new(channel: Arc<dyn RecordChannel>, capacity: usize) -> Self {
        let seats = (0..capacity)
            .map(|_| WriterSeat::reserved_on(Arc::clone(&channel)))
            .collect();
        Self {
            capacity,
            seats: Mutex::new(seats),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.seats.lock().unwrap().len()
    }

    /// Moves a reserved seat into `out`. Returns false (leaving `out`
    /// untouched) when all seats are already out.
    pub fn acquire(&self, out: &mut WriterSeat) -> bool {
        let mut seats = self.seats.lock().unwrap();
        match seats.pop() {
            Some(seat) => {
                *out = seat;
                true
            }
            None => false,
        }
    }

    /// Returns a previously acquired seat, together with its writer, back
    /// to the pool.
    pub fn release(&self, seat: WriterSeat) {
        let mut seats = self.seats.lock().unwrap();
        if seats.len() >= self.capacity {
            warn!("writer seat released into a full pool; dropping");
            return;
        }
        seats.push(seat);
    }

    /// Releases every pooled writer back to the channel and empties the
    /// pool. The pool must not be used for `acquire` afterwards.
    pub fn release_pool(&self) -> EngineResult<()> {
        let mut seats = self.seats.lock().unwrap();
        for seat in seats.iter_mut() {
            seat.return_writer()?;
        }
        seats.clear();
        Ok(())
    }
}
