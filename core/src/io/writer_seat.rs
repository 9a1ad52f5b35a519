use std::sync::Arc;

use cascade_lib::error::EngineResult;

use crate::io::record_channel::{RecordChannel, RecordWriter};

/// A reserved slot for one writer of the result channel.
///
/// Seats come from the [`crate::io::WriterPool`]; holding a reserved seat
/// is the right to use one writer. The writer itself is acquired lazily on
/// first use and travels with the seat when it moves.
pub struct WriterSeat {
    channel: Option<Arc<dyn RecordChannel>>,
    writer: Option<Box<dyn RecordWriter>>,
    reserved: bool,
}

impl Default for WriterSeat {
    fn default() -> Self {
        Self::empty()
    }
}

impl WriterSeat {
    /// A non-reserved empty seat, the target for `WriterPool::acquire`.
    pub fn empty() -> Self {
        Self {
            channel: None,
            writer: None,
            reserved: false,
        }
    }

    pub(crate) fn reserved_on(channel: Arc<dyn RecordChannel>) -> Self {
        Self {
            channel: Some(channel),
            writer: None,
            reserved: true,
        }
    }

    pub fn reserved(&self) -> bool {
        self.reserved
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// The writer, acquiring it from the channel on first call.
    ///
    /// # Panics
    /// Panics when the seat is not reserved.
    pub fn writer(&mut self) -> EngineResult<&mut Box<dyn RecordWriter>> {
        assert!(self.reserved, "writer requested on a non-reserved seat");
        if self.writer.is_none() {
            let channel = self.channel.as_ref().expect("reserved seat has a channel");
            self.writer = Some(channel.acquire()?);
        }
        Ok(self.writer.as_mut().expect("writer just ensured"))
    }

    /// Gives the held writer back to the channel, leaving the seat
    /// reserved and writer-less.
    pub fn return_writer(&mut self) -> EngineResult<()> {
        if let Some(writer) = self.writer.take() {
            let channel = self.channel.as_ref().expect("reserved seat has a channel");
            channel.release(writer)?;
        }
        Ok(())
    }

    /// Moves the seat state out, leaving this seat empty.
    pub fn take(&mut self) -> WriterSeat {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::result_store::ResultStoreChannel;
    use cascade_lib::record::Record;
    use cascade_lib::value::Value;

    #[test]
    fn test_empty_seat_is_not_reserved() {
        let seat = WriterSeat::empty();
        assert!(!seat.reserved());
        assert!(!seat.has_writer());
    }

    #[test]
    fn test_writer_acquired_lazily() {
        let channel: Arc<dyn RecordChannel> = Arc::new(ResultStoreChannel::new());
        let mut seat = WriterSeat::reserved_on(Arc::clone(&channel));
        assert!(!seat.has_writer());
        seat.writer().unwrap();
        assert!(seat.has_writer());
    }

    #[test]
    fn test_move_transfers_writer() {
        let store = Arc::new(ResultStoreChannel::new());
        let channel: Arc<dyn RecordChannel> = store.clone();
        let mut seat = WriterSeat::reserved_on(channel);
        seat.writer()
            .unwrap()
            .write(Record::new(vec![Value::Int4(1)]))
            .unwrap();
        let mut moved = seat.take();
        assert!(!seat.reserved());
        assert!(!seat.has_writer());
        assert!(moved.reserved());
        assert!(moved.has_writer());
        moved.return_writer().unwrap();
        assert_eq!(store.row_count(), 1);
    }

    #[test]
    #[should_panic(expected = "non-reserved seat")]
    fn test_writer_on_empty_seat_panics() {
        let mut seat = WriterSeat::empty();
        let _ = seat.writer();
    }
}
