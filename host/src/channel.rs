use std::sync::Arc;

use cascade_core::io::{RecordChannel, RecordWriter, WriterPool, WriterSeat};
use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::record::{Record, RecordMeta};
use tracing::error;

/// Record channel that gates writer creation through a fixed pool of
/// seats. Each acquired writer occupies one seat; releasing (or dropping)
/// the writer returns the seat, together with its lazily created inner
/// writer, to the pool for reuse.
pub struct SeatedRecordChannel {
    inner: Arc<dyn RecordChannel>,
    pool: Arc<WriterPool>,
}

impl SeatedRecordChannel {
    pub fn new(inner: Arc<dyn RecordChannel>, capacity: usize) -> Self {
        let pool = Arc::new(WriterPool::new(Arc::clone(&inner), capacity));
        Self { inner, pool }
    }

    pub fn available_seats(&self) -> usize {
        self.pool.available()
    }

    /// Reclaims all seated writers; called once at the end of the request.
    pub fn release_pool(&self) -> EngineResult<()> {
        self.pool.release_pool()
    }
}

struct SeatedWriter {
    seat: Option<WriterSeat>,
    pool: Arc<WriterPool>,
    written: usize,
}

impl SeatedWriter {
    fn seat(&mut self) -> &mut WriterSeat {
        self.seat.as_mut().expect("seat present until drop")
    }
}

impl RecordWriter for SeatedWriter {
    fn write(&mut self, record: Record) -> EngineResult<()> {
        self.seat().writer()?.write(record)?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> EngineResult<()> {
        self.seat().writer()?.flush()
    }

    fn written_count(&self) -> usize {
        self.written
    }
}

impl Drop for SeatedWriter {
    fn drop(&mut self) {
        if let Some(mut seat) = self.seat.take() {
            if seat.has_writer() {
                if let Ok(writer) = seat.writer() {
                    if let Err(e) = writer.flush() {
                        error!(error = %e, "failed to flush seated writer");
                    }
                }
            }
            self.pool.release(seat);
        }
    }
}

impl RecordChannel for SeatedRecordChannel {
    fn set_meta(&self, meta: RecordMeta) -> EngineResult<()> {
        self.inner.set_meta(meta)
    }

    fn meta(&self) -> Option<RecordMeta> {
        self.inner.meta()
    }

    fn acquire(&self) -> EngineResult<Box<dyn RecordWriter>> {
        let mut seat = WriterSeat::empty();
        if !self.pool.acquire(&mut seat) {
            return Err(EngineError::new(
                ErrorKind::IoError("writer pool exhausted".into()),
                "all writer seats are in use",
            ));
        }
        Ok(Box::new(SeatedWriter {
            seat: Some(seat),
            pool: Arc::clone(&self.pool),
            written: 0,
        }))
    }

    fn release(&self, writer: Box<dyn RecordWriter>) -> EngineResult<()> {
        // dropping the seated writer flushes it and returns the seat
        drop(writer);
        Ok(())
    }

    fn complete(&self) -> EngineResult<()> {
        self.inner.complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::io::ResultStoreChannel;
    use cascade_lib::value::Value;

    fn channel(capacity: usize) -> (Arc<ResultStoreChannel>, SeatedRecordChannel) {
        let store = Arc::new(ResultStoreChannel::new());
        let seated = SeatedRecordChannel::new(store.clone(), capacity);
        (store, seated)
    }

    #[test]
    fn test_writes_reach_inner_channel_on_release() {
        let (store, seated) = channel(2);
        let mut writer = seated.acquire().unwrap();
        writer
            .write(Record::new(vec![Value::Int4(1)]))
            .unwrap();
        seated.release(writer).unwrap();
        assert_eq!(store.row_count(), 1);
        assert_eq!(seated.available_seats(), 2);
    }

    #[test]
    fn test_acquire_fails_when_seats_out() {
        let (_, seated) = channel(1);
        let first = seated.acquire().unwrap();
        match seated.acquire() {
            Err(err) => assert!(matches!(err.kind(), ErrorKind::IoError(_))),
            Ok(_) => panic!("expected acquire to fail when seats are out"),
        }
        drop(first);
        assert!(seated.acquire().is_ok());
    }

    #[test]
    fn test_release_pool_reclaims_seated_writers() {
        let (store, seated) = channel(2);
        let mut writer = seated.acquire().unwrap();
        writer
            .write(Record::new(vec![Value::Int4(7)]))
            .unwrap();
        seated.release(writer).unwrap();
        seated.release_pool().unwrap();
        assert_eq!(store.row_count(), 1);
        assert_eq!(seated.available_seats(), 0);
    }
}
