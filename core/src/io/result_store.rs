use std::sync::{Arc, Mutex};

use cascade_lib::error::EngineResult;
use cascade_lib::record::{Record, RecordMeta};

use crate::io::record_channel::{RecordChannel, RecordWriter};

#[derive(Default)]
struct Store {
    meta: Option<RecordMeta>,
    rows: Vec<Record>,
    completed: bool,
}

/// In-memory record channel collecting all rows; the channel of choice for
/// statements executed without a client stream and for tests.
#[derive(Default)]
pub struct ResultStoreChannel {
    store: Arc<Mutex<Store>>,
}

impl ResultStoreChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the rows written so far.
    pub fn rows(&self) -> Vec<Record> {
        self.store.lock().unwrap().rows.clone()
    }

    pub fn row_count(&self) -> usize {
        self.store.lock().unwrap().rows.len()
    }

    pub fn completed(&self) -> bool {
        self.store.lock().unwrap().completed
    }
}

struct ResultStoreWriter {
    store: Arc<Mutex<Store>>,
    buffer: Vec<Record>,
    written: usize,
}

impl RecordWriter for ResultStoreWriter {
    fn write(&mut self, record: Record) -> EngineResult<()> {
        self.buffer.push(record);
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> EngineResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut store = self.store.lock().unwrap();
        store.rows.append(&mut self.buffer);
        Ok(())
    }

    fn written_count(&self) -> usize {
        self.written
    }
}

impl RecordChannel for ResultStoreChannel {
    fn set_meta(&self, meta: RecordMeta) -> EngineResult<()> {
        self.store.lock().unwrap().meta = Some(meta);
        Ok(())
    }

    fn meta(&self) -> Option<RecordMeta> {
        self.store.lock().unwrap().meta.clone()
    }

    fn acquire(&self) -> EngineResult<Box<dyn RecordWriter>> {
        Ok(Box::new(ResultStoreWriter {
            store: Arc::clone(&self.store),
            buffer: Vec::new(),
            written: 0,
        }))
    }

    fn release(&self, mut writer: Box<dyn RecordWriter>) -> EngineResult<()> {
        writer.flush()
    }

    fn complete(&self) -> EngineResult<()> {
        self.store.lock().unwrap().completed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_lib::value::Value;

    #[test]
    fn test_rows_visible_after_release() {
        let ch = ResultStoreChannel::new();
        let mut w = ch.acquire().unwrap();
        w.write(Record::new(vec![Value::Int4(1)])).unwrap();
        w.write(Record::new(vec![Value::Int4(2)])).unwrap();
        assert_eq!(ch.row_count(), 0);
        ch.release(w).unwrap();
        assert_eq!(ch.row_count(), 2);
    }

    #[test]
    fn test_complete_marks_channel() {
        let ch = ResultStoreChannel::new();
        assert!(!ch.completed());
        ch.complete().unwrap();
        assert!(ch.completed());
    }
}
