pub mod record_channel;
pub mod result_store;
pub mod writer_pool;
pub mod writer_seat;

pub use record_channel::{RecordChannel, RecordWriter};
pub use result_store::ResultStoreChannel;
pub use writer_pool::WriterPool;
pub use writer_seat::WriterSeat;
