pub mod iterator_incrementer;
pub mod latch;
pub mod use_counter;

pub use iterator_incrementer::IteratorIncrementer;
pub use latch::Latch;
pub use use_counter::UseCounter;
