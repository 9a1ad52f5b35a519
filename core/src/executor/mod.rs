pub mod exchange;
pub mod flow;
pub mod function;
pub mod partitioner;
pub mod process;

pub use flow::{Flow, FlowRepository};
pub use partitioner::Partitioner;
