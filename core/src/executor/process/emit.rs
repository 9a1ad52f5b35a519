use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::record::RecordMeta;

use crate::executor::process::context::ProcessContext;
use crate::executor::process::ProcessLogic;
use crate::stats::CounterKind;

/// Cancellation is re-checked after each batch of this many rows.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Sink-side process: drains its input exchanges and writes the records to
/// the request's result channel.
pub struct EmitLogic {
    meta: RecordMeta,
}

impl EmitLogic {
    pub fn new(meta: RecordMeta) -> Self {
        Self { meta }
    }
}

impl ProcessLogic for EmitLogic {
    fn run(&self, ctx: &mut ProcessContext<'_>) -> EngineResult<()> {
        let request = ctx.request();
        let channel = request.channel().ok_or_else(|| {
            EngineError::new(
                ErrorKind::Internal("emit without result channel".into()),
                "emit process requires a result channel",
            )
        })?;
        if channel.meta().is_none() {
            channel.set_meta(self.meta.clone())?;
        }
        let mut writer = channel.acquire().map_err(|e| {
            EngineError::new(
                ErrorKind::IoError(e.to_string()),
                "failed to acquire result writer",
            )
        })?;
        let mut since_check = 0usize;
        for index in 0..ctx.input_count() {
            let mut reader = ctx.input(index).reader();
            while let Some(record) = reader.next_record() {
                since_check += 1;
                if since_check >= CANCEL_CHECK_INTERVAL {
                    since_check = 0;
                    if request.check_cancel() {
                        channel.release(writer)?;
                        return Ok(());
                    }
                }
                writer.write(record).map_err(|e| {
                    EngineError::new(
                        ErrorKind::IoError(e.to_string()),
                        "failed to write result record",
                    )
                })?;
                if let Some(stats) = request.statistics() {
                    stats.count(CounterKind::Fetched, 1);
                }
            }
        }
        channel.release(writer)?;
        Ok(())
    }
}
