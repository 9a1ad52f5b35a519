use std::thread::JoinHandle;

use tracing::debug;

/// Owns one worker thread. Joining is deferred to pool stop.
pub(crate) struct ThreadControl {
    index: usize,
    handle: Option<JoinHandle<()>>,
}

impl ThreadControl {
    pub(crate) fn spawn<F>(index: usize, name_prefix: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("{name_prefix}-{index}"))
            .spawn(body)?;
        Ok(Self {
            index,
            handle: Some(handle),
        })
    }

    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!(index = self.index, "worker thread terminated by panic");
            }
        }
    }
}

impl Drop for ThreadControl {
    fn drop(&mut self) {
        self.join();
    }
}
