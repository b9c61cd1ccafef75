use std::time::Duration;

use tokio::sync::mpsc;
use watchpool::types::ChangeEvent;

/// Collects change batches delivered to a callback.
pub struct BatchRecorder {
    tx: mpsc::UnboundedSender<Vec<ChangeEvent>>,
    rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
}

impl BatchRecorder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A callback that forwards every batch into this recorder.
    pub fn callback(&self) -> impl Fn(&[ChangeEvent]) + Send + Sync + use<> {
        let tx = self.tx.clone();
        move |batch: &[ChangeEvent]| {
            let _ = tx.send(batch.to_vec());
        }
    }

    /// Next batch, panicking after 5 seconds.
    pub async fn next_batch(&mut self) -> Vec<ChangeEvent> {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("no change batch within 5 seconds")
            .expect("recorder channel closed")
    }

    /// Assert nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(batch)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("expected no change batch, got {batch:?}");
        }
    }
}

impl Default for BatchRecorder {
    fn default() -> Self {
        Self::new()
    }
}
