use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::{config::Stage, error::PipelineError};

/// A run-scoped, write-once value shared by every per-sample chain.
///
/// The producer calls [`Broadcast::fulfill`] exactly once; consumers block in
/// [`Broadcast::wait`] until the value (or the producer's failure) is
/// available. The value is handed out as an `Arc` and never mutated.
///
/// # Example
///
/// ```rust
/// use gemflow::{channel::Broadcast, config::Stage};
///
/// let token: Broadcast<String> = Broadcast::new(Stage::PrepareReference);
/// token.fulfill(Ok("ready".to_string()));
///
/// let (id, ready) = token.join("A").unwrap();
/// assert_eq!((id, ready.as_str()), ("A", "ready"));
/// ```
#[derive(Debug)]
pub struct Broadcast<T> {
    stage: Stage,
    slot: Mutex<Option<Result<Arc<T>, String>>>,
    ready: Condvar,
}

impl<T> Broadcast<T> {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Publish the value (or the failure that prevented it).
    ///
    /// Only the first call has an effect.
    pub fn fulfill(&self, value: Result<T, PipelineError>) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        if slot.is_some() {
            log::warn!("WARN [{}]: shared artifact already published", self.stage);
            return;
        }

        *slot = Some(value.map(Arc::new).map_err(|e| e.to_string()));
        self.ready.notify_all();
    }

    /// Block until the value is published.
    pub fn wait(&self) -> Result<Arc<T>, PipelineError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        while slot.is_none() {
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }

        match slot.as_ref() {
            Some(Ok(value)) => Ok(Arc::clone(value)),
            Some(Err(message)) => Err(PipelineError::SharedResource {
                stage: self.stage,
                message: message.clone(),
            }),
            None => unreachable!("slot checked above"),
        }
    }

    /// Pair one per-sample item with the shared value.
    ///
    /// Joining N items against one broadcast yields N pairs; the shared side
    /// never multiplies the item count.
    pub fn join<A>(&self, item: A) -> Result<(A, Arc<T>), PipelineError> {
        let value = self.wait()?;
        Ok((item, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn waiters_receive_the_same_value() {
        let shared: Arc<Broadcast<Vec<u8>>> = Arc::new(Broadcast::new(Stage::PrepareReference));

        let handles = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.join(i).unwrap())
            })
            .collect::<Vec<_>>();

        shared.fulfill(Ok(vec![1, 2, 3]));

        let mut ids = handles
            .into_iter()
            .map(|h| {
                let (id, value) = h.join().unwrap();
                assert_eq!(*value, vec![1, 2, 3]);
                id
            })
            .collect::<Vec<_>>();
        ids.sort();

        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn failure_reaches_every_consumer() {
        let shared: Broadcast<()> = Broadcast::new(Stage::FetchUniversal);
        shared.fulfill(Err(PipelineError::Http("offline".into())));

        for _ in 0..2 {
            match shared.wait() {
                Err(PipelineError::SharedResource { stage, message }) => {
                    assert_eq!(stage, Stage::FetchUniversal);
                    assert!(message.contains("offline"));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn second_fulfill_is_ignored() {
        let shared: Broadcast<u32> = Broadcast::new(Stage::PrepareReference);
        shared.fulfill(Ok(1));
        shared.fulfill(Ok(2));

        assert_eq!(*shared.wait().unwrap(), 1);
    }
}
