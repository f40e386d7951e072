//! Shared ontology handle and background expiry timers.
//!
//! [`SharedOntology`] is the whole-ontology lock: every mutation from more
//! than one thread goes through it. A temporary relation added through the
//! shared handle gets a timer thread that deactivates it when its duration
//! elapses. The ontology owns each timer's [`ExpiryHandle`]; dropping the
//! handle (by removing or expiring the relation, cancelling, or dropping the
//! ontology) disconnects the channel the timer waits on and the timer exits
//! without firing.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use super::Ontology;
use crate::error::{LogosError, LogosResult};
use crate::relation::{RelationBuilder, RelationId};

/// Cancel handle for a pending expiry timer. Dropping it cancels the timer.
pub struct ExpiryHandle {
    cancel: Sender<()>,
}

impl ExpiryHandle {
    /// Cancels the timer. Equivalent to dropping the handle.
    pub fn cancel(self) {
        // The timer also exits on disconnect, so a full or closed channel is fine.
        let _ = self.cancel.try_send(());
    }
}

impl fmt::Debug for ExpiryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExpiryHandle(..)")
    }
}

/// A thread-safe, cloneable handle to one [`Ontology`].
#[derive(Clone, Default)]
pub struct SharedOntology {
    inner: Arc<Mutex<Ontology>>,
}

impl SharedOntology {
    #[must_use]
    pub fn new(ontology: Ontology) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ontology)),
        }
    }

    /// Locks the ontology for exclusive access.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Internal` if a previous holder panicked.
    pub fn lock(&self) -> LogosResult<MutexGuard<'_, Ontology>> {
        self.inner
            .lock()
            .map_err(|_| LogosError::internal("ontology lock poisoned"))
    }

    /// Runs `f` with the ontology locked.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Internal` if the lock is poisoned.
    pub fn with<T>(&self, f: impl FnOnce(&mut Ontology) -> T) -> LogosResult<T> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Asserts a temporary relation and starts a timer that deactivates it
    /// after `duration`.
    ///
    /// The timer waits without holding the lock and takes it only to
    /// deactivate. If the relation was deduplicated onto an existing one,
    /// that relation is returned and no timer is started.
    ///
    /// # Errors
    ///
    /// The errors of [`Ontology::add_temporary_relation`], or
    /// `LogosError::Internal` if the lock is poisoned or the timer thread
    /// cannot be spawned. On a spawn failure the relation is removed again.
    pub fn add_temporary_relation(
        &self,
        builder: RelationBuilder,
        duration: Duration,
    ) -> LogosResult<RelationId> {
        let mut ontology = self.lock()?;
        let before = ontology.relation_count();
        let id = ontology.add_temporary_relation(builder, duration)?;
        if ontology.relation_count() == before {
            return Ok(id);
        }

        let (tx, rx) = bounded::<()>(1);
        let weak = Arc::downgrade(&self.inner);
        let name = format!("{}-{id}", ontology.config().expiry_thread_prefix);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || run_timer(&weak, id, &rx, duration));
        if let Err(e) = spawned {
            ontology.detach_relation(id)?;
            return Err(LogosError::internal(format!("failed to spawn expiry timer: {e}")));
        }

        ontology.timers.insert(id, ExpiryHandle { cancel: tx });
        debug!(relation = %id, ?duration, "expiry timer started");
        Ok(id)
    }

    /// Cancels the pending expiry timer of a relation. Returns false if
    /// none was pending.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Internal` if the lock is poisoned.
    pub fn cancel_expiry(&self, relation: RelationId) -> LogosResult<bool> {
        let mut ontology = self.lock()?;
        Ok(ontology.cancel_expiry(relation))
    }

    /// Number of timers still pending.
    ///
    /// # Errors
    ///
    /// Returns `LogosError::Internal` if the lock is poisoned.
    pub fn pending_timers(&self) -> LogosResult<usize> {
        Ok(self.lock()?.timers.len())
    }

    /// Unwraps the ontology if this is the last handle.
    ///
    /// # Errors
    ///
    /// Returns the handle unchanged if other clones are alive.
    pub fn try_into_inner(self) -> Result<Ontology, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner)),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl From<Ontology> for SharedOntology {
    fn from(ontology: Ontology) -> Self {
        Self::new(ontology)
    }
}

impl fmt::Debug for SharedOntology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedOntology")
            .field("strong", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl Ontology {
    /// Cancels the pending expiry timer of a relation. Returns false if none
    /// was pending.
    pub fn cancel_expiry(&mut self, relation: RelationId) -> bool {
        match self.timers.remove(&relation) {
            Some(handle) => {
                handle.cancel();
                debug!(relation = %relation, "expiry timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Returns true if an expiry timer is pending for the relation.
    #[must_use]
    pub fn has_pending_expiry(&self, relation: RelationId) -> bool {
        self.timers.contains_key(&relation)
    }
}

fn run_timer(ontology: &Weak<Mutex<Ontology>>, relation: RelationId, cancel: &Receiver<()>, duration: Duration) {
    match cancel.recv_timeout(duration) {
        Err(RecvTimeoutError::Timeout) => {}
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            trace!(relation = %relation, "expiry timer cancelled before firing");
            return;
        }
    }

    let Some(shared) = ontology.upgrade() else {
        return;
    };
    let mut guard = match shared.lock() {
        Ok(guard) => guard,
        Err(_) => {
            warn!(relation = %relation, "expiry timer found the ontology lock poisoned");
            return;
        }
    };

    // Cancelled while waiting for the lock.
    if guard.timers.remove(&relation).is_none() {
        return;
    }
    match guard.deactivate(relation) {
        Ok(_) => debug!(relation = %relation, "temporary relation expired"),
        Err(_) => warn!(relation = %relation, "expiry timer fired for a removed relation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truth::{TruthState, TruthValue};

    fn shared() -> (SharedOntology, crate::EntityId) {
        let mut ontology = Ontology::new();
        let cat = ontology.add_entity("CAT", "NOUN", &[], None).unwrap();
        ontology.add_predicate::<&str>("IS_IN_A", &[]).unwrap();
        (SharedOntology::new(ontology), cat)
    }

    fn mood(cat: crate::EntityId) -> RelationBuilder {
        RelationBuilder::new("IS_IN_A")
            .role("subject", cat)
            .truth(TruthValue::TRUE)
    }

    #[test]
    fn test_timer_deactivates() {
        let (shared, cat) = shared();
        let id = shared
            .add_temporary_relation(mood(cat), Duration::from_millis(30))
            .unwrap();
        assert_eq!(shared.pending_timers().unwrap(), 1);

        thread::sleep(Duration::from_millis(300));
        let ontology = shared.lock().unwrap();
        assert!(!ontology.relation(id).unwrap().active);
        assert_eq!(ontology.evaluate_truth(id).unwrap(), TruthState::False);
        assert!(!ontology.has_pending_expiry(id));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let (shared, cat) = shared();
        let id = shared
            .add_temporary_relation(mood(cat), Duration::from_millis(50))
            .unwrap();
        assert!(shared.cancel_expiry(id).unwrap());
        assert!(!shared.cancel_expiry(id).unwrap());

        thread::sleep(Duration::from_millis(200));
        let ontology = shared.lock().unwrap();
        assert!(ontology.relation(id).unwrap().active);
    }

    #[test]
    fn test_remove_cancels_timer() {
        let (shared, cat) = shared();
        let id = shared
            .add_temporary_relation(mood(cat), Duration::from_secs(60))
            .unwrap();
        shared.with(|o| o.remove_relation(id)).unwrap().unwrap();
        assert_eq!(shared.pending_timers().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_gets_no_second_timer() {
        let (shared, cat) = shared();
        let first = shared
            .add_temporary_relation(mood(cat), Duration::from_secs(60))
            .unwrap();
        let second = shared
            .add_temporary_relation(mood(cat), Duration::from_secs(60))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(shared.pending_timers().unwrap(), 1);
    }

    #[test]
    fn test_try_into_inner() {
        let (shared, _) = shared();
        let clone = shared.clone();
        let shared = shared.try_into_inner().unwrap_err();
        drop(clone);
        assert!(shared.try_into_inner().is_ok());
    }
}
