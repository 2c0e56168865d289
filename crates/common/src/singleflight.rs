//! Single-flight deduplication for identical concurrent async calls
//!
//! When several tasks need the same expensive result at the same time (the
//! canonical case being an OAuth token refresh), only the first caller for a
//! given key actually runs the operation. Everyone that arrives while it is
//! in flight awaits the same shared future and receives a clone of the one
//! outcome, success or failure. Once the flight lands, the key is cleared so
//! a later call starts fresh.

use std::collections::HashMap;
use std::hash::Hash;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type Flight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Deduplicates concurrent async operations by key.
///
/// `V` and `E` must be `Clone` because one outcome is fanned out to every
/// waiter.
pub struct SingleFlight<K, V, E> {
    flights: Mutex<HashMap<K, Flight<V, E>>>,
}

impl<K, V, E> Default for SingleFlight<K, V, E> {
    fn default() -> Self {
        Self { flights: Mutex::new(HashMap::new()) }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    /// Run `make()` under single-flight semantics for `key`.
    ///
    /// If a flight for `key` is already underway, `make` is never invoked and
    /// the caller awaits the existing flight. The closure only constructs the
    /// future; nothing is polled while the internal lock is held.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>> + Send + 'static,
    {
        let (flight, leader) = {
            let mut flights = self.flights.lock();
            if let Some(existing) = flights.get(&key) {
                (existing.clone(), false)
            } else {
                let flight: Flight<V, E> = make().boxed().shared();
                flights.insert(key.clone(), flight.clone());
                (flight, true)
            }
        };

        let result = flight.clone().await;

        if leader {
            let mut flights = self.flights.lock();
            // Only clear our own flight. A successor may already have
            // started a new one under the same key.
            if flights.get(&key).is_some_and(|current| current.ptr_eq(&flight)) {
                flights.remove(&key);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<String, u32, String>::new());
        let executions = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let flight = flight.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("account-a".to_string(), move || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flight = SingleFlight::<&'static str, &'static str, String>::new();
        let a = flight.run("a", || async { Ok("alpha") });
        let b = flight.run("b", || async { Ok("beta") });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, Ok("alpha"));
        assert_eq!(b, Ok("beta"));
    }

    #[tokio::test]
    async fn completed_flights_are_cleared_for_reuse() {
        let flight = SingleFlight::<&'static str, u32, String>::new();
        let executions = Arc::new(AtomicU32::new(0));

        for expected in 1..=3 {
            let executions = executions.clone();
            let value = flight
                .run("key", move || async move {
                    Ok(executions.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .await;
            assert_eq!(value, Ok(expected));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failures_are_fanned_out_then_cleared() {
        let flight = Arc::new(SingleFlight::<&'static str, u32, String>::new());

        let first = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err("refresh failed".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = flight.run("key", || async { Ok(99) }).await;

        assert_eq!(first.await.unwrap(), Err("refresh failed".to_string()));
        // The joiner shared the leader's failure rather than starting anew.
        assert_eq!(second, Err("refresh failed".to_string()));

        // After the flight lands a fresh call runs again.
        let third = flight.run("key", || async { Ok(1) }).await;
        assert_eq!(third, Ok(1));
    }
}
