use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::{SessionFactory, TransportSession};
use crate::credentials::Credential;
use crate::error::SessionError;
use crate::scanner::results::TransportKind;

pub type SharedSession = Arc<Mutex<Box<dyn TransportSession>>>;

type Slot = Arc<Mutex<Option<SharedSession>>>;

/// Connected sessions per `host:port:username`.
///
/// Each key has its own slot. Lookup and connect for one key happen under
/// that slot's lock, so two callers asking for the same key never open two
/// connections while different keys connect in parallel.
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(host: IpAddr, port: u16, username: &str) -> String {
        format!("{}:{}:{}", host, port, username)
    }

    pub async fn get_or_connect(
        &self,
        kind: TransportKind,
        host: IpAddr,
        port: u16,
        credential: &Credential,
    ) -> Result<SharedSession, SessionError> {
        let key = Self::key(host, port, &credential.username);
        let slot = self.slots.lock().await.entry(key.clone()).or_default().clone();
        let mut cached = slot.lock().await;

        if let Some(existing) = cached.as_ref() {
            return Ok(existing.clone());
        }

        let connected = match self.factory.open(kind) {
            Some(mut session) => match session.connect(host, port, credential).await {
                Ok(()) => Ok(session),
                Err(e) => {
                    session.disconnect().await;
                    Err(e)
                }
            },
            None => Err(SessionError::Protocol(format!("no {} transport available", kind))),
        };

        match connected {
            Ok(session) => {
                debug!(%key, "Session cached");
                let shared: SharedSession = Arc::new(Mutex::new(session));
                *cached = Some(shared.clone());
                Ok(shared)
            }
            Err(e) => {
                drop(cached);
                self.forget_empty(&key, &slot).await;
                Err(e)
            }
        }
    }

    /// Drop a slot nobody managed to fill.
    async fn forget_empty(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().await;
        if let Some(current) = slots.get(key) {
            let unfilled = current.try_lock().map(|s| s.is_none()).unwrap_or(false);
            if Arc::ptr_eq(current, slot) && unfilled {
                slots.remove(key);
            }
        }
    }

    /// Disconnect and forget the session for one key, if any.
    pub async fn release(&self, host: IpAddr, port: u16, username: &str) {
        let key = Self::key(host, port, username);
        let slot = self.slots.lock().await.remove(&key);
        if let Some(slot) = slot {
            if let Some(session) = slot.lock().await.take() {
                session.lock().await.disconnect().await;
                debug!(%key, "Session released");
            }
        }
    }

    /// Number of connected sessions held.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut connected = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                connected += 1;
            }
        }
        connected
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Disconnect and forget every cached session.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Slot)> = self.slots.lock().await.drain().collect();
        for (key, slot) in drained {
            if let Some(session) = slot.lock().await.take() {
                session.lock().await.disconnect().await;
                debug!(%key, "Session closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    struct CountingSession {
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
        accept: bool,
        connected: bool,
    }

    #[async_trait]
    impl TransportSession for CountingSession {
        fn kind(&self) -> TransportKind {
            TransportKind::Ssh
        }

        async fn connect(&mut self, _: IpAddr, _: u16, _: &Credential) -> Result<(), SessionError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.accept {
                self.connected = true;
                Ok(())
            } else {
                Err(SessionError::Auth)
            }
        }

        async fn execute(&mut self, _: &str, _: Duration) -> Result<String, SessionError> {
            Ok(String::new())
        }

        async fn disconnect(&mut self) {
            if self.connected {
                self.disconnects.fetch_add(1, Ordering::SeqCst);
            }
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct CountingFactory {
        connects: Arc<AtomicUsize>,
        disconnects: Arc<AtomicUsize>,
        accept: bool,
    }

    impl SessionFactory for CountingFactory {
        fn open(&self, _: TransportKind) -> Option<Box<dyn TransportSession>> {
            Some(Box::new(CountingSession {
                connects: self.connects.clone(),
                disconnects: self.disconnects.clone(),
                accept: self.accept,
                connected: false,
            }))
        }
    }

    fn pool(accept: bool) -> (Arc<SessionPool>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            connects: connects.clone(),
            disconnects: disconnects.clone(),
            accept,
        };
        (Arc::new(SessionPool::new(Arc::new(factory))), connects, disconnects)
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_connection() {
        let (pool, connects, disconnects) = pool(true);
        let host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let cred = Credential::new("admin", "admin");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let cred = cred.clone();
            handles.push(tokio::spawn(async move {
                pool.get_or_connect(TransportKind::Ssh, host, 22, &cred).await.is_ok()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len().await, 1);

        pool.close_all().await;
        assert!(pool.is_empty().await);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_and_failed_connects() {
        let (pool, connects, _) = pool(true);
        let host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        for user in ["a", "b"] {
            let cred = Credential::new(user, "x");
            pool.get_or_connect(TransportKind::Ssh, host, 22, &cred).await.unwrap();
        }
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(SessionPool::key(host, 22, "a"), "10.0.0.5:22:a");

        let (failing, _, _) = self::pool(false);
        let err = failing
            .get_or_connect(TransportKind::Ssh, host, 22, &Credential::new("a", "x"))
            .await
            .err();
        assert_eq!(err, Some(SessionError::Auth));
        assert!(failing.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_disconnects_and_forgets() {
        let (pool, connects, disconnects) = pool(true);
        let host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let cred = Credential::new("admin", "admin");

        pool.get_or_connect(TransportKind::Ssh, host, 22, &cred).await.unwrap();
        pool.release(host, 22, "admin").await;
        assert!(pool.is_empty().await);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        // a released key connects again
        pool.get_or_connect(TransportKind::Ssh, host, 22, &cred).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        pool.release(host, 22, "nobody").await;
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_connect_in_parallel() {
        let (pool, connects, _) = pool(true);
        let started = std::time::Instant::now();

        let mut handles = Vec::new();
        for i in 1..=10u8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, i));
                let cred = Credential::new("admin", "x");
                pool.get_or_connect(TransportKind::Ssh, host, 22, &cred).await.is_ok()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(connects.load(Ordering::SeqCst), 10);
        // ten 20ms connects one after another would take 200ms
        assert!(started.elapsed() < Duration::from_millis(150));
    }
}
