//! The Declarative Synchronizer (§4.3): keeps the Record Store and an
//! external declarative document in lockstep in both directions, with echo
//! suppression so one side's write doesn't bounce straight back as the
//! other side's trigger.
//!
//! Grounded on the donor's `k8s/operator.rs::start_reconciliation_loop` —
//! a `tokio::spawn`ed long-lived loop with a sleep-and-retry backoff —
//! generalized from a Kubernetes-CRD-specific reconciler into a
//! `DocumentSource`-generic one. Echo suppression is carried on the
//! `StorageEvent` itself (see `store::ReloadOrigin`) rather than a shared
//! flag, so a document-originated reload can never be mistaken for one the
//! store-to-document loop should persist back out.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::dns::cancellation::CancellationContext;
use crate::dns::diff::calculate_changes;
use crate::dns::errors::DocumentError;
use crate::dns::record::Record;
use crate::dns::store::{ReloadOrigin, Store};

/// The declarative document's shape: a flat list of records (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub records: Vec<Record>,
}

/// Abstract source of the declarative document (§4.3 "document source").
/// Implementations own their own I/O; `watch` runs on its own thread and
/// hands snapshots back over a channel so the Synchronizer's async tasks
/// never block on it directly.
pub trait DocumentSource: Send + Sync {
    fn get(&self) -> Result<Document, DocumentError>;
    fn update(&self, document: &Document) -> Result<(), DocumentError>;
    fn watch(&self) -> Receiver<Document>;
}

/// A `DocumentSource` backed by a single local YAML file, polled for
/// mtime changes. Not clustered, not locked against concurrent external
/// writers — sufficient for the single-operator deployment this server
/// targets (§1 Non-goals).
pub struct YamlFileDocumentSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl YamlFileDocumentSource {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> YamlFileDocumentSource {
        YamlFileDocumentSource {
            path: path.into(),
            poll_interval,
        }
    }

    fn read(path: &PathBuf) -> Result<Document, DocumentError> {
        let contents = fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| DocumentError::Parse(e.to_string()))
    }
}

impl DocumentSource for YamlFileDocumentSource {
    fn get(&self) -> Result<Document, DocumentError> {
        Self::read(&self.path)
    }

    fn update(&self, document: &Document) -> Result<(), DocumentError> {
        let yaml = serde_yaml::to_string(document).map_err(|e| DocumentError::Write(e.to_string()))?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    fn watch(&self) -> Receiver<Document> {
        let (tx, rx) = std::sync::mpsc::channel();
        let path = self.path.clone();
        let poll_interval = self.poll_interval;

        std::thread::spawn(move || {
            let mut last_modified = fs::metadata(&path).and_then(|m| m.modified()).ok();

            loop {
                std::thread::sleep(poll_interval);

                let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("failed to stat document at {}: {e}", path.display());
                        continue;
                    }
                };

                if Some(modified) == last_modified {
                    continue;
                }
                last_modified = Some(modified);

                match Self::read(&path) {
                    Ok(document) => {
                        if tx.send(document).is_err() {
                            return;
                        }
                    }
                    Err(e) => log::warn!("failed to parse document at {}: {e}", path.display()),
                }
            }
        });

        rx
    }
}

/// How long to wait before reopening a watch that terminated (§4.3
/// "Watch-channel termination is recoverable").
const WATCH_REOPEN_BACKOFF: Duration = Duration::from_secs(5);

/// How often the blocking document-watch receive wakes to recheck
/// `cancellation`, mirroring `store::Subscription::recv`'s poll interval.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Synchronizer<D: DocumentSource> {
    store: Arc<Store>,
    source: Arc<D>,
    cancellation: CancellationContext,
}

impl<D: DocumentSource + 'static> Synchronizer<D> {
    pub fn new(
        store: Arc<Store>,
        source: Arc<D>,
        cancellation: CancellationContext,
    ) -> Arc<Synchronizer<D>> {
        Arc::new(Synchronizer {
            store,
            source,
            cancellation,
        })
    }

    /// Spawns the two long-lived tasks described in §5: the document watch
    /// loop and the store-event drain loop. Both exit once `cancellation` is
    /// cancelled, at the next suspension point each loop checks.
    pub fn spawn(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let document_to_store = tokio::spawn(Arc::clone(self).run_document_to_store());
        let store_to_document = tokio::spawn(Arc::clone(self).run_store_to_document());
        (document_to_store, store_to_document)
    }

    /// Applies an incoming document to the store, tagging the resulting
    /// `Reloaded` event with its origin so `run_store_to_document` can
    /// recognize and suppress the echo from the event itself rather than
    /// from a flag that may have already been reset by the time the event
    /// is observed (§4.3 "Echo suppression", P10).
    fn apply_document(&self, document: Document) {
        let changes = match calculate_changes(&self.store, &document.records, &self.cancellation)
        {
            Ok(changes) => changes,
            Err(e) => {
                log::error!("failed to diff incoming document against the store: {e}");
                return;
            }
        };
        if changes.is_empty() {
            return;
        }
        if let Err(e) =
            self.store
                .partial_reload(changes, ReloadOrigin::Document, &self.cancellation)
        {
            log::error!("failed to apply incoming document to the store: {e}");
        }
    }

    async fn run_document_to_store(self: Arc<Self>) {
        loop {
            if self.cancellation.is_cancelled() {
                return;
            }

            let mut rx = self.source.watch();

            loop {
                let cancellation = self.cancellation.clone();
                let (item, returned_rx) = tokio::task::spawn_blocking(move || {
                    let item = recv_cancellable(&rx, &cancellation);
                    (item, rx)
                })
                .await
                .expect("document watch receive task panicked");
                rx = returned_rx;

                match item {
                    Ok(Some(document)) => self.apply_document(document),
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            log::warn!("document watch channel closed, reopening after backoff");
            tokio::time::sleep(WATCH_REOPEN_BACKOFF).await;
        }
    }

    async fn run_store_to_document(self: Arc<Self>) {
        let mut subscription = self.store.watch(self.cancellation.clone());

        loop {
            let (event, returned_sub) = tokio::task::spawn_blocking(move || {
                let event = subscription.recv();
                (event, subscription)
            })
            .await
            .expect("store watch receive task panicked");
            subscription = returned_sub;

            let event = match event {
                Ok(event) => event,
                Err(_) => return,
            };

            if matches!(event, crate::dns::store::StorageEvent::Reloaded(ReloadOrigin::Document)) {
                continue;
            }

            log::debug!("persisting store snapshot to document after {event:?}");
            let snapshot = Document {
                records: match self.store.list(&self.cancellation) {
                    Ok(records) => records,
                    Err(_) => return,
                },
            };
            if let Err(e) = self.source.update(&snapshot) {
                log::error!("failed to persist store snapshot to document: {e}");
            }
        }
    }
}

/// Blocks on `rx` for the next document, waking every `CANCEL_POLL_INTERVAL`
/// to check `ctx`. Returns `Ok(None)` on cancellation, `Err(())` when the
/// channel disconnects (the watch needs reopening).
fn recv_cancellable(rx: &Receiver<Document>, ctx: &CancellationContext) -> Result<Option<Document>, ()> {
    loop {
        if ctx.is_cancelled() {
            return Ok(None);
        }
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(document) => return Ok(Some(document)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Err(()),
        }
    }
}
