//! Unit of Work: nested transactions and after-commit work.
//!
//! Transactions nest per repository instance. Only the outermost level
//! begins and commits on the adapter; inner levels run under a savepoint so
//! that a failing level undoes its own writes. Work queued with
//! [`Repository::after_commit`] (including event publications) runs once
//! the outermost level has committed, in registration order.

use std::future::Future;

use common::{AppError, AppResult};
use tracing::{debug, error, warn};

use crate::adapter::Adapter;
use crate::repository::Repository;
use crate::state::{lock, AfterCommit, TransactionFrame};

impl<A: Adapter> Repository<A> {
    /// Execute `body` within a transaction.
    ///
    /// The outermost level commits on success and rolls back on error. A
    /// failing level discards its writes and the after-commit work it
    /// queued. When the adapter has no savepoints, a failing inner level
    /// makes the whole transaction roll back instead.
    pub async fn transaction<'a, T, F>(&'a self, body: F) -> AppResult<T>
    where
        T: Send + 'a,
        F: Future<Output = AppResult<T>> + Send + 'a,
    {
        let (frame, outermost) = TransactionFrame::open(&self.state);

        if !outermost {
            return self.nested(frame, body).await;
        }

        debug!(resource = self.resource(), "Beginning transaction");
        self.adapter.begin_transaction().await?;

        let outcome = body.await;
        let rollback_only = std::mem::take(&mut lock(&self.state).rollback_only);

        match outcome {
            Ok(value) if !rollback_only => {
                self.adapter.commit_transaction().await?;
                debug!(resource = self.resource(), "Transaction committed");

                let pending = frame.settle_outermost();
                self.run_after_commit(pending).await;
                Ok(value)
            }
            Ok(_) => {
                self.rollback().await;
                Err(AppError::storage(format!(
                    "transaction on {} rolled back after an inner level failed",
                    self.resource()
                )))
            }
            Err(err) => {
                self.rollback().await;
                debug!(resource = self.resource(), error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    async fn nested<T, F>(&self, frame: TransactionFrame<'_>, body: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let savepoint = match self.adapter.create_savepoint().await {
            Ok(()) => true,
            Err(AppError::Unimplemented(_)) => false,
            Err(err) => return Err(err),
        };

        match body.await {
            Ok(value) => {
                if savepoint {
                    if let Err(err) = self.adapter.release_savepoint().await {
                        self.mark_rollback_only();
                        return Err(err);
                    }
                }
                frame.settle();
                Ok(value)
            }
            Err(err) => {
                let undone = savepoint
                    && match self.adapter.rollback_to_savepoint().await {
                        Ok(()) => true,
                        Err(rollback_err) => {
                            error!(
                                resource = self.resource(),
                                error = %rollback_err,
                                "Savepoint rollback failed"
                            );
                            false
                        }
                    };
                if !undone {
                    self.mark_rollback_only();
                }
                Err(err)
            }
        }
    }

    fn mark_rollback_only(&self) {
        warn!(resource = self.resource(), "Transaction marked rollback-only");
        lock(&self.state).rollback_only = true;
    }

    async fn rollback(&self) {
        if let Err(err) = self.adapter.rollback_transaction().await {
            error!(
                resource = self.resource(),
                error = %err,
                "Transaction rollback failed"
            );
        }
    }

    /// Run `callback` after the current transaction commits, or right away
    /// when no transaction is open.
    pub fn after_commit<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = lock(&self.state);
        if state.depth == 0 {
            drop(state);
            callback();
        } else {
            state.pending.push(AfterCommit::Callback(Box::new(callback)));
        }
    }

    async fn run_after_commit(&self, pending: Vec<AfterCommit>) {
        for work in pending {
            match work {
                AfterCommit::Publish(publication) => {
                    let topic = publication.topic.clone();
                    match self.publisher.publish(publication).await {
                        Ok(()) => debug!(%topic, "Event published"),
                        Err(e) => error!(%topic, error = %e, "Event publication failed"),
                    }
                }
                AfterCommit::Callback(callback) => callback(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use domain::{Action, AllAccess, Attributes, AuthContext, Scope};
    use serde_json::{json, Value};

    use super::*;
    use crate::bus::{BusError, MockEventPublisher};
    use crate::memory::{MemoryAdapter, MemoryTable};
    use crate::settings::RepositorySettings;

    fn repository(publisher: MockEventPublisher) -> Repository<MemoryAdapter> {
        let settings = RepositorySettings::builder("posts")
            .service("blog")
            .build()
            .unwrap();
        Repository::new(
            MemoryAdapter::new(Arc::new(MemoryTable::new("posts"))),
            settings,
            Arc::new(AllAccess),
            Arc::new(publisher),
        )
    }

    /// Memory storage whose adapter offers no savepoints.
    struct NoSavepoints(MemoryAdapter);

    #[async_trait]
    impl Adapter for NoSavepoints {
        fn scoped(&self, auth: &dyn AuthContext, resource: &str, action: Action) -> AppResult<Scope> {
            self.0.scoped(auth, resource, action)
        }

        async fn begin_transaction(&self) -> AppResult<()> {
            self.0.begin_transaction().await
        }

        async fn commit_transaction(&self) -> AppResult<()> {
            self.0.commit_transaction().await
        }

        async fn rollback_transaction(&self) -> AppResult<()> {
            self.0.rollback_transaction().await
        }

        async fn create_impl(&self, attributes: Attributes, scope: &Scope) -> AppResult<Value> {
            self.0.create_impl(attributes, scope).await
        }
    }

    fn title(value: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("title".into(), json!(value));
        attributes
    }

    #[tokio::test]
    async fn after_commit_runs_immediately_outside_a_transaction() {
        let repo = repository(MockEventPublisher::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        repo.after_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn after_commit_waits_for_the_outermost_commit() {
        let repo = repository(MockEventPublisher::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let observed = calls.clone();
        repo.transaction(async {
            repo.transaction(async {
                repo.after_commit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                Ok(())
            })
            .await?;
            assert_eq!(observed.load(Ordering::SeqCst), 0);
            Ok::<_, AppError>(())
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_transaction_discards_after_commit_work() {
        let repo = repository(MockEventPublisher::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: AppResult<()> = repo
            .transaction(async {
                repo.after_commit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                Err(AppError::validation("boom"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publication_failure_is_not_propagated() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|publication| publication.topic == "blog:post:created")
            .times(1)
            .returning(|_| Err(BusError::Publish("broker down".into())));

        let repo = repository(publisher);
        let id = repo.create(title("Hello"), Some(Scope::All)).await.unwrap();

        assert_eq!(id.to_string(), "1");
        assert_eq!(repo.adapter().table().len(), 1);
    }

    #[tokio::test]
    async fn rollback_undoes_storage_changes() {
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let repo = repository(publisher);
        let result: AppResult<()> = repo
            .transaction(async {
                repo.create(title("Hello"), None).await?;
                Err(AppError::conflict("post"))
            })
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(repo.adapter().table().is_empty());
    }

    #[tokio::test]
    async fn inner_failure_undoes_only_its_own_writes() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|publication| publication.payload.resource_id == "1")
            .times(1)
            .returning(|_| Ok(()));

        let repo = repository(publisher);
        repo.transaction(async {
            repo.create(title("kept"), None).await?;
            let inner: AppResult<()> = repo
                .transaction(async {
                    repo.create(title("undone"), None).await?;
                    Err(AppError::validation("boom"))
                })
                .await;
            assert!(inner.is_err());
            Ok::<_, AppError>(())
        })
        .await
        .unwrap();

        let rows = repo.adapter().table().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("kept"));
    }

    #[tokio::test]
    async fn inner_failure_without_savepoints_rolls_back_everything() {
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let table = Arc::new(MemoryTable::new("posts"));
        let settings = RepositorySettings::builder("posts")
            .service("blog")
            .build()
            .unwrap();
        let repo = Repository::new(
            NoSavepoints(MemoryAdapter::new(table.clone())),
            settings,
            Arc::new(AllAccess),
            Arc::new(publisher),
        );

        let result: AppResult<()> = repo
            .transaction(async {
                repo.create(title("kept"), None).await?;
                let inner: AppResult<()> = repo
                    .transaction(async {
                        repo.create(title("failed"), None).await?;
                        Err(AppError::validation("boom"))
                    })
                    .await;
                assert!(inner.is_err());
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(table.is_empty());
        assert!(!table.in_transaction());

        // the flag does not leak into the next transaction
        let next: AppResult<()> = repo.transaction(async { Ok(()) }).await;
        assert!(next.is_ok());
    }
}
