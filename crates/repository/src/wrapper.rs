//! Query and event wrappers around managed methods.

use std::future::Future;
use std::sync::Arc;

use common::{AppError, AppResult};
use domain::{value_kind, EventPayload, RecordId, METADATA_CAUSE_KEY, TOPIC_SEPARATOR};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, Instrument};

use crate::adapter::{AccessMode, Adapter};
use crate::bus::Publication;
use crate::registry::{ManagedMethod, MethodMode};
use crate::repository::Repository;
use crate::state::{lock, AfterCommit, CallState, Restore};

impl<A: Adapter> Repository<A> {
    /// Invoke the operation `name` with `body` as its implementation.
    ///
    /// Query methods run in read-only mode. Event methods run in read-write
    /// mode inside a transaction and queue their event for after the
    /// commit. `args` are the call arguments reported in the event payload.
    /// Undeclared names run `body` as is.
    pub async fn call<'a, T, F>(&'a self, name: &str, args: Vec<Value>, body: F) -> AppResult<T>
    where
        T: Serialize + Send + 'a,
        F: Future<Output = AppResult<T>> + Send + 'a,
    {
        let Some(method) = self.settings.methods().get(name).cloned() else {
            return body.await;
        };

        match method.mode() {
            MethodMode::Query => {
                let span = tracing::debug_span!("query", resource = self.resource(), method = name);
                self.adapter
                    .mode(AccessMode::ReadOnly, Box::pin(body))
                    .instrument(span)
                    .await
            }
            MethodMode::Event => {
                let topic = self.topic(&method);
                let span = tracing::debug_span!(
                    "event",
                    resource = self.resource(),
                    method = name,
                    topic = %topic
                );
                self.adapter
                    .mode(
                        AccessMode::ReadWrite,
                        Box::pin(self.run_event(method, topic, args, body)),
                    )
                    .instrument(span)
                    .await
            }
        }
    }

    fn topic(&self, method: &ManagedMethod) -> String {
        format!(
            "{}{}{}",
            self.resource(),
            TOPIC_SEPARATOR,
            method.event_name(self.settings.inflector())
        )
    }

    async fn run_event<'a, T, F>(
        &'a self,
        method: Arc<ManagedMethod>,
        topic: String,
        args: Vec<Value>,
        body: F,
    ) -> AppResult<T>
    where
        T: Serialize + Send + 'a,
        F: Future<Output = AppResult<T>> + Send + 'a,
    {
        let (metadata, emit) = {
            let state = lock(&self.state);
            let mut metadata = state.metadata.clone();
            if let Some(cause) = &state.cause {
                metadata.insert(METADATA_CAUSE_KEY.to_string(), Value::String(cause.clone()));
            }
            (metadata, !state.events_disabled)
        };

        self.transaction(async move {
            let _cause = self.enter_cause(emit.then(|| topic.clone()));

            let (result, payload) = if method.is_creation() {
                let result = body.await?;
                let id = creation_identifier(&result)?;
                (result, EventPayload::new(id, args, metadata))
            } else {
                let (id, remaining) = split_key(args, method.key())?;
                let result = body.await?;
                (result, EventPayload::new(id, remaining, metadata))
            };

            if emit {
                debug!(%topic, resource_id = %payload.resource_id, "queueing event");
                self.queue(AfterCommit::Publish(Publication::new(topic, payload)));
            }
            Ok(result)
        })
        .await
    }

    /// Mark `topic` as the cause of events emitted until the guard drops.
    fn enter_cause(&self, topic: Option<String>) -> Restore<'_, Option<String>> {
        let mut state = lock(&self.state);
        let prior = state.cause.clone();
        if topic.is_some() {
            state.cause = topic;
        }
        Restore::new(&self.state, prior, |state: &mut CallState, prior| {
            state.cause = prior
        })
    }

    pub(crate) fn queue(&self, work: AfterCommit) {
        lock(&self.state).pending.push(work);
    }
}

/// String form of the identifier returned by a creation method.
fn creation_identifier<T: Serialize>(result: &T) -> AppResult<String> {
    let value = serde_json::to_value(result).map_err(|e| AppError::internal(e.to_string()))?;

    RecordId::from_value(&value)
        .map(|id| id.to_string())
        .ok_or_else(|| AppError::InvalidCreationResult(value_kind(&value).to_string()))
}

/// Take the record identifier at `key` out of the call arguments.
fn split_key(mut args: Vec<Value>, key: usize) -> AppResult<(String, Vec<Value>)> {
    if key >= args.len() {
        return Err(AppError::internal(format!(
            "event method has {} argument(s), no record id at position {key}",
            args.len()
        )));
    }

    let id = args.remove(key);
    let id = match RecordId::from_value(&id) {
        Some(id) => id.to_string(),
        None => id.to_string(),
    };
    Ok((id, args))
}
