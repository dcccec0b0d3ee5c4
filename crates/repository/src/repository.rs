//! Repository instance: CRUD orchestration over an [`Adapter`].

use std::future::Future;
use std::slice;
use std::sync::{Arc, Mutex};

use common::{AppError, AppResult};
use domain::{Action, Attributes, AuthContext, Filters, Metadata, Record, RecordId, Scope};
use futures::stream::{self, Stream};
use serde_json::Value;
use tracing::debug;

use crate::adapter::{Adapter, Query};
use crate::bus::EventPublisher;
use crate::include::{check_includes, resolve_includes, CorrelationSet};
use crate::options::{FindOptions, Found, IndexOptions};
use crate::pagination::{Page, PageRequest};
use crate::record::{RecordDescriptor, RecordKind};
use crate::registry::{METHOD_CREATE, METHOD_DELETE, METHOD_INDEX, METHOD_UPDATE};
use crate::settings::RepositorySettings;
use crate::state::{lock, CallState, Restore};

/// Event-emitting repository over a storage adapter.
///
/// One instance serves one logical caller: its metadata overlay, causation
/// marker and emission flag are per instance.
pub struct Repository<A: Adapter> {
    pub(crate) adapter: A,
    pub(crate) settings: Arc<RepositorySettings>,
    pub(crate) auth: Arc<dyn AuthContext>,
    pub(crate) publisher: Arc<dyn EventPublisher>,
    pub(crate) state: Mutex<CallState>,
}

impl<A: Adapter> Repository<A> {
    pub fn new(
        adapter: A,
        settings: Arc<RepositorySettings>,
        auth: Arc<dyn AuthContext>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            adapter,
            settings,
            auth,
            publisher,
            state: Mutex::new(CallState::default()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    pub fn auth_context(&self) -> &dyn AuthContext {
        self.auth.as_ref()
    }

    pub fn resource(&self) -> &str {
        self.settings.resource()
    }

    pub fn table(&self) -> &str {
        self.settings.table()
    }

    pub fn model(&self) -> &RecordKind {
        self.settings.model()
    }

    /// Current metadata overlay.
    pub fn metadata(&self) -> Metadata {
        lock(&self.state).metadata.clone()
    }

    /// Topic of the event method currently running, if any.
    pub fn causation(&self) -> Option<String> {
        lock(&self.state).cause.clone()
    }

    pub fn events_enabled(&self) -> bool {
        !lock(&self.state).events_disabled
    }

    // =========================================================================
    // Scoped state
    // =========================================================================

    /// Run `body` with `patch` merged over the metadata overlay.
    ///
    /// The prior overlay is restored however `body` ends.
    pub async fn with_metadata<F: Future>(&self, patch: Metadata, body: F) -> F::Output {
        let _restore = {
            let mut state = lock(&self.state);
            let prior = state.metadata.clone();
            state.metadata.extend(patch);
            Restore::new(&self.state, prior, |state: &mut CallState, prior| {
                state.metadata = prior
            })
        };
        body.await
    }

    /// Run `body` with event emission disabled.
    pub async fn no_event<F: Future>(&self, body: F) -> F::Output {
        let _restore = {
            let mut state = lock(&self.state);
            let prior = std::mem::replace(&mut state.events_disabled, true);
            Restore::new(&self.state, prior, |state: &mut CallState, prior| {
                state.events_disabled = prior
            })
        };
        body.await
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    /// Scope of `action` for the current caller, resolved by the adapter.
    pub fn scoped(&self, action: Action) -> AppResult<Scope> {
        self.adapter
            .scoped(self.auth.as_ref(), self.resource(), action)
    }

    /// Create scope of the caller, rejected unless `predicate` accepts it.
    pub fn can_create<P>(&self, predicate: P) -> AppResult<Scope>
    where
        P: FnOnce(&Scope) -> bool,
    {
        self.check_grant(Action::Create, predicate)
    }

    /// Update scope of the caller, rejected unless `predicate` accepts it.
    pub fn can_update<P>(&self, predicate: P) -> AppResult<Scope>
    where
        P: FnOnce(&Scope) -> bool,
    {
        self.check_grant(Action::Update, predicate)
    }

    fn check_grant<P>(&self, action: Action, predicate: P) -> AppResult<Scope>
    where
        P: FnOnce(&Scope) -> bool,
    {
        let scope = self.auth.can(action, self.resource())?;
        if predicate(&scope) {
            Ok(scope)
        } else {
            Err(AppError::Forbidden(format!("{} on {}", action, self.resource())))
        }
    }

    fn resolve_scope(&self, scope: Option<Scope>, action: Action) -> AppResult<Scope> {
        match scope {
            Some(scope) => Ok(scope),
            None => self.scoped(action),
        }
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    pub fn encode(&self, attributes: &Attributes) -> Attributes {
        self.settings.encoders().encode(attributes)
    }

    pub fn decode(&self, row: &Record) -> Record {
        self.settings.encoders().decode(row)
    }

    pub fn encode_many(&self, rows: &[Attributes]) -> Vec<Attributes> {
        self.settings.encoders().encode_many(rows)
    }

    pub fn decode_many(&self, rows: &[Record]) -> Vec<Record> {
        self.settings.encoders().decode_many(rows)
    }

    pub fn encode_filters(&self, filters: &Filters) -> AppResult<Filters> {
        self.settings
            .encoders()
            .encode_filters(filters, self.adapter.filtering())
    }

    // =========================================================================
    // Inclusion
    // =========================================================================

    /// Resolve include paths for `owners` of record kind `kind`.
    ///
    /// Unknown top-level relations fail even when there are no owners.
    pub async fn include(
        &self,
        paths: &[String],
        owners: &[Record],
        kind: &RecordDescriptor,
    ) -> AppResult<CorrelationSet> {
        check_includes(paths, kind)?;
        if paths.is_empty() || owners.is_empty() {
            return Ok(CorrelationSet::new());
        }
        resolve_includes(paths, owners, kind, self.auth.as_ref()).await
    }

    fn query<'a>(&'a self, scope: &'a Scope, record: &'a RecordDescriptor) -> Query<'a> {
        Query {
            scope,
            record,
            custom_filters: self.settings.custom_filters(),
        }
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a record and return its identifier.
    ///
    /// Emits `<resource>:created` after commit.
    pub async fn create(&self, attributes: Attributes, scope: Option<Scope>) -> AppResult<RecordId> {
        let args = vec![Value::Object(attributes.clone())];

        let id = self
            .call(METHOD_CREATE, args, async move {
                let scope = self.resolve_scope(scope, Action::Create)?;
                let encoded = self.encode(&attributes);
                self.adapter.create_impl(encoded, &scope).await
            })
            .await?;

        RecordId::from_value(&id)
            .ok_or_else(|| AppError::InvalidCreationResult(domain::value_kind(&id).to_string()))
    }

    /// Update a record. `Ok(false)` when no visible record has this id.
    ///
    /// Emits `<resource>:updated` after commit.
    pub async fn update(
        &self,
        id: impl Into<RecordId>,
        attributes: Attributes,
        scope: Option<Scope>,
    ) -> AppResult<bool> {
        let id = id.into();
        let args = vec![id.to_value(), Value::Object(attributes.clone())];

        self.call(METHOD_UPDATE, args, async move {
            let scope = self.resolve_scope(scope, Action::Update)?;
            let encoded = self.encode(&attributes);
            self.adapter.update_impl(&id, encoded, &scope).await
        })
        .await
    }

    /// Delete a record. `Ok(false)` when no visible record has this id.
    ///
    /// Emits `<resource>:deleted` after commit.
    pub async fn delete(&self, id: impl Into<RecordId>, scope: Option<Scope>) -> AppResult<bool> {
        let id = id.into();
        let args = vec![id.to_value()];

        self.call(METHOD_DELETE, args, async move {
            let scope = self.resolve_scope(scope, Action::Delete)?;
            self.adapter.delete_impl(&id, &scope).await
        })
        .await
    }

    /// First record matching `filters`, decoded, with its includes.
    pub async fn find_by(&self, filters: &Filters, options: FindOptions) -> AppResult<Option<Found>> {
        let encoded = self.encode_filters(filters)?;
        let scope = self.resolve_scope(options.scope, Action::Read)?;
        let kind = options
            .record
            .unwrap_or_else(|| self.settings.model().clone());

        check_includes(options.included.as_slice(), &kind)?;

        let row = self
            .adapter
            .find_by_impl(encoded, self.query(&scope, &kind))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record = self.decode(&row);
        let included = self
            .include(&options.included, slice::from_ref(&record), &kind)
            .await?;

        Ok(Some(Found { record, included }))
    }

    /// One page of records matching `filters`, decoded, with their includes.
    pub async fn index(&self, filters: &Filters, options: IndexOptions) -> AppResult<Page> {
        self.call(METHOD_INDEX, Vec::new(), async move {
            let encoded = self.encode_filters(filters)?;
            let scope = self.resolve_scope(options.scope, Action::Read)?;
            let kind = options
                .record
                .unwrap_or_else(|| self.settings.model().clone());

            let request = PageRequest {
                page: options.page,
                per_page: options
                    .items_per_page
                    .unwrap_or_else(|| self.settings.items_per_page()),
                sort: options.sort,
                query_count: options.query_count,
            };

            let listing = self
                .adapter
                .index_impl(encoded, self.query(&scope, &kind), &request)
                .await?;

            let records = self.decode_many(&listing.records);
            let included = self.include(&options.included, &records, &kind).await?;

            Ok(Page::new(records, &request, listing.total).with_included(included))
        })
        .await
    }

    /// Lazy sequence of pages, starting at `options.page`.
    ///
    /// Ends at the first empty page. An error is yielded once and ends the
    /// stream. Every call starts a fresh stream.
    pub fn chunked_index(
        &self,
        filters: Filters,
        options: IndexOptions,
    ) -> impl Stream<Item = AppResult<Page>> + Send + '_ {
        let per_page = options
            .items_per_page
            .unwrap_or_else(|| self.settings.chunk_size());
        let first = options.page;
        let options = options.per_page(per_page).without_count();

        stream::unfold(Some(first), move |next| {
            let filters = filters.clone();
            let options = options.clone();
            async move {
                let page = next?;
                debug!(resource = self.resource(), page, "fetching chunk");

                match self.index(&filters, options.page(page)).await {
                    Ok(result) if result.is_empty() => None,
                    Ok(result) => Some((Ok(result), page.checked_add(1))),
                    Err(err) => Some((Err(err), None)),
                }
            }
        })
    }

    // =========================================================================
    // Strict variants
    // =========================================================================

    pub async fn find_by_strict(&self, filters: &Filters, options: FindOptions) -> AppResult<Found> {
        self.find_by(filters, options)
            .await?
            .ok_or_else(|| AppError::not_found(Value::Object(filters.clone()).to_string()))
    }

    pub async fn update_strict(
        &self,
        id: impl Into<RecordId>,
        attributes: Attributes,
        scope: Option<Scope>,
    ) -> AppResult<()> {
        let id = id.into();
        if self.update(id.clone(), attributes, scope).await? {
            Ok(())
        } else {
            Err(AppError::not_found(id.to_string()))
        }
    }

    pub async fn delete_strict(&self, id: impl Into<RecordId>, scope: Option<Scope>) -> AppResult<()> {
        let id = id.into();
        if self.delete(id.clone(), scope).await? {
            Ok(())
        } else {
            Err(AppError::not_found(id.to_string()))
        }
    }
}
