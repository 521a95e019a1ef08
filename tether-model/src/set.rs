use crate::entity::{Entity, Settles};
use crate::error::{ModelError, ModelResult};
use crate::schema::EntitySchema;
use parking_lot::Mutex;
use regex_lite::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tether_core::{Attributes, CancelToken, ClientId, EventKind, Observable, ObserverHub, Value};
use tether_sync::{Method, Operation, SyncClient, SyncError, SyncOptions, SyncRequest};
use tracing::debug;

/// Builds entities from raw records added to a set.
pub type EntityFactory = Arc<dyn Fn(Attributes) -> Entity + Send + Sync>;

/// Something that can be added to a set: an existing entity or a raw record
/// that the set turns into one.
#[derive(Debug, Clone)]
pub enum Item {
    Entity(Entity),
    Record(Attributes),
}

impl From<Entity> for Item {
    fn from(entity: Entity) -> Self {
        Item::Entity(entity)
    }
}

impl From<&Entity> for Item {
    fn from(entity: &Entity) -> Self {
        Item::Entity(entity.clone())
    }
}

impl From<Attributes> for Item {
    fn from(record: Attributes) -> Self {
        Item::Record(record)
    }
}

impl From<serde_json::Value> for Item {
    fn from(json: serde_json::Value) -> Self {
        Item::Record(Value::from_json(json).into_map().unwrap_or_default())
    }
}

/// Ordering applied to a set after every insertion and removal.
#[derive(Clone)]
pub enum Comparator {
    /// Ascending (or descending) by the value at a dotted attribute path.
    Key { key: String, descending: bool },
    Func(Arc<dyn Fn(&Entity, &Entity) -> Ordering + Send + Sync>),
}

impl Comparator {
    /// Parses `"name"` (ascending) or `"-name"` (descending).
    pub fn key(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(key) => Comparator::Key {
                key: key.to_string(),
                descending: true,
            },
            None => Comparator::Key {
                key: spec.to_string(),
                descending: false,
            },
        }
    }

    pub fn by<F>(f: F) -> Self
    where
        F: Fn(&Entity, &Entity) -> Ordering + Send + Sync + 'static,
    {
        Comparator::Func(Arc::new(f))
    }
}

impl From<&str> for Comparator {
    fn from(spec: &str) -> Self {
        Comparator::key(spec)
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Key { key, descending } => f
                .debug_struct("Key")
                .field("key", key)
                .field("descending", descending)
                .finish(),
            Comparator::Func(_) => f.write_str("Func(..)"),
        }
    }
}

#[derive(Debug, Clone)]
enum Condition {
    Equals(Value),
    Pattern(Regex),
}

/// Attribute conditions an entity must all satisfy. Equality is loose, so
/// `"3"` matches `3`. Patterns only match string attributes.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    conditions: Vec<(String, Condition)>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), Condition::Equals(value.into())));
        self
    }

    pub fn pattern(mut self, key: impl Into<String>, pattern: Regex) -> Self {
        self.conditions.push((key.into(), Condition::Pattern(pattern)));
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.conditions.iter().all(|(key, condition)| {
            let value = entity.get_path(key).unwrap_or_default();
            match condition {
                Condition::Equals(expected) => value.loose_eq(expected),
                Condition::Pattern(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            }
        })
    }
}

#[derive(Default)]
struct SetState {
    items: Vec<Entity>,
    comparator: Option<Comparator>,
    url: Option<String>,
    factory: Option<EntityFactory>,
}

pub(crate) struct SetInner {
    client_id: ClientId,
    schema: Arc<EntitySchema>,
    state: Mutex<SetState>,
    observers: Mutex<ObserverHub<EntitySet>>,
    active: Mutex<Option<CancelToken>>,
}

/// An ordered collection of entities.
///
/// Events published:
/// - `add:<client id>` / `remove:<client id>` per entity
/// - `sort` after a reorder, `reset` after [`reset`](Self::reset)
/// - `request:<op>`, then `sync:<op>` or `error:<op>` around fetch/save
///
/// An entity belongs to at most one set. Adding it to another set removes
/// it from the first.
#[derive(Clone)]
pub struct EntitySet {
    inner: Arc<SetInner>,
}

impl EntitySet {
    /// An empty set whose raw records become entities of `schema`.
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self::with_state(schema, SetState::default())
    }

    fn with_state(schema: Arc<EntitySchema>, state: SetState) -> Self {
        Self {
            inner: Arc::new(SetInner {
                client_id: ClientId::new(),
                schema,
                state: Mutex::new(state),
                observers: Mutex::new(ObserverHub::new()),
                active: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<SetInner>) -> Self {
        Self { inner }
    }

    pub fn with_comparator(self, comparator: impl Into<Comparator>) -> Self {
        self.set_comparator(Some(comparator.into()));
        self
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.set_url(url);
        self
    }

    pub fn with_factory<F>(self, factory: F) -> Self
    where
        F: Fn(Attributes) -> Entity + Send + Sync + 'static,
    {
        self.inner.state.lock().factory = Some(Arc::new(factory));
        self
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.inner.schema
    }

    /// True if both handles refer to the same set.
    pub fn same(&self, other: &EntitySet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn url(&self) -> Option<String> {
        self.inner.state.lock().url.clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.inner.state.lock().url = Some(url.into());
    }

    pub fn comparator(&self) -> Option<Comparator> {
        self.inner.state.lock().comparator.clone()
    }

    /// Replaces the ordering and re-sorts.
    pub fn set_comparator(&self, comparator: Option<Comparator>) {
        self.inner.state.lock().comparator = comparator;
        self.resort();
    }

    // ── Reading ─────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    /// Snapshot of the items in order.
    pub fn items(&self) -> Vec<Entity> {
        self.inner.state.lock().items.clone()
    }

    pub fn at(&self, index: usize) -> Option<Entity> {
        self.inner.state.lock().items.get(index).cloned()
    }

    pub fn first(&self) -> Option<Entity> {
        self.at(0)
    }

    pub fn last(&self) -> Option<Entity> {
        self.inner.state.lock().items.last().cloned()
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.position(entity.client_id()).is_some()
    }

    fn position(&self, client_id: ClientId) -> Option<usize> {
        self.inner
            .state
            .lock()
            .items
            .iter()
            .position(|e| e.client_id() == client_id)
    }

    pub fn get_by_client_id(&self, client_id: ClientId) -> Option<Entity> {
        self.items().into_iter().find(|e| e.client_id() == client_id)
    }

    /// The first entity whose id loosely equals `id`.
    pub fn get_by_id(&self, id: impl Into<Value>) -> Option<Entity> {
        let id = id.into();
        self.find(|e| e.id().is_some_and(|own| own.loose_eq(&id)))
    }

    /// The first entity satisfying every condition of `matcher`.
    pub fn get(&self, matcher: &Matcher) -> Option<Entity> {
        self.find(|e| matcher.matches(e))
    }

    pub fn find<P>(&self, predicate: P) -> Option<Entity>
    where
        P: Fn(&Entity) -> bool,
    {
        self.items().into_iter().find(|e| predicate(e))
    }

    pub fn map<R, F>(&self, f: F) -> Vec<R>
    where
        F: FnMut(&Entity) -> R,
    {
        self.items().iter().map(f).collect()
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&Entity),
    {
        self.items().iter().for_each(f);
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.map(Entity::to_json))
    }

    // ── Insertion ───────────────────────────────────────────────

    /// Appends one item and re-sorts. Returns the stored entity.
    pub fn add(&self, item: impl Into<Item>) -> Entity {
        let (entity, added) = self.insert(item.into(), false);
        if added {
            self.resort();
        }
        entity
    }

    /// Appends several items with a single re-sort at the end.
    pub fn add_many<I>(&self, items: I) -> Vec<Entity>
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let mut changed = false;
        let entities = items
            .into_iter()
            .map(|item| {
                let (entity, added) = self.insert(item.into(), false);
                changed |= added;
                entity
            })
            .collect();
        if changed {
            self.resort();
        }
        entities
    }

    /// Moves every entity of `other` into this set.
    pub fn add_set(&self, other: &EntitySet) -> Vec<Entity> {
        if other.same(self) {
            return self.items();
        }
        self.add_many(other.items())
    }

    /// Inserts one item at the front and re-sorts.
    pub fn prepend(&self, item: impl Into<Item>) -> Entity {
        let (entity, added) = self.insert(item.into(), true);
        if added {
            self.resort();
        }
        entity
    }

    /// Inserts several items at the front, keeping their relative order.
    pub fn prepend_many<I>(&self, items: I) -> Vec<Entity>
    where
        I: IntoIterator,
        I::Item: Into<Item>,
    {
        let items: Vec<Item> = items.into_iter().map(Into::into).collect();
        let mut changed = false;
        let mut entities: Vec<Entity> = items
            .into_iter()
            .rev()
            .map(|item| {
                let (entity, added) = self.insert(item, true);
                changed |= added;
                entity
            })
            .collect();
        entities.reverse();
        if changed {
            self.resort();
        }
        entities
    }

    fn build_entity(&self, record: Attributes) -> Entity {
        let factory = self.inner.state.lock().factory.clone();
        match factory {
            Some(factory) => factory(record),
            None => Entity::from_attributes(self.inner.schema.clone(), record),
        }
    }

    /// Stores one item without re-sorting. The flag is false when the
    /// entity already was a member.
    fn insert(&self, item: Item, front: bool) -> (Entity, bool) {
        let entity = match item {
            Item::Entity(entity) => entity,
            Item::Record(record) => self.build_entity(record),
        };
        if self.contains(&entity) {
            return (entity, false);
        }
        if let Some(previous) = entity.collection() {
            if !previous.same(self) {
                debug!(
                    entity = %entity.client_id(),
                    from = %previous.client_id(),
                    to = %self.inner.client_id,
                    "moving entity between sets"
                );
                previous.remove(&entity);
            }
        }
        entity.set_membership(Arc::downgrade(&self.inner));
        {
            let mut state = self.inner.state.lock();
            if front {
                state.items.insert(0, entity.clone());
            } else {
                state.items.push(entity.clone());
            }
        }
        let path = entity.client_id().to_string();
        self.publish(EventKind::Add, Some(&path));
        (entity, true)
    }

    // ── Removal ─────────────────────────────────────────────────

    /// Removes one entity and re-sorts. `None` if it was not a member, in
    /// which case nothing is published.
    pub fn remove(&self, entity: &Entity) -> Option<Entity> {
        self.remove_by_client_id(entity.client_id())
    }

    pub fn remove_by_client_id(&self, client_id: ClientId) -> Option<Entity> {
        let removed = self.take(client_id)?;
        self.resort();
        Some(removed)
    }

    /// Removes several entities with a single re-sort at the end.
    pub fn remove_many<'a, I>(&self, entities: I) -> Vec<Entity>
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        let removed: Vec<Entity> = entities
            .into_iter()
            .filter_map(|e| self.take(e.client_id()))
            .collect();
        if !removed.is_empty() {
            self.resort();
        }
        removed
    }

    /// Removes every entity matching `predicate`.
    pub fn remove_where<P>(&self, predicate: P) -> Vec<Entity>
    where
        P: Fn(&Entity) -> bool,
    {
        let doomed: Vec<Entity> = self.items().into_iter().filter(|e| predicate(e)).collect();
        self.remove_many(&doomed)
    }

    fn take(&self, client_id: ClientId) -> Option<Entity> {
        let entity = {
            let mut state = self.inner.state.lock();
            let index = state.items.iter().position(|e| e.client_id() == client_id)?;
            state.items.remove(index)
        };
        entity.leave(&self.inner);
        let path = client_id.to_string();
        self.publish(EventKind::Remove, Some(&path));
        Some(entity)
    }

    /// Empties the set, publishing a single `reset` event.
    pub fn reset(&self) {
        let items = std::mem::take(&mut self.inner.state.lock().items);
        for entity in &items {
            entity.leave(&self.inner);
        }
        self.publish(EventKind::Reset, None);
    }

    // ── Ordering and derived sets ───────────────────────────────

    /// Reorders the items by `comparator` and publishes `sort`. The stored
    /// comparator is not replaced.
    pub fn sort(&self, comparator: &Comparator) {
        let mut items = self.items();
        match comparator {
            Comparator::Key { key, descending } => {
                let mut keyed: Vec<(Value, Entity)> = items
                    .into_iter()
                    .map(|e| (e.get_path(key).unwrap_or_default(), e))
                    .collect();
                keyed.sort_by(|a, b| a.0.compare(&b.0));
                if *descending {
                    keyed.reverse();
                }
                items = keyed.into_iter().map(|(_, e)| e).collect();
            }
            Comparator::Func(f) => items.sort_by(|a, b| f(a, b)),
        }
        self.inner.state.lock().items = items;
        self.publish(EventKind::Sort, None);
    }

    pub fn sort_by<F>(&self, f: F)
    where
        F: Fn(&Entity, &Entity) -> Ordering + Send + Sync + 'static,
    {
        self.sort(&Comparator::by(f));
    }

    fn resort(&self) {
        if let Some(comparator) = self.comparator() {
            self.sort(&comparator);
        }
    }

    /// A detached set of the entities matching `predicate`. Membership of
    /// the entities is unchanged.
    pub fn filter<P>(&self, predicate: P) -> EntitySet
    where
        P: Fn(&Entity) -> bool,
    {
        let items = self.items().into_iter().filter(|e| predicate(e)).collect();
        self.detached(items)
    }

    pub fn filter_by(&self, matcher: &Matcher) -> EntitySet {
        self.filter(|e| matcher.matches(e))
    }

    /// A detached set holding the same entities.
    pub fn duplicate(&self) -> EntitySet {
        self.detached(self.items())
    }

    fn detached(&self, items: Vec<Entity>) -> EntitySet {
        let state = {
            let state = self.inner.state.lock();
            SetState {
                items,
                comparator: state.comparator.clone(),
                url: state.url.clone(),
                factory: state.factory.clone(),
            }
        };
        EntitySet::with_state(self.inner.schema.clone(), state)
    }

    // ── Sync ────────────────────────────────────────────────────

    /// Builds a set for `url` and fetches it.
    pub async fn fetch_from(
        schema: Arc<EntitySchema>,
        client: &SyncClient,
        url: impl Into<String>,
        options: SyncOptions,
    ) -> ModelResult<EntitySet> {
        let set = EntitySet::new(schema).with_url(url);
        set.fetch(client, options).await?;
        Ok(set)
    }

    /// The token of the most recent sync operation, if not yet dropped.
    pub fn sync_token(&self) -> Option<CancelToken> {
        self.inner.active.lock().clone()
    }

    fn begin_sync(&self, options: &SyncOptions) -> CancelToken {
        let token = options.token.clone().unwrap_or_default();
        *self.inner.active.lock() = Some(token.clone());
        token
    }

    /// Loads records from the set URL.
    ///
    /// Records whose id matches a member update that member; the rest are
    /// added. A response repeating an id updates the entity built for its
    /// first occurrence. With `options.reset` the set is emptied first.
    pub async fn fetch(&self, client: &SyncClient, options: SyncOptions) -> ModelResult<()> {
        let url = options
            .url
            .clone()
            .or_else(|| self.url())
            .ok_or(ModelError::Sync(SyncError::MissingUrl(Operation::Fetch)))?;
        let request = SyncRequest::from_options(Method::Get, url, &options);
        let token = self.begin_sync(&options);
        let reset = options.reset;
        client
            .perform(self, Operation::Fetch, request, &token, |response| {
                let records = records_from(response.data)?;
                if reset {
                    self.reset();
                }
                self.merge(records)
            })
            .await
    }

    fn merge(&self, records: Vec<Attributes>) -> ModelResult<()> {
        let id_key = self.inner.schema.id_key.clone();
        let mut changed = false;
        let outcome = records.into_iter().try_for_each(|record| {
            let existing = record
                .get(&id_key)
                .filter(|id| !id.is_null())
                .and_then(|id| self.get_by_id(id.clone()));
            match existing {
                Some(entity) => entity.absorb(record, Settles::Keys(Vec::new())),
                None => {
                    changed |= self.insert(Item::Record(record), false).1;
                    Ok(())
                }
            }
        });
        if changed {
            self.resort();
        }
        outcome
    }

    /// Saves every new or dirty member, one at a time.
    ///
    /// Each member request gets its own token, canceled together with the
    /// set's token. Members resolve their own URLs, so `options.url` and
    /// `options.data` are ignored.
    pub async fn save(&self, client: &SyncClient, options: SyncOptions) -> ModelResult<()> {
        let token = self.begin_sync(&options);
        self.publish(EventKind::Request, Some(Operation::Save.as_str()));
        let outcome = self.save_members(client, &options, &token).await;
        let kind = if outcome.is_ok() {
            EventKind::Sync
        } else {
            EventKind::Error
        };
        self.publish(kind, Some(Operation::Save.as_str()));
        token.invalidate();
        outcome
    }

    async fn save_members(
        &self,
        client: &SyncClient,
        options: &SyncOptions,
        token: &CancelToken,
    ) -> ModelResult<()> {
        let pending: Vec<Entity> = self
            .items()
            .into_iter()
            .filter(|e| e.is_new() || e.is_dirty())
            .collect();
        debug!(set = %self.inner.client_id, count = pending.len(), "saving set members");
        for entity in pending {
            if token.is_canceled() {
                return Err(SyncError::Canceled.into());
            }
            let child = CancelToken::new();
            let relay = {
                let child = child.clone();
                token.on(EventKind::Cancel, move |_, _| child.cancel())
            };
            if token.is_canceled() {
                child.cancel();
            }
            let member_options = SyncOptions {
                url: None,
                data: None,
                token: Some(child),
                reset: false,
                ..options.clone()
            };
            let result = entity.save(client, member_options).await;
            token.unsubscribe(EventKind::Cancel, None, &relay);
            result?;
        }
        Ok(())
    }

    /// Cancels the in-flight sync operation, if any.
    pub fn cancel_sync(&self) {
        let token = self.inner.active.lock().take();
        if let Some(token) = token {
            if token.is_valid() {
                token.cancel();
            }
        }
    }
}

fn records_from(data: serde_json::Value) -> ModelResult<Vec<Attributes>> {
    match Value::from_json(data) {
        Value::List(items) => Ok(items.into_iter().filter_map(Value::into_map).collect()),
        Value::Map(record) => Ok(vec![record]),
        Value::Null => Ok(Vec::new()),
        other => Err(SyncError::Encoding(format!(
            "expected a list of records, got {}",
            other.type_name()
        ))
        .into()),
    }
}

impl Default for EntitySet {
    fn default() -> Self {
        Self::new(Arc::new(EntitySchema::default()))
    }
}

impl Observable for EntitySet {
    fn observer_hub(&self) -> &Mutex<ObserverHub<Self>> {
        &self.inner.observers
    }
}

impl fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("EntitySet")
            .field("client_id", &self.inner.client_id)
            .field("len", &state.items.len())
            .field("comparator", &state.comparator)
            .field("url", &state.url)
            .finish()
    }
}
