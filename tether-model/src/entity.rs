use crate::encoding::{decode, encode};
use crate::error::{ModelError, ModelResult};
use crate::scheduler::Debouncer;
use crate::schema::{Encoding, EntitySchema, FieldSpec, ValidationPolicy};
use crate::set::{EntitySet, SetInner};
use crate::validate::{format_error_message, ErrorKind};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tether_core::{
    Attributes, CancelToken, ClientId, Embedded, EntityRef, EventKind, Observable, ObserverHub,
    Value,
};
use tether_sync::{
    MetaSink, Method, Operation, ResponseMeta, SyncClient, SyncError, SyncOptions, SyncRequest,
    SyncResponse,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
struct EntityState {
    attributes: Attributes,
    /// Pre-edit values of attributes changed since the last sync.
    dirty: Attributes,
    errors: BTreeMap<String, ErrorKind>,
}

impl EntityState {
    fn is_new(&self, id_key: &str) -> bool {
        !self.attributes.contains_key(id_key)
    }

    fn is_deleted(&self, id_key: &str) -> bool {
        self.is_new(id_key) && self.dirty.contains_key(id_key)
    }
}

pub(crate) struct EntityInner {
    client_id: ClientId,
    schema: Arc<EntitySchema>,
    state: Mutex<EntityState>,
    observers: Mutex<ObserverHub<Entity>>,
    membership: Mutex<Weak<SetInner>>,
    active: Mutex<Option<CancelToken>>,
    validation: Debouncer,
}

/// Which dirty entries a successful sync settles, besides the keys the
/// response carried.
pub(crate) enum Settles {
    All,
    Keys(Vec<String>),
}

impl Settles {
    fn from_payload(data: Option<&serde_json::Value>) -> Self {
        match data {
            Some(serde_json::Value::Object(map)) => Settles::Keys(map.keys().cloned().collect()),
            _ => Settles::Keys(Vec::new()),
        }
    }
}

/// A keyed attribute bag with dirty tracking, validation and sync.
///
/// Events published:
/// - `change:<key>` after an attribute is updated
/// - `validate:true|false` after a validation pass
/// - `request:<op>`, then `sync:<op>` or `error:<op>` around fetch/save/destroy
///
/// `Entity` is a shared handle: clones refer to the same entity. Use
/// [`duplicate`](Self::duplicate) for an independent copy.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    /// An entity holding only the schema defaults.
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self::from_attributes(schema, Attributes::new())
    }

    /// An entity built from the schema defaults overlaid with `data`.
    ///
    /// `data` goes through the schema handler's `parse` hook and string
    /// values of encoded fields are decoded.
    pub fn from_attributes(schema: Arc<EntitySchema>, data: Attributes) -> Self {
        let mut attributes = schema.defaults.clone();
        attributes.extend(parse_inbound(&schema, data));
        Self::build(
            schema,
            EntityState {
                attributes,
                ..EntityState::default()
            },
            Weak::new(),
        )
    }

    /// Like [`from_attributes`](Self::from_attributes) for decoded JSON.
    /// Anything but an object contributes no attributes.
    pub fn from_json(schema: Arc<EntitySchema>, json: serde_json::Value) -> Self {
        let data = Value::from_json(json).into_map().unwrap_or_default();
        Self::from_attributes(schema, data)
    }

    fn build(schema: Arc<EntitySchema>, state: EntityState, membership: Weak<SetInner>) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                client_id: ClientId::new(),
                schema,
                state: Mutex::new(state),
                observers: Mutex::new(ObserverHub::new()),
                membership: Mutex::new(membership),
                active: Mutex::new(None),
                validation: Debouncer::default(),
            }),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.inner.schema
    }

    pub fn id_key(&self) -> &str {
        &self.inner.schema.id_key
    }

    /// True if both handles refer to the same entity.
    pub fn same(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// `"id"` is an alias for the schema's id attribute.
    fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        if key == "id" {
            &self.inner.schema.id_key
        } else {
            key
        }
    }

    // ── Reading ─────────────────────────────────────────────────

    pub fn id(&self) -> Option<Value> {
        self.get(self.id_key())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let key = self.resolve(key);
        self.inner.state.lock().attributes.get(key).cloned()
    }

    /// Follows a dotted path into nested maps and embedded entities.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            Some((first, rest)) => self.get(first)?.get_path(rest),
            None => self.get(path),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let key = self.resolve(key);
        self.inner.state.lock().attributes.contains_key(key)
    }

    pub fn attributes(&self) -> Attributes {
        self.inner.state.lock().attributes.clone()
    }

    /// Pre-edit values of the attributes changed since the last sync.
    pub fn dirty(&self) -> Attributes {
        self.inner.state.lock().dirty.clone()
    }

    pub fn is_dirty_key(&self, key: &str) -> bool {
        let key = self.resolve(key);
        self.inner.state.lock().dirty.contains_key(key)
    }

    pub fn errors(&self) -> BTreeMap<String, ErrorKind> {
        self.inner.state.lock().errors.clone()
    }

    pub fn error(&self, key: &str) -> Option<ErrorKind> {
        self.inner.state.lock().errors.get(key).copied()
    }

    /// True until the entity has an id.
    pub fn is_new(&self) -> bool {
        self.inner.state.lock().is_new(self.id_key())
    }

    /// True once the id has been removed from a persisted entity, normally
    /// by a successful [`destroy`](Self::destroy).
    pub fn is_deleted(&self) -> bool {
        self.inner.state.lock().is_deleted(self.id_key())
    }

    pub fn is_dirty(&self) -> bool {
        !self.inner.state.lock().dirty.is_empty()
    }

    /// True if the last validation pass recorded no errors.
    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().errors.is_empty()
    }

    pub fn field(&self, key: &str) -> Option<FieldSpec> {
        self.inner.schema.field(key).cloned()
    }

    fn encoding(&self, key: &str) -> Option<Encoding> {
        self.inner.schema.field(key).and_then(|f| f.encoding)
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Sets one attribute. Fails if the entity has been deleted.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.apply(key, value.into())
    }

    /// Sets several attributes, stopping at the first failure.
    pub fn set_all(&self, attributes: Attributes) -> ModelResult<()> {
        for (key, value) in attributes {
            self.apply(&key, value)?;
        }
        Ok(())
    }

    /// `Some` sets, `None` unsets.
    pub fn update(&self, key: &str, value: Option<Value>) -> ModelResult<()> {
        match value {
            Some(value) => self.apply(key, value),
            None => self.unset(key),
        }
    }

    fn apply(&self, key: &str, value: Value) -> ModelResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        let key = self.resolve(key).to_string();
        let id_key = self.id_key();
        {
            let mut state = self.inner.state.lock();
            if state.is_deleted(id_key) {
                drop(state);
                return Err(self.deleted_error());
            }
            if state.attributes.get(&key) == Some(&value) {
                return Ok(());
            }
            if !state.is_new(id_key) && !state.dirty.contains_key(&key) {
                if let Some(current) = state.attributes.get(&key).cloned() {
                    state.dirty.insert(key.clone(), current);
                }
            }
            let reverted = state.dirty.get(&key) == Some(&value);
            state.attributes.insert(key.clone(), value);
            if reverted {
                state.dirty.remove(&key);
            }
        }
        self.publish(EventKind::Change, Some(&key));
        self.schedule_validation();
        Ok(())
    }

    /// Removes an attribute. Removing the id of a persisted entity marks it
    /// deleted.
    pub fn unset(&self, key: &str) -> ModelResult<()> {
        let key = self.resolve(key).to_string();
        let id_key = self.id_key();
        {
            let mut state = self.inner.state.lock();
            if state.is_deleted(id_key) {
                drop(state);
                return Err(self.deleted_error());
            }
            let persisted = !state.is_new(id_key);
            let Some(previous) = state.attributes.remove(&key) else {
                return Ok(());
            };
            if persisted && !state.dirty.contains_key(&key) {
                state.dirty.insert(key.clone(), previous);
            }
        }
        self.publish(EventKind::Change, Some(&key));
        self.schedule_validation();
        Ok(())
    }

    /// Restores a dirty attribute to its pre-edit value.
    pub fn revert(&self, key: &str) -> ModelResult<()> {
        let key = self.resolve(key).to_string();
        let snapshot = self.inner.state.lock().dirty.get(&key).cloned();
        match snapshot {
            Some(value) => self.apply(&key, value),
            None => Ok(()),
        }
    }

    fn deleted_error(&self) -> ModelError {
        warn!(client_id = %self.inner.client_id, "attempted to modify entity after it was deleted");
        ModelError::MutationAfterDelete {
            client_id: self.inner.client_id,
        }
    }

    // ── Input encoding ──────────────────────────────────────────

    /// The attribute rendered as input text.
    pub fn encode(&self, key: &str) -> String {
        let value = self.get(key).unwrap_or_default();
        encode(&value, self.encoding(self.resolve(key)))
    }

    /// Parses input text per the field's encoding and sets the result.
    pub fn decode(&self, key: &str, text: &str) -> ModelResult<()> {
        let value = decode(text, self.encoding(self.resolve(key)));
        self.apply(key, value)
    }

    /// Display message for the attribute's current error, or `""`.
    pub fn message(&self, key: &str) -> String {
        match self.error(key) {
            Some(kind) => format_error_message(self.inner.schema.field(key), kind),
            None => String::new(),
        }
    }

    // ── Validation ──────────────────────────────────────────────

    /// Re-evaluates every field rule, replaces the recorded errors and
    /// publishes `validate:true|false`. Absent attributes are evaluated as
    /// null.
    pub fn validate(&self) -> bool {
        let schema = &self.inner.schema;
        let attributes = self.attributes();
        let mut errors = BTreeMap::new();
        for (key, field) in &schema.fields {
            let Some(rule) = field.effective_rule() else {
                continue;
            };
            let value = attributes.get(key).cloned().unwrap_or_default();
            if let Err(kind) = schema.evaluator.evaluate(&rule, &value) {
                errors.insert(key.clone(), kind);
            }
        }
        let valid = errors.is_empty();
        self.inner.state.lock().errors = errors;
        self.publish(EventKind::Validate, Some(if valid { "true" } else { "false" }));
        valid
    }

    /// True while a debounced validation is waiting to run.
    pub fn validation_pending(&self) -> bool {
        self.inner.validation.is_pending()
    }

    fn schedule_validation(&self) {
        match self.inner.schema.validation {
            ValidationPolicy::Disabled => {}
            ValidationPolicy::Immediate => {
                self.inner.validation.cancel();
                self.validate();
            }
            ValidationPolicy::Debounced(delay) => {
                let weak = Arc::downgrade(&self.inner);
                let scheduled = self.inner.validation.schedule(delay, move || {
                    if let Some(inner) = weak.upgrade() {
                        Entity { inner }.validate();
                    }
                });
                if !scheduled {
                    debug!(client_id = %self.inner.client_id, "no async runtime, validating immediately");
                    self.validate();
                }
            }
        }
    }

    // ── Copies and serialization ────────────────────────────────

    /// JSON form of the attributes. Dates of fields with a JSON encoding are
    /// written in that encoding.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .attributes()
            .iter()
            .map(|(key, value)| {
                let json = match (value, self.encoding(key)) {
                    (Value::Date(_), Some(encoding)) if !encoding.is_input_only() => {
                        serde_json::Value::String(encode(value, Some(encoding)))
                    }
                    _ => value.to_json(),
                };
                (key.clone(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }

    /// A copy of the attribute bag.
    pub fn to_object(&self) -> Attributes {
        self.attributes()
    }

    /// An independent copy with a fresh client id and no observers. Dirty
    /// state, errors and the set back-reference are copied.
    pub fn duplicate(&self) -> Entity {
        let state = self.inner.state.lock().clone();
        let membership = self.inner.membership.lock().clone();
        Self::build(self.inner.schema.clone(), state, membership)
    }

    /// A copy without the id, dirty state, errors or set back-reference.
    pub fn duplicate_as_new(&self) -> Entity {
        let mut attributes = self.attributes();
        attributes.remove(self.id_key());
        Self::build(
            self.inner.schema.clone(),
            EntityState {
                attributes,
                ..EntityState::default()
            },
            Weak::new(),
        )
    }

    /// Wraps the entity as an embeddable attribute value.
    pub fn to_value(&self) -> Value {
        Value::Entity(EntityRef::new(self.clone()))
    }

    // ── Set membership ──────────────────────────────────────────

    /// The set this entity belongs to, if it is still alive.
    pub fn collection(&self) -> Option<EntitySet> {
        self.inner
            .membership
            .lock()
            .upgrade()
            .map(EntitySet::from_inner)
    }

    pub(crate) fn set_membership(&self, set: Weak<SetInner>) {
        *self.inner.membership.lock() = set;
    }

    /// Clears the back-reference if it points at `set`.
    pub(crate) fn leave(&self, set: &Arc<SetInner>) {
        let mut membership = self.inner.membership.lock();
        if std::ptr::eq(membership.as_ptr(), Arc::as_ptr(set)) {
            *membership = Weak::new();
        }
    }

    // ── Sync ────────────────────────────────────────────────────

    /// The URL for `operation`: the options override, then the handler hook,
    /// then the owning set's URL (or the schema's `url_root`) followed by
    /// `/<id>` for persisted entities.
    pub fn url(&self, operation: Operation, options: &SyncOptions) -> Option<String> {
        if let Some(url) = &options.url {
            return Some(url.clone());
        }
        if let Some(handler) = &self.inner.schema.handler {
            if let Some(url) = handler.url(self, operation, options) {
                return Some(url);
            }
        }
        let base = self
            .collection()
            .and_then(|set| set.url())
            .or_else(|| self.inner.schema.url_root.clone())?;
        match self.id() {
            Some(id) => Some(format!("{}/{}", base.trim_end_matches('/'), id)),
            None => Some(base),
        }
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

    fn url_for(&self, operation: Operation, options: &SyncOptions) -> ModelResult<String> {
        self.url(operation, options)
            .ok_or(ModelError::Sync(SyncError::MissingUrl(operation)))
    }

    /// Loads the entity from the backend and merges the response. Like
    /// `save` and `destroy`, fails without sending once the entity is deleted.
    pub async fn fetch(&self, client: &SyncClient, options: SyncOptions) -> ModelResult<()> {
        if self.is_deleted() {
            return Err(self.deleted_error());
        }
        let url = self.url_for(Operation::Fetch, &options)?;
        let request = SyncRequest::from_options(Method::Get, url, &options);
        let settles = Settles::from_payload(request.data.as_ref());
        let token = self.begin_sync(&options);
        client
            .perform(self, Operation::Fetch, request, &token, |response| {
                self.reconcile(response, settles)
            })
            .await
    }

    /// Sends the entity to the backend: `POST` when new, `PUT` otherwise.
    ///
    /// The body is the whole entity, or only the dirty attributes for
    /// `PATCH`, unless the options carry a payload.
    pub async fn save(&self, client: &SyncClient, options: SyncOptions) -> ModelResult<()> {
        if self.is_deleted() {
            return Err(self.deleted_error());
        }
        let url = self.url_for(Operation::Save, &options)?;
        let default_method = if self.is_new() { Method::Post } else { Method::Put };
        let mut request = SyncRequest::from_options(default_method, url, &options);
        let settles = match &request.data {
            Some(data) => Settles::from_payload(Some(data)),
            None if request.method == Method::Patch => {
                let (payload, keys) = self.dirty_payload();
                request.data = Some(payload);
                Settles::Keys(keys)
            }
            None => {
                request.data = Some(self.to_json());
                Settles::All
            }
        };
        let token = self.begin_sync(&options);
        client
            .perform(self, Operation::Save, request, &token, |response| {
                self.reconcile(response, settles)
            })
            .await
    }

    /// Deletes the entity on the backend, then marks it deleted and removes
    /// it from its set.
    pub async fn destroy(&self, client: &SyncClient, options: SyncOptions) -> ModelResult<()> {
        if self.is_deleted() {
            return Err(self.deleted_error());
        }
        let url = self.url_for(Operation::Destroy, &options)?;
        let request = SyncRequest::from_options(Method::Delete, url, &options);
        let token = self.begin_sync(&options);
        client
            .perform(self, Operation::Destroy, request, &token, |_| {
                self.unset(self.id_key())?;
                if let Some(set) = self.collection() {
                    set.remove(self);
                }
                self.inner.validation.cancel();
                debug!(client_id = %self.inner.client_id, "entity destroyed");
                Ok(())
            })
            .await
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

    /// Current values of the dirty attributes; unset ones are sent as null.
    fn dirty_payload(&self) -> (serde_json::Value, Vec<String>) {
        let state = self.inner.state.lock();
        let keys: Vec<String> = state.dirty.keys().cloned().collect();
        let payload = keys
            .iter()
            .map(|key| {
                let value = state.attributes.get(key).map_or(serde_json::Value::Null, Value::to_json);
                (key.clone(), value)
            })
            .collect();
        (serde_json::Value::Object(payload), keys)
    }

    fn reconcile(&self, response: SyncResponse, settles: Settles) -> ModelResult<()> {
        let data = match Value::from_json(response.data) {
            Value::Map(map) => map,
            _ => Attributes::new(),
        };
        self.absorb(data, settles)
    }

    /// Merges synced data and settles the matching dirty entries.
    pub(crate) fn absorb(&self, data: Attributes, settles: Settles) -> ModelResult<()> {
        let data = parse_inbound(&self.inner.schema, data);
        let returned: Vec<String> = data.keys().cloned().collect();
        self.set_all(data)?;
        {
            let mut state = self.inner.state.lock();
            match settles {
                Settles::All => state.dirty.clear(),
                Settles::Keys(keys) => {
                    for key in keys {
                        state.dirty.remove(&key);
                    }
                }
            }
            for key in &returned {
                state.dirty.remove(key);
            }
        }
        self.inner.validation.cancel();
        Ok(())
    }
}

/// Runs the handler's parse hook and decodes string values of fields with a
/// JSON encoding.
fn parse_inbound(schema: &EntitySchema, data: Attributes) -> Attributes {
    let data = match &schema.handler {
        Some(handler) => handler.parse(data),
        None => data,
    };
    data.into_iter()
        .map(|(key, value)| {
            let encoding = schema.field(&key).and_then(|f| f.encoding);
            let value = match (value, encoding) {
                (Value::String(text), Some(encoding)) if !encoding.is_input_only() => {
                    decode(&text, Some(encoding))
                }
                (value, _) => value,
            };
            (key, value)
        })
        .collect()
}

impl Observable for Entity {
    fn observer_hub(&self) -> &Mutex<ObserverHub<Self>> {
        &self.inner.observers
    }
}

impl Embedded for Entity {
    fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    fn attribute(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    fn to_json(&self) -> serde_json::Value {
        Entity::to_json(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl MetaSink for Entity {
    fn apply_meta(&self, meta: &ResponseMeta) {
        let mut updates = Attributes::new();
        if let Some(links) = meta.links_json() {
            updates.insert("links".to_string(), Value::from_json(links));
        }
        for (key, value) in &meta.headers {
            updates.insert(key.clone(), Value::String(value.clone()));
        }
        if let Err(err) = self.set_all(updates) {
            warn!(client_id = %self.inner.client_id, "failed to store response metadata: {err}");
        }
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        entity.to_value()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Entity")
            .field("client_id", &self.inner.client_id)
            .field("attributes", &state.attributes)
            .field("dirty", &state.dirty)
            .field("errors", &state.errors)
            .finish()
    }
}
