//! Relation inclusion: include trees and correlation sets.
//!
//! Dotted include paths (`"comments.author"`) name relations to eager-load
//! with a query. Each top-level segment is resolved by the relation
//! registered on the record kind; the relation is handed the remaining
//! segments and resolves them itself. Fetched elements land in a
//! [`CorrelationSet`] that maps them back to their owners.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, AppResult};
use domain::{AuthContext, Record, INCLUDE_PATH_SEPARATOR};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::record::RecordDescriptor;

/// Element -> the value it is indexed under.
pub type IndexFn = Box<dyn Fn(&Record) -> Value + Send + Sync>;

/// Owner -> the value its related elements are indexed under.
pub type LookupFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Outcome of resolving one relation for a batch of owners.
pub struct RelationBatch {
    pub elements: Vec<Record>,
    pub index: IndexFn,
    pub lookup: LookupFn,
    /// Correlations the relation resolved for its own sub-paths
    pub nested: Option<CorrelationSet>,
}

impl RelationBatch {
    pub fn new(elements: Vec<Record>, index: IndexFn, lookup: LookupFn) -> Self {
        Self {
            elements,
            index,
            lookup,
            nested: None,
        }
    }

    pub fn with_nested(mut self, nested: CorrelationSet) -> Self {
        self.nested = Some(nested);
        self
    }
}

/// A relation between a record kind and the records it refers to.
#[async_trait]
pub trait Relation: Send + Sync {
    /// Fetch the related elements of `owners`.
    ///
    /// `sub_paths` are the include paths below this relation; resolving them
    /// is the relation's job.
    async fn resolve(
        &self,
        owners: &[Record],
        auth: &dyn AuthContext,
        sub_paths: &[String],
    ) -> AppResult<RelationBatch>;
}

// =============================================================================
// Include tree
// =============================================================================

/// Tree of include path segments.
///
/// `["a.b.c", "c.d"]` gives `{a: {b: {c: {}}}, c: {d: {}}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeTree {
    children: Vec<(String, IncludeTree)>,
}

impl IncludeTree {
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut root = IncludeTree::default();
        for path in paths {
            let path = path.as_ref();
            if !path.is_empty() {
                root.insert(path);
            }
        }
        root
    }

    fn insert(&mut self, path: &str) {
        let (head, rest) = match path.split_once(INCLUDE_PATH_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let position = match self.children.iter().position(|(key, _)| key == head) {
            Some(position) => position,
            None => {
                self.children.push((head.to_string(), IncludeTree::default()));
                self.children.len() - 1
            }
        };

        if let Some(rest) = rest.filter(|rest| !rest.is_empty()) {
            self.children[position].1.insert(rest);
        }
    }

    /// Top-level segments, in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&IncludeTree> {
        self.children
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, tree)| tree)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Paths below `key`: every path equal to `key` or starting with `key.`,
/// with that prefix removed. The bare `key` contributes nothing.
pub fn sub_paths<S: AsRef<str>>(paths: &[S], key: &str) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| {
            let rest = path.as_ref().strip_prefix(key)?;
            if rest.is_empty() {
                return Some(String::new());
            }
            rest.strip_prefix(INCLUDE_PATH_SEPARATOR).map(str::to_string)
        })
        .filter(|rest| !rest.is_empty())
        .collect()
}

// =============================================================================
// Correlation set
// =============================================================================

/// (record kind, relation name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey {
    pub record: String,
    pub relation: String,
}

impl CorrelationKey {
    pub fn new(record: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            relation: relation.into(),
        }
    }
}

struct Correlation {
    lookup: LookupFn,
    elements: HashMap<String, Vec<Record>>,
}

/// Related elements, grouped by (record kind, relation) and indexed by
/// correlation value.
///
/// Values are compared by their string form, so `42` and `"42"` correlate.
#[derive(Default)]
pub struct CorrelationSet {
    correlations: HashMap<CorrelationKey, Correlation>,
}

impl fmt::Debug for CorrelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        let mut keys: Vec<&CorrelationKey> = self.correlations.keys().collect();
        keys.sort();
        for key in keys {
            let count: usize = self.correlations[key].elements.values().map(Vec::len).sum();
            map.entry(&format!("{}.{}", key.record, key.relation), &count);
        }
        map.finish()
    }
}

/// Serialized as `{"<record>.<relation>": {"<correlation value>": [elements]}}`.
impl Serialize for CorrelationSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut keys: Vec<&CorrelationKey> = self.correlations.keys().collect();
        keys.sort();

        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            let elements: BTreeMap<&String, &Vec<Record>> =
                self.correlations[key].elements.iter().collect();
            map.serialize_entry(&format!("{}.{}", key.record, key.relation), &elements)?;
        }
        map.end()
    }
}

fn correlation_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl CorrelationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register how owners find their elements. The first registration for
    /// a key wins.
    pub fn set_lookup(&mut self, key: CorrelationKey, lookup: LookupFn) {
        self.correlations.entry(key).or_insert_with(|| Correlation {
            lookup,
            elements: HashMap::new(),
        });
    }

    /// Index an element. Elements of a key without a lookup are dropped.
    pub fn add(&mut self, key: &CorrelationKey, index: &Value, element: Record) {
        if let Some(correlation) = self.correlations.get_mut(key) {
            correlation
                .elements
                .entry(correlation_value(index))
                .or_default()
                .push(element);
        }
    }

    /// Elements related to `owner`, in insertion order.
    pub fn lookup(&self, record: &str, relation: &str, owner: &Record) -> &[Record] {
        let key = CorrelationKey::new(record, relation);
        self.correlations
            .get(&key)
            .and_then(|correlation| {
                let value = (correlation.lookup)(owner);
                correlation.elements.get(&correlation_value(&value))
            })
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, record: &str, relation: &str) -> bool {
        self.correlations
            .contains_key(&CorrelationKey::new(record, relation))
    }

    pub fn keys(&self) -> impl Iterator<Item = &CorrelationKey> {
        self.correlations.keys()
    }

    pub fn len(&self) -> usize {
        self.correlations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correlations.is_empty()
    }

    /// Number of elements stored under a key.
    pub fn element_count(&self, record: &str, relation: &str) -> usize {
        self.correlations
            .get(&CorrelationKey::new(record, relation))
            .map(|correlation| correlation.elements.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Fold another set into this one.
    pub fn merge(&mut self, other: CorrelationSet) {
        for (key, incoming) in other.correlations {
            match self.correlations.get_mut(&key) {
                Some(existing) => {
                    for (value, mut elements) in incoming.elements {
                        existing.elements.entry(value).or_default().append(&mut elements);
                    }
                }
                None => {
                    self.correlations.insert(key, incoming);
                }
            }
        }
    }

    /// Embed the related elements of `kind`'s relations into each record,
    /// under the relation name, as arrays.
    pub fn attach(&self, kind: &str, records: &mut [Record]) {
        let relations: Vec<&str> = self
            .correlations
            .keys()
            .filter(|key| key.record == kind)
            .map(|key| key.relation.as_str())
            .collect();

        for record in records.iter_mut() {
            for relation in &relations {
                let related = Value::Array(
                    self.lookup(kind, relation, record)
                        .iter()
                        .cloned()
                        .map(Value::Object)
                        .collect(),
                );
                record.insert(relation.to_string(), related);
            }
        }
    }
}

/// Fail on the first top-level include key that `kind` has no relation for.
pub fn check_includes<S: AsRef<str>>(paths: &[S], kind: &RecordDescriptor) -> AppResult<()> {
    let tree = IncludeTree::from_paths(paths);
    let result = match tree.keys().find(|key| kind.relation(key).is_none()) {
        Some(key) => Err(AppError::unknown_relation(kind.name(), key)),
        None => Ok(()),
    };
    result
}

/// Resolve include paths for a batch of owners of one record kind.
pub async fn resolve_includes(
    paths: &[String],
    owners: &[Record],
    kind: &RecordDescriptor,
    auth: &dyn AuthContext,
) -> AppResult<CorrelationSet> {
    let mut set = CorrelationSet::new();
    let tree = IncludeTree::from_paths(paths);

    for key in tree.keys() {
        let sub = sub_paths(paths, key);

        let relation = kind
            .relation(key)
            .ok_or_else(|| AppError::unknown_relation(kind.name(), key))?;

        tracing::debug!(record = kind.name(), relation = key, sub_paths = ?sub, "resolving relation");

        let batch = relation.resolve(owners, auth, &sub).await?;

        let correlation_key = CorrelationKey::new(kind.name(), key);
        set.set_lookup(correlation_key.clone(), batch.lookup);

        for element in batch.elements {
            let index = (batch.index)(&element);
            set.add(&correlation_key, &index, element);
        }

        if let Some(nested) = batch.nested {
            set.merge(nested);
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::AllAccess;
    use serde_json::json;
    use std::sync::Mutex;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    /// Returns fixed elements and remembers the sub-paths it was given.
    struct Fixed {
        elements: Vec<Record>,
        owner_field: &'static str,
        seen: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait]
    impl Relation for Fixed {
        async fn resolve(
            &self,
            _owners: &[Record],
            _auth: &dyn AuthContext,
            sub_paths: &[String],
        ) -> AppResult<RelationBatch> {
            self.seen.lock().unwrap().push(sub_paths.to_vec());
            let owner_field = self.owner_field;
            Ok(RelationBatch::new(
                self.elements.clone(),
                Box::new(|element: &Record| element["owner"].clone()),
                Arc::new(move |owner: &Record| owner[owner_field].clone()),
            ))
        }
    }

    #[test]
    fn builds_tree_from_dotted_paths() {
        let tree = IncludeTree::from_paths(&["a.b.c", "c.d", "a.e", ""]);

        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        let a = tree.get("a").unwrap();
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["b", "e"]);
        assert!(a.get("b").unwrap().get("c").unwrap().is_leaf());
        assert!(tree.get("c").unwrap().get("d").unwrap().is_leaf());
    }

    #[test]
    fn sub_paths_strip_the_prefix() {
        let paths = ["author", "comments.author", "comments", "commentsx.y", "comments.a.b"];

        assert_eq!(sub_paths(&paths, "comments"), vec!["author", "a.b"]);
        assert!(sub_paths(&paths, "author").is_empty());
    }

    #[tokio::test]
    async fn resolves_top_level_relations_and_passes_sub_paths() {
        let author_seen = Arc::new(Mutex::new(Vec::new()));
        let comments_seen = Arc::new(Mutex::new(Vec::new()));

        let kind = RecordDescriptor::new("Record")
            .with_relation(
                "author",
                Arc::new(Fixed {
                    elements: vec![record(json!({"id": 7, "owner": 7}))],
                    owner_field: "user_id",
                    seen: author_seen.clone(),
                }),
            )
            .with_relation(
                "comments",
                Arc::new(Fixed {
                    elements: vec![
                        record(json!({"id": 1, "owner": 1})),
                        record(json!({"id": 2, "owner": 1})),
                    ],
                    owner_field: "id",
                    seen: comments_seen.clone(),
                }),
            )
            .build();

        let owners = vec![record(json!({"id": 1, "user_id": 7}))];
        let paths = vec!["author".to_string(), "comments.author".to_string()];

        let set = resolve_includes(&paths, &owners, &kind, &AllAccess).await.unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains("Record", "author"));
        assert!(set.contains("Record", "comments"));
        assert_eq!(*comments_seen.lock().unwrap(), vec![vec!["author".to_string()]]);
        assert_eq!(*author_seen.lock().unwrap(), vec![Vec::<String>::new()]);

        let comments = set.lookup("Record", "comments", &owners[0]);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0]["id"], json!(1));
        assert_eq!(set.lookup("Record", "author", &owners[0])[0]["id"], json!(7));
    }

    #[tokio::test]
    async fn unknown_relation_aborts() {
        let kind = RecordDescriptor::new("Record").build();
        let err = resolve_includes(&["tags".to_string()], &[], &kind, &AllAccess)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::UnknownRelation { ref record, ref relation }
                if record == "Record" && relation == "tags"
        ));
    }

    #[test]
    fn check_includes_looks_at_top_level_keys() {
        let kind = RecordDescriptor::new("Record")
            .with_relation(
                "author",
                Arc::new(Fixed {
                    elements: Vec::new(),
                    owner_field: "author_id",
                    seen: Arc::default(),
                }),
            )
            .build();

        assert!(check_includes(&["author", "author.company"], &kind).is_ok());
        assert!(check_includes::<&str>(&[], &kind).is_ok());

        let err = check_includes(&["author", "editor.company"], &kind).unwrap_err();
        assert!(matches!(err, AppError::UnknownRelation { ref relation, .. } if relation == "editor"));
    }

    #[test]
    fn string_and_integer_values_correlate() {
        let mut set = CorrelationSet::new();
        let key = CorrelationKey::new("Post", "author");
        set.set_lookup(key.clone(), Arc::new(|owner: &Record| owner["user_id"].clone()));
        set.add(&key, &json!("7"), record(json!({"id": 7})));

        let owner = record(json!({"user_id": 7}));
        assert_eq!(set.lookup("Post", "author", &owner).len(), 1);
        assert!(set.lookup("Post", "missing", &owner).is_empty());
    }

    #[test]
    fn merge_and_attach() {
        let mut set = CorrelationSet::new();
        let key = CorrelationKey::new("Post", "comments");
        set.set_lookup(key.clone(), Arc::new(|owner: &Record| owner["id"].clone()));
        set.add(&key, &json!(1), record(json!({"id": 10})));

        let mut other = CorrelationSet::new();
        other.set_lookup(key.clone(), Arc::new(|owner: &Record| owner["id"].clone()));
        other.add(&key, &json!(1), record(json!({"id": 11})));
        set.merge(other);

        assert_eq!(set.element_count("Post", "comments"), 2);

        let mut posts = vec![record(json!({"id": 1})), record(json!({"id": 2}))];
        set.attach("Post", &mut posts);

        assert_eq!(posts[0]["comments"], json!([{"id": 10}, {"id": 11}]));
        assert_eq!(posts[1]["comments"], json!([]));
    }
}
