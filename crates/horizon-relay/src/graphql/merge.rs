//! Merging of incrementally delivered payloads.

use serde_json::Value;

use horizon_relay_core::logging::targets;

use super::response::{GraphQLError, GraphQLResponse, PathSegment};

/// Folds `@defer`/`@stream` payloads into one accumulated result.
///
/// Each call to [`merge`](Self::merge) returns a complete snapshot: the
/// accumulated `data`, every error seen so far, and the `has_next` flag of
/// the latest payload.
///
/// # Example
///
/// ```ignore
/// let mut merger = IncrementalMerger::new();
/// while let Some(part) = parts.next_part().await? {
///     let payload = operation.decode(&part.into_body().bytes().await?)?;
///     if let Some(snapshot) = merger.merge(payload) {
///         emit(snapshot);
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct IncrementalMerger {
    data: Option<Value>,
    errors: Vec<GraphQLError>,
    has_next: bool,
}

impl IncrementalMerger {
    /// Create an empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last merged payload announced more payloads.
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// The accumulated data so far.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Merge a payload and return the resulting snapshot.
    ///
    /// Returns `None` when the payload added nothing (a bare
    /// `{"hasNext": false}` closing payload); the merger still records its
    /// `has_next` flag.
    pub fn merge(&mut self, payload: GraphQLResponse) -> Option<GraphQLResponse> {
        self.has_next = payload.has_next;
        let mut changed = !payload.errors.is_empty();
        self.errors.extend(payload.errors);

        if !payload.incremental.is_empty() {
            for item in payload.incremental {
                changed |= !item.errors.is_empty();
                self.errors.extend(item.errors);
                if let Some(data) = item.data {
                    self.merge_at(&item.path, data);
                    changed = true;
                }
                if let Some(items) = item.items {
                    self.append_at(&item.path, items);
                    changed = true;
                }
            }
        } else if let Some(data) = payload.data {
            match payload.path {
                Some(path) => self.merge_at(&path, data),
                None => match self.data.as_mut() {
                    Some(existing) => deep_merge(existing, data),
                    None => self.data = Some(data),
                },
            }
            changed = true;
        }

        if !changed {
            return None;
        }

        Some(GraphQLResponse {
            data: self.data.clone(),
            errors: self.errors.clone(),
            extensions: payload.extensions,
            has_next: self.has_next,
            ..GraphQLResponse::default()
        })
    }

    fn merge_at(&mut self, path: &[PathSegment], data: Value) {
        let root = self.data.get_or_insert_with(|| Value::Object(Default::default()));
        match value_at(root, path) {
            Some(target) => deep_merge(target, data),
            None => tracing::warn!(
                target: targets::MULTIPART,
                ?path,
                "Incremental payload path does not exist in accumulated data"
            ),
        }
    }

    fn append_at(&mut self, path: &[PathSegment], items: Vec<Value>) {
        // The path of a stream payload points at the index of its first item.
        let Some((PathSegment::Index(_), list_path)) = path.split_last() else {
            tracing::warn!(target: targets::MULTIPART, ?path, "Stream payload path has no index");
            return;
        };
        let root = self.data.get_or_insert_with(|| Value::Object(Default::default()));
        match value_at(root, list_path) {
            Some(Value::Array(list)) => list.extend(items),
            _ => tracing::warn!(
                target: targets::MULTIPART,
                ?path,
                "Stream payload path does not point at a list"
            ),
        }
    }
}

fn value_at<'a>(mut value: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    for segment in path {
        value = match segment {
            PathSegment::Field(name) => value.get_mut(name.as_str())?,
            PathSegment::Index(index) => value.get_mut(*index)?,
        };
    }
    Some(value)
}

fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}
