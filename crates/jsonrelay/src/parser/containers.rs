//! The stack of open containers.
//!
//! The stack always tracks container kinds. When value building is enabled it
//! also keeps the partially materialized object or array for every open
//! level, so a container can be reported in full when it closes.

use crate::{
    path::PathItem,
    value::{Array, Map, Value},
};

/// Kind of an open container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContainerKind {
    Object,
    Array,
}

#[derive(Debug)]
pub(crate) struct ContainerStack {
    kinds: Vec<ContainerKind>,
    values: Vec<Value>,
    build: bool,
    root: Option<Value>,
}

impl ContainerStack {
    pub fn new(build: bool) -> Self {
        Self {
            kinds: Vec::new(),
            values: Vec::new(),
            build,
            root: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.kinds.len()
    }

    pub fn top(&self) -> Option<ContainerKind> {
        self.kinds.last().copied()
    }

    pub fn open(&mut self, kind: ContainerKind) {
        self.kinds.push(kind);
        if self.build {
            self.values.push(match kind {
                ContainerKind::Object => Value::Object(Map::new()),
                ContainerKind::Array => Value::Array(Array::new()),
            });
        }
    }

    /// Stores a finished value. `at` is the last component of the value's
    /// path; it is `None` only for the root.
    pub fn insert(&mut self, at: Option<&PathItem>, value: Value) {
        let Some(parent) = self.values.last_mut() else {
            if self.kinds.is_empty() {
                self.root = Some(value);
            }
            return;
        };
        match (parent, at) {
            (Value::Object(map), Some(PathItem::Key(k))) => {
                map.insert(k.to_string(), value);
            }
            (Value::Array(items), Some(PathItem::Index(_))) => items.push(value),
            _ => {
                tracing::debug!(event = "container_insert_mismatch");
            }
        }
    }

    /// Pops the innermost container, returning its materialized value when
    /// building is enabled.
    pub fn close(&mut self) -> Option<Value> {
        self.kinds.pop()?;
        if self.build { self.values.pop() } else { None }
    }

    pub fn root(&self) -> Option<&Value> {
        self.root.as_ref()
    }
}
