use crate::prelude::*;

use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

pub const GLOBAL_SCOPE_REFERENCE: i64 = 1001;
pub const LOCAL_SCOPE_BASE: i64 = 1002;
pub const VARIABLE_REFERENCE_BASE: i64 = 1100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A named variable rooted in a stack frame.
    #[serde(rename = "v")]
    Variable,
    /// A pointer dereferenced at a literal address; frame-independent.
    #[serde(rename = "p")]
    Pointer,
}

/// The descriptor behind a variables reference: enough information to
/// re-derive the native expression to evaluate. Structural equality defines
/// identity; two structurally equal descriptors share one handle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub kind: RefKind,
    pub frame_id: Option<String>,
    pub variable_name: Option<String>,
    pub variable_type: String,
    pub address: Option<String>,
    /// Accessor chain appended as the user expands: `.name` and `[index]`
    /// steps, each with its own leading separator.
    pub field_path: String,
}

impl VarRef {
    pub fn frame_variable(frame_id: i64, name: &str, typ: &str) -> VarRef {
        VarRef {
            kind: RefKind::Variable,
            frame_id: Some(frame_id.to_string()),
            variable_name: Some(name.to_owned()),
            variable_type: typ.to_owned(),
            address: None,
            field_path: String::new(),
        }
    }

    pub fn pointer(name: &str, typ: &str, address: &str) -> VarRef {
        VarRef {
            kind: RefKind::Pointer,
            frame_id: None,
            variable_name: Some(name.to_owned()),
            variable_type: typ.to_owned(),
            address: Some(address.to_owned()),
            field_path: String::new(),
        }
    }

    /// Descriptor of a field under `self`: same root, extended accessor
    /// chain. Numeric names index, everything else projects.
    pub fn field(&self, field_name: &str) -> VarRef {
        let step = if field_name.parse::<i64>().is_ok() {
            format!("[{}]", field_name)
        } else {
            format!(".{}", field_name)
        };
        VarRef {
            field_path: format!("{}{}", self.field_path, step),
            ..self.clone()
        }
    }

    fn canonical(&self) -> String {
        serde_json::to_string(self).expect("descriptor serialization")
    }
}

/// Bidirectional handle↔descriptor map. Handles are assigned monotonically
/// from 1100 and never reused or invalidated while the session lives; scope
/// handles occupy the reserved low range below.
pub struct HandleMap {
    inner: RwLock<Inner>,
}

struct Inner {
    by_handle: HashMap<i64, VarRef>,
    by_descriptor: HashMap<String, i64>,
    next: i64,
}

impl HandleMap {
    pub fn new() -> HandleMap {
        HandleMap {
            inner: RwLock::new(Inner {
                by_handle: HashMap::new(),
                by_descriptor: HashMap::new(),
                next: VARIABLE_REFERENCE_BASE,
            }),
        }
    }

    /// Idempotent: the same descriptor always yields the same handle.
    pub fn create(&self, descriptor: &VarRef) -> i64 {
        let key = descriptor.canonical();
        let mut inner = self.inner.write().unwrap();
        if let Some(handle) = inner.by_descriptor.get(&key) {
            return *handle;
        }
        let handle = inner.next;
        inner.next += 1;
        inner.by_descriptor.insert(key, handle);
        inner.by_handle.insert(handle, descriptor.clone());
        handle
    }

    pub fn parse(&self, handle: i64) -> Result<VarRef, Error> {
        let inner = self.inner.read().unwrap();
        match inner.by_handle.get(&handle) {
            Some(descriptor) => Ok(descriptor.clone()),
            None => Err(str_error(format!("reference not found: {}", handle))),
        }
    }

    /// Forget all descriptors; used on session teardown only.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.by_handle.clear();
        inner.by_descriptor.clear();
        inner.next = VARIABLE_REFERENCE_BASE;
    }
}

pub fn scopes_reference(frame_id: i64) -> i64 {
    LOCAL_SCOPE_BASE + frame_id
}

pub fn is_global_scope(reference: i64) -> bool {
    reference == GLOBAL_SCOPE_REFERENCE
}

pub fn is_local_scope(reference: i64) -> bool {
    reference > GLOBAL_SCOPE_REFERENCE && reference < VARIABLE_REFERENCE_BASE
}

pub fn frame_from_local_reference(reference: i64) -> i64 {
    reference - LOCAL_SCOPE_BASE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_parse_roundtrip() {
        let handles = HandleMap::new();
        let descriptor = VarRef::frame_variable(0, "localItem", "Item");
        let handle = handles.create(&descriptor);
        assert!(handle >= VARIABLE_REFERENCE_BASE);
        assert_eq!(handles.parse(handle).unwrap(), descriptor);
    }

    #[test]
    fn create_is_idempotent() {
        let handles = HandleMap::new();
        let a = handles.create(&VarRef::pointer("next", "struct Node *", "0x5555"));
        let b = handles.create(&VarRef::pointer("next", "struct Node *", "0x5555"));
        assert_eq!(a, b);

        let c = handles.create(&VarRef::pointer("next", "struct Node *", "0x6666"));
        assert_ne!(a, c);
    }

    #[test]
    fn handles_are_monotonic_and_never_reused() {
        let handles = HandleMap::new();
        let mut seen = Vec::new();
        for i in 0..100 {
            let handle = handles.create(&VarRef::frame_variable(i, "x", "int"));
            assert!(!seen.contains(&handle));
            if let Some(last) = seen.last() {
                assert!(handle > *last);
            }
            seen.push(handle);
        }
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let handles = HandleMap::new();
        assert!(handles.parse(4242).is_err());
    }

    #[test]
    fn field_path_extension() {
        let root = VarRef::frame_variable(0, "globalItem", "Item");
        let id = root.field("id");
        assert_eq!(id.field_path, ".id");

        let nested = id.field("3");
        assert_eq!(nested.field_path, ".id[3]");
        assert_eq!(nested.variable_name.as_deref(), Some("globalItem"));
        assert_eq!(nested.kind, RefKind::Variable);

        let indexed = root.field("0");
        assert_eq!(indexed.field_path, "[0]");
    }

    #[test]
    fn field_descriptors_get_distinct_handles() {
        let handles = HandleMap::new();
        let root = VarRef::frame_variable(0, "node", "struct Node");
        let root_handle = handles.create(&root);
        let next_handle = handles.create(&root.field("next"));
        assert_ne!(root_handle, next_handle);
        // Expanding the same field again must return the same handle.
        assert_eq!(next_handle, handles.create(&root.field("next")));
    }

    #[test]
    fn scope_reference_ranges() {
        assert!(is_global_scope(GLOBAL_SCOPE_REFERENCE));
        assert!(!is_global_scope(1002));
        assert_eq!(scopes_reference(0), 1002);
        assert_eq!(scopes_reference(5), 1007);
        assert!(is_local_scope(1002));
        assert!(is_local_scope(1099));
        assert!(!is_local_scope(1100));
        assert!(!is_local_scope(1001));
        assert_eq!(frame_from_local_reference(1002), 0);
        assert_eq!(frame_from_local_reference(1007), 5);
    }

    #[test]
    fn reset_clears_descriptors() {
        let handles = HandleMap::new();
        let handle = handles.create(&VarRef::frame_variable(0, "x", "int"));
        handles.reset();
        assert!(handles.parse(handle).is_err());
    }
}
