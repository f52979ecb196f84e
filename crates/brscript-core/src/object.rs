//! Host object handles.
//!
//! Script values reference host objects through [`ObjectRef`], a shared
//! handle over the [`HostObject`] trait. The host owns object lifetimes; the
//! script layer only attaches an instance to an object and queries its
//! reflective surface.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{CallError, Variant};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Object#{}>", self.0)
    }
}

/// Opaque script instance attached to a host object.
pub type AttachedInstance = Arc<dyn Any + Send + Sync>;

/// Reflective surface of a host object.
///
/// `get`, `set`, `call` and `has_method` only consult the native class; the
/// script runtime layers the attached instance on top.
pub trait HostObject: Send + Sync {
    fn object_id(&self) -> ObjectId;

    /// Most-derived native class name.
    fn class_name(&self) -> &str;

    fn get(&self, name: &str) -> Option<Variant>;

    fn set(&self, name: &str, value: Variant) -> bool;

    fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, CallError>;

    fn has_method(&self, method: &str) -> bool;

    /// The script instance currently attached, if any.
    fn script_instance(&self) -> Option<AttachedInstance>;

    /// Attach or detach a script instance.
    fn set_script_instance(&self, instance: Option<AttachedInstance>);
}

/// Shared handle to a host object.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn HostObject>);

impl ObjectRef {
    pub fn new(object: Arc<dyn HostObject>) -> Self {
        ObjectRef(object)
    }

    pub fn id(&self) -> ObjectId {
        self.0.object_id()
    }

    pub fn object(&self) -> &Arc<dyn HostObject> {
        &self.0
    }
}

impl std::ops::Deref for ObjectRef {
    type Target = dyn HostObject;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.class_name(), self.id())
    }
}
