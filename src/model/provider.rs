//! Resource-model boundary
//!
//! The evaluator knows nothing about FHIR structure definitions. Anything
//! that can project named children and report a type name can be navigated
//! by FHIRPath through this trait.

use super::value::{Collection, FhirPathValue};
use std::fmt;
use std::sync::Arc;

/// A typed node of a resource tree
pub trait ElementNode: Send + Sync + fmt::Debug {
    /// Model type name of the node (`Patient`, `HumanName`, `Quantity`), if known
    fn type_name(&self) -> Option<&str>;

    /// Whether the node is a resource root rather than a nested element
    fn is_resource(&self) -> bool {
        false
    }

    /// Values of the child named `name`, in document order
    fn child(&self, name: &str) -> Collection;

    /// All direct child values, in document order
    fn children(&self) -> Collection;

    /// JSON rendering, used for output and structural equality
    fn to_json(&self) -> serde_json::Value;
}

/// Shared handle to an [`ElementNode`]
#[derive(Clone)]
pub struct Element(Arc<dyn ElementNode>);

impl Element {
    /// Wrap a node
    pub fn new(node: impl ElementNode + 'static) -> Self {
        Self(Arc::new(node))
    }

    /// Wrap an already shared node
    pub fn from_arc(node: Arc<dyn ElementNode>) -> Self {
        Self(node)
    }

    /// Model type name, if the node reports one
    pub fn type_name(&self) -> Option<&str> {
        self.0.type_name()
    }

    /// Whether this is a resource root
    pub fn is_resource(&self) -> bool {
        self.0.is_resource()
    }

    /// Project the child named `name`
    pub fn child(&self, name: &str) -> Collection {
        self.0.child(name)
    }

    /// All direct children
    pub fn children(&self) -> Collection {
        self.0.children()
    }

    /// JSON rendering of the node
    pub fn to_json(&self) -> serde_json::Value {
        self.0.to_json()
    }

    /// Read this element as a FHIR `Quantity` if it has that shape
    pub(crate) fn quantity_parts(&self) -> Option<(FhirPathValue, Option<String>)> {
        if self.type_name() != Some("Quantity") {
            return None;
        }
        let value = self.child("value").into_iter().next()?;
        let unit = self
            .child("code")
            .into_iter()
            .chain(self.child("unit"))
            .find_map(|v| match v {
                FhirPathValue::String(s) => Some(s),
                _ => None,
            });
        Some((value, unit))
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.to_json() == other.to_json()
    }
}
