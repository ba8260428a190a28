use crate::EntityKind;
use serde::{de::DeserializeOwned, Serialize};

/// A document-backed entity: identity plus an optional sibling position.
///
/// `id` is `None` until the record is first persisted; the store assigns it.
/// Entities that are not ordered among siblings (projects, families, users)
/// report `order() == None` and ignore `set_order`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn order(&self) -> Option<i64>;
    fn set_order(&mut self, order: i64);
    /// Human-readable name or title, used in log lines and error messages.
    fn label(&self) -> &str;
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr, $label:ident, order) => {
        impl $crate::record::Record for $ty {
            const KIND: $crate::EntityKind = $kind;

            fn id(&self) -> Option<&str> {
                self.id.as_deref()
            }

            fn set_id(&mut self, id: String) {
                self.id = Some(id);
            }

            fn order(&self) -> Option<i64> {
                Some(self.order)
            }

            fn set_order(&mut self, order: i64) {
                self.order = order;
            }

            fn label(&self) -> &str {
                &self.$label
            }
        }
    };
    ($ty:ty, $kind:expr, $label:ident) => {
        impl $crate::record::Record for $ty {
            const KIND: $crate::EntityKind = $kind;

            fn id(&self) -> Option<&str> {
                self.id.as_deref()
            }

            fn set_id(&mut self, id: String) {
                self.id = Some(id);
            }

            fn order(&self) -> Option<i64> {
                None
            }

            fn set_order(&mut self, _order: i64) {}

            fn label(&self) -> &str {
                &self.$label
            }
        }
    };
}

pub(crate) use impl_record;
