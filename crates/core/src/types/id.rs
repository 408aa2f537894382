//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. IDs are document
//! keys in the hosted backend, so the underlying representation is a string
//! (e.g. `"crop-1"`, `"farmer-1"`).

use uuid::Uuid;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use cropcart_core::define_id;
/// define_id!(UserId);
/// define_id!(OrderId);
///
/// let user_id = UserId::new("farmer-1");
/// let order_id = OrderId::new("order-1");
///
/// // These are different types, so this won't compile:
/// // let _: UserId = order_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from a string value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(UserId);
define_id!(CropId);
define_id!(OrderId);

impl CropId {
    /// Generate a fresh listing ID for a newly created crop document.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(format!("crop-{}", Uuid::new_v4()))
    }
}

impl OrderId {
    /// Generate a fresh order ID for a newly created order document.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(format!("order-{}", Uuid::new_v4()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_as_str() {
        let id = CropId::new("crop-1");
        assert_eq!(id.as_str(), "crop-1");
        assert_eq!(format!("{id}"), "crop-1");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = UserId::new("farmer-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"farmer-1\"");

        let parsed: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = CropId::generate();
        let b = CropId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("crop-"));
    }

    #[test]
    fn test_order_id_prefix() {
        let id = OrderId::generate();
        assert!(id.as_str().starts_with("order-"));
    }
}
