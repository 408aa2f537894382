//! Cart entry type.

use serde::{Deserialize, Serialize};

use cropcart_core::Price;

use super::Listing;

/// A listing snapshot plus a purchase quantity.
///
/// The snapshot is deliberate: once in the cart (and later in an order),
/// the line keeps the price and details it was added with, regardless of
/// subsequent catalog edits. At most one entry per listing id exists in a
/// cart; a quantity of zero means removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// The listing as it looked when added.
    pub listing: Listing,
    /// Units purchased; always >= 1 while the entry exists.
    pub quantity: u32,
}

impl CartItem {
    /// Create a new entry.
    #[must_use]
    pub const fn new(listing: Listing, quantity: u32) -> Self {
        Self { listing, quantity }
    }

    /// The extended amount for this line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.listing.price.line_total(self.quantity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cropcart_core::{CropId, UserId};

    fn listing(id: &str, price: &str) -> Listing {
        Listing {
            id: CropId::new(id),
            name: "Organic Tomatoes".to_string(),
            image: "https://img.example/t.png".to_string(),
            price: price.parse().unwrap(),
            description: String::new(),
            category: "Vegetable".to_string(),
            quantity: 50,
            unit: "kg".to_string(),
            location: None,
            contact: None,
            farmer_id: UserId::new("farmer-1"),
        }
    }

    #[test]
    fn test_line_total() {
        let item = CartItem::new(listing("crop-1", "2.99"), 2);
        assert_eq!(item.line_total(), "5.98".parse().unwrap());
    }

    #[test]
    fn test_snapshot_is_independent_of_source() {
        let mut source = listing("crop-1", "2.99");
        let item = CartItem::new(source.clone(), 1);
        source.price = "9.99".parse().unwrap();
        assert_eq!(item.listing.price, "2.99".parse().unwrap());
    }
}
