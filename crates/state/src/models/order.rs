//! Order domain types.

use serde::{Deserialize, Serialize};

use cropcart_core::{OrderId, OrderStatus, Price, Timestamp, UserId};

use super::{CartItem, Identity};

/// The buyer subset denormalized onto an order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBuyer {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl From<&Identity> for OrderBuyer {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            contact: identity.contact.clone(),
        }
    }
}

/// A placed order (an `orders` collection document).
///
/// Created once, atomically, from a non-empty cart; never deleted. Readable
/// by its buyer and by every farmer in `farmer_ids`; mutable (status only)
/// by those farmers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Backend write-time, normalized to the canonical instant.
    pub date: Timestamp,
    /// Buyer snapshot at checkout time.
    pub buyer: OrderBuyer,
    /// Cart snapshot at checkout time.
    pub items: Vec<CartItem>,
    /// `Σ price × quantity` over `items`, fixed at checkout.
    pub total: Price,
    /// Fulfilment status.
    pub status: OrderStatus,
    /// Deduplicated owners of the ordered listings; the secondary index
    /// for farmer-scoped queries.
    pub farmer_ids: Vec<UserId>,
}

/// An order as submitted for creation, before the backend assigns the
/// authoritative write-time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub id: OrderId,
    pub buyer: OrderBuyer,
    pub items: Vec<CartItem>,
    pub total: Price,
    pub status: OrderStatus,
    pub farmer_ids: Vec<UserId>,
}

impl OrderDraft {
    /// The stored order produced by stamping this draft with the backend's
    /// write-time.
    #[must_use]
    pub fn into_order(self, date: Timestamp) -> Order {
        Order {
            id: self.id,
            date,
            buyer: self.buyer,
            items: self.items,
            total: self.total,
            status: self.status,
            farmer_ids: self.farmer_ids,
        }
    }
}

/// Deduplicate the owning farmers of a set of cart lines, preserving
/// first-seen order.
#[must_use]
pub fn farmer_ids_of(items: &[CartItem]) -> Vec<UserId> {
    let mut ids = Vec::new();
    for item in items {
        if !ids.contains(&item.listing.farmer_id) {
            ids.push(item.listing.farmer_id.clone());
        }
    }
    ids
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cropcart_core::CropId;

    use crate::models::Listing;

    fn item(crop: &str, farmer: &str, qty: u32) -> CartItem {
        CartItem::new(
            Listing {
                id: CropId::new(crop),
                name: crop.to_string(),
                image: String::new(),
                price: "1.00".parse().unwrap(),
                description: String::new(),
                category: "Vegetable".to_string(),
                quantity: 10,
                unit: "kg".to_string(),
                location: None,
                contact: None,
                farmer_id: UserId::new(farmer),
            },
            qty,
        )
    }

    #[test]
    fn test_farmer_ids_deduplicated_in_first_seen_order() {
        let items = vec![
            item("crop-1", "farmer-1", 1),
            item("crop-2", "farmer-2", 1),
            item("crop-3", "farmer-1", 2),
        ];
        assert_eq!(
            farmer_ids_of(&items),
            vec![UserId::new("farmer-1"), UserId::new("farmer-2")]
        );
    }

    #[test]
    fn test_order_deserializes_with_polymorphic_date() {
        let doc = serde_json::json!({
            "id": "order-1",
            "date": {"seconds": 1714566600, "nanos": 0},
            "buyer": {"id": "buyer-1", "name": "Jane Smith"},
            "items": [],
            "total": "0",
            "status": "Pending",
            "farmerIds": ["farmer-1"]
        });

        let order: Order = serde_json::from_value(doc).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.date.datetime().timestamp(), 1_714_566_600);
        assert_eq!(order.farmer_ids, vec![UserId::new("farmer-1")]);
    }
}
