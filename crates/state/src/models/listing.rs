//! Listing (crop) domain types.

use serde::{Deserialize, Serialize};

use cropcart_core::{CropId, Price, UserId};

/// A farmer's sellable produce entry (a `crops` collection document).
///
/// Owned exclusively by `farmer_id`; only that farmer may create, update,
/// or delete it. The backend does not enforce that `farmer_id` resolves to
/// an existing profile; consumers render a placeholder when it does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Unique listing ID.
    pub id: CropId,
    /// Display name, e.g. "Organic Tomatoes".
    pub name: String,
    /// Image URL (blob storage or external).
    pub image: String,
    /// Price per unit; never negative.
    pub price: Price,
    /// Free-text description.
    pub description: String,
    /// Category, e.g. "Vegetable".
    pub category: String,
    /// Stock on hand, in `unit`s.
    pub quantity: u32,
    /// Sale unit, e.g. "kg", "head".
    pub unit: String,
    /// Farm location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Farmer phone contact, denormalized onto the listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Owning farmer.
    pub farmer_id: UserId,
}

/// The farmer-supplied fields of a new listing.
///
/// The store assigns `id` and `farmer_id` when the listing is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub name: String,
    pub image: String,
    pub price: Price,
    pub description: String,
    pub category: String,
    pub quantity: u32,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl ListingDraft {
    /// Materialize the draft into a listing owned by `farmer_id`.
    #[must_use]
    pub fn into_listing(self, id: CropId, farmer_id: UserId) -> Listing {
        Listing {
            id,
            name: self.name,
            image: self.image,
            price: self.price,
            description: self.description,
            category: self.category,
            quantity: self.quantity,
            unit: self.unit,
            location: self.location,
            contact: self.contact,
            farmer_id,
        }
    }
}
