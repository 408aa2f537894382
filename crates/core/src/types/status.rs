//! Role and status enums for marketplace entities.

use serde::{Deserialize, Serialize};

/// The role of a marketplace identity.
///
/// Set at registration and immutable afterwards: profile edits never touch
/// the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publishes listings; fulfils orders containing them.
    Farmer,
    /// Browses the catalog; owns a cart/wishlist; places orders.
    Buyer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Farmer => write!(f, "farmer"),
            Self::Buyer => write!(f, "buyer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farmer" => Ok(Self::Farmer),
            "buyer" => Ok(Self::Buyer),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

/// Order fulfilment status.
///
/// Transitions are unrestricted at the data layer: any status may replace
/// any other. The usual flow is Pending, then Shipped, then Delivered, but
/// nothing enforces forward-only movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Placed, not yet handed to a courier.
    #[default]
    Pending,
    /// Handed to a courier.
    Shipped,
    /// Received by the buyer.
    Delivered,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Shipped => write!(f, "Shipped"),
            Self::Delivered => write!(f, "Delivered"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}
