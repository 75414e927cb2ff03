use serde::{Deserialize, Serialize};

use crate::identity::{ProductId, VendorId};

/// Vendor descriptor attached to each cart item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorInfo {
    pub id: VendorId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// One line in the shopping cart.
///
/// Prices are in the smallest currency unit. `quantity` is at least 1
/// while the item is present; an item driven to 0 is removed from the
/// cart, never stored at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub product_id: ProductId,
    pub name: String,
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub vendor: VendorInfo,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
}

/// Cart mutations. Applied through [`CartState::apply`], the single
/// reducer over the session cart.
#[derive(Debug, Clone)]
pub enum CartAction {
    /// Insert the item with quantity 1, or increment the existing line
    /// with the same id. The payload's own quantity is ignored.
    Add(CartItem),
    /// Delete the matching line. Unknown ids are a no-op.
    Remove { id: String },
    /// Set the line's quantity; zero or negative removes the line.
    /// Unknown ids are a no-op.
    UpdateQuantity { id: String, quantity: i64 },
    /// Empty the cart.
    Clear,
    /// Flip the cart panel visibility. Items are untouched.
    Toggle,
    /// Force the cart panel closed. Items are untouched.
    Close,
}

/// The session shopping cart with derived aggregates.
///
/// `total_items` and `total_price` are recomputed from the item list on
/// every mutation rather than adjusted incrementally, so they can never
/// drift from the lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    pub items: Vec<CartItem>,
    pub total_items: u32,
    pub total_price: u64,
    pub is_open: bool,
}

impl CartState {
    /// Apply one action. Never fails; bad identifiers are ignored.
    pub fn apply(&mut self, action: CartAction) {
        match action {
            CartAction::Add(mut item) => {
                match self.items.iter_mut().find(|i| i.id == item.id) {
                    Some(existing) => existing.quantity += 1,
                    None => {
                        item.quantity = 1;
                        self.items.push(item);
                    }
                }
                self.recompute();
            }
            CartAction::Remove { id } => {
                self.items.retain(|i| i.id != id);
                self.recompute();
            }
            CartAction::UpdateQuantity { id, quantity } => {
                if quantity <= 0 {
                    self.items.retain(|i| i.id != id);
                } else if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
                    item.quantity = quantity as u32;
                }
                self.recompute();
            }
            CartAction::Clear => {
                self.items.clear();
                self.recompute();
            }
            CartAction::Toggle => self.is_open = !self.is_open,
            CartAction::Close => self.is_open = false,
        }
    }

    fn recompute(&mut self) {
        self.total_items = self.items.iter().map(|i| i.quantity).sum();
        self.total_price = self
            .items
            .iter()
            .map(|i| i.price * i.quantity as u64)
            .sum();
    }

    /// Quantity of the given line, 0 if absent.
    pub fn item_quantity(&self, id: &str) -> u32 {
        self.items
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.quantity)
            .unwrap_or(0)
    }

    /// All lines belonging to the given vendor, in insertion order.
    pub fn vendor_items(&self, vendor: &VendorId) -> Vec<&CartItem> {
        self.items.iter().filter(|i| i.vendor.id == *vendor).collect()
    }

    /// Summed price of the given vendor's lines.
    pub fn vendor_subtotal(&self, vendor: &VendorId) -> u64 {
        self.items
            .iter()
            .filter(|i| i.vendor.id == *vendor)
            .map(|i| i.price * i.quantity as u64)
            .sum()
    }
}
