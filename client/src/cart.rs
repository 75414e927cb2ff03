use tokio::sync::watch;

use scrim_common::cart::{CartAction, CartItem, CartState};
use scrim_common::identity::VendorId;

/// Subscribable container for the session cart.
///
/// One store per session, injected where it is needed — no ambient
/// singleton. All mutations funnel through the [`CartState::apply`]
/// reducer; subscribers receive a fresh snapshot after every dispatch.
pub struct CartStore {
    state: watch::Sender<CartState>,
}

impl CartStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CartState::default());
        CartStore { state }
    }

    /// Apply one cart action and notify subscribers.
    pub fn dispatch(&self, action: CartAction) {
        self.state.send_modify(|cart| cart.apply(action));
    }

    pub fn snapshot(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Watch the cart. Receivers see a snapshot after every dispatch.
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    pub fn add_item(&self, item: CartItem) {
        self.dispatch(CartAction::Add(item));
    }

    pub fn remove_item(&self, id: &str) {
        self.dispatch(CartAction::Remove { id: id.to_string() });
    }

    pub fn update_quantity(&self, id: &str, quantity: i64) {
        self.dispatch(CartAction::UpdateQuantity {
            id: id.to_string(),
            quantity,
        });
    }

    pub fn clear(&self) {
        self.dispatch(CartAction::Clear);
    }

    pub fn toggle(&self) {
        self.dispatch(CartAction::Toggle);
    }

    pub fn close(&self) {
        self.dispatch(CartAction::Close);
    }

    pub fn item_quantity(&self, id: &str) -> u32 {
        self.state.borrow().item_quantity(id)
    }

    pub fn vendor_items(&self, vendor: &VendorId) -> Vec<CartItem> {
        self.state
            .borrow()
            .vendor_items(vendor)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn vendor_subtotal(&self, vendor: &VendorId) -> u64 {
        self.state.borrow().vendor_subtotal(vendor)
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}
