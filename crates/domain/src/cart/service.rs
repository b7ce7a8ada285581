//! Cart service providing a simplified API for cart operations.

use common::{MedicineId, UserId};
use store::DocumentStore;

use super::{Cart, CartPolicy, CartSnapshot, MedicineSnapshot};
use crate::error::DomainError;
use crate::pricing::Coupon;
use crate::repository::Repository;

/// Service for managing per-user carts.
///
/// Every mutation loads the cart (creating an empty one on first use),
/// applies the change, and saves it under optimistic concurrency.
pub struct CartService<S: DocumentStore> {
    repository: Repository<S, Cart>,
    policy: CartPolicy,
}

impl<S: DocumentStore> CartService<S> {
    /// Creates a new cart service.
    pub fn new(store: S, policy: CartPolicy) -> Self {
        Self {
            repository: Repository::new(store),
            policy,
        }
    }

    /// Returns the pricing and quantity policy.
    pub fn policy(&self) -> &CartPolicy {
        &self.policy
    }

    /// Returns the user's cart, or an unsaved empty cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, DomainError> {
        Ok(self
            .repository
            .load(&user_id.to_string())
            .await?
            .unwrap_or_else(|| Cart::new(user_id)))
    }

    /// Returns a snapshot of the user's cart for checkout.
    pub async fn snapshot(&self, user_id: UserId) -> Result<CartSnapshot, DomainError> {
        Ok(self.get_cart(user_id).await?.snapshot())
    }

    /// Adds units of a medicine to the cart.
    #[tracing::instrument(skip(self, snapshot))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        medicine_id: MedicineId,
        quantity: u32,
        snapshot: MedicineSnapshot,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, "add_item", |cart, policy| {
            cart.add_item(medicine_id, quantity, snapshot, policy)
                .map_err(Into::into)
        })
        .await
    }

    /// Sets the quantity of a cart line; zero removes it.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        medicine_id: MedicineId,
        quantity: u32,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, "update_item", |cart, policy| {
            cart.update_item(&medicine_id, quantity, policy)
                .map_err(Into::into)
        })
        .await
    }

    /// Removes a line from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        medicine_id: MedicineId,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, "remove_item", |cart, policy| {
            cart.remove_item(&medicine_id, policy).map_err(Into::into)
        })
        .await
    }

    /// Empties the cart and drops coupon and reward requests.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.mutate(user_id, "clear", |cart, _| {
            cart.clear();
            Ok(())
        })
        .await
    }

    /// Removes the items an order was placed from.
    ///
    /// Items added after `snapshot` was taken stay in the cart.
    #[tracing::instrument(skip(self, snapshot), fields(items = snapshot.items.len()))]
    pub async fn clear_checked_out(
        &self,
        user_id: UserId,
        snapshot: &CartSnapshot,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, "clear_checked_out", |cart, policy| {
            cart.remove_checked_out(snapshot, policy);
            Ok(())
        })
        .await
    }

    /// Applies a coupon to the cart.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: UserId, coupon: Coupon) -> Result<Cart, DomainError> {
        self.mutate(user_id, "apply_coupon", |cart, policy| {
            cart.apply_coupon(coupon, policy).map_err(Into::into)
        })
        .await
    }

    /// Removes the applied coupon.
    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, user_id: UserId) -> Result<Cart, DomainError> {
        self.mutate(user_id, "remove_coupon", |cart, policy| {
            cart.remove_coupon(policy);
            Ok(())
        })
        .await
    }

    /// Requests reward points to be redeemed on the cart.
    #[tracing::instrument(skip(self))]
    pub async fn apply_reward_points(
        &self,
        user_id: UserId,
        points: u32,
    ) -> Result<Cart, DomainError> {
        self.mutate(user_id, "apply_reward_points", |cart, policy| {
            cart.apply_reward_points(points, policy);
            Ok(())
        })
        .await
    }

    async fn mutate<F>(
        &self,
        user_id: UserId,
        operation: &'static str,
        change: F,
    ) -> Result<Cart, DomainError>
    where
        F: FnOnce(&mut Cart, &CartPolicy) -> Result<(), DomainError>,
    {
        let mut cart = self.get_cart(user_id).await?;
        change(&mut cart, &self.policy)?;
        self.repository.save(&mut cart).await?;

        metrics::counter!("carts_mutations_total", "operation" => operation).increment(1);
        tracing::debug!(%user_id, operation, items = cart.item_count(), "Cart updated");

        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;
    use crate::aggregate::Aggregate;
    use crate::error::ErrorKind;
    use rust_decimal::Decimal;
    use store::InMemoryDocumentStore;

    fn service() -> CartService<InMemoryDocumentStore> {
        CartService::new(InMemoryDocumentStore::new(), CartPolicy::default())
    }

    fn paracetamol() -> MedicineSnapshot {
        MedicineSnapshot {
            name: "Paracetamol".to_string(),
            unit_price: Money::from_rupees(45),
            unit_mrp: Money::from_rupees(50),
            discount_percent: Decimal::TEN,
            requires_prescription: false,
            available_stock: 20,
            batch_number: None,
        }
    }

    #[tokio::test]
    async fn test_get_cart_is_lazy() {
        let service = service();
        let user = UserId::new();

        let cart = service.get_cart(user).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.user_id(), user);
        assert_eq!(service.repository.store().document_count().await, 0);
    }

    #[tokio::test]
    async fn test_add_item_persists_cart() {
        let service = service();
        let user = UserId::new();

        service
            .add_item(user, MedicineId::new("MED-1"), 2, paracetamol())
            .await
            .unwrap();
        service
            .add_item(user, MedicineId::new("MED-1"), 3, paracetamol())
            .await
            .unwrap();

        let cart = service.get_cart(user).await.unwrap();
        assert_eq!(cart.total_quantity(), 5);
        assert_eq!(cart.pricing().subtotal, Money::from_rupees(225));
        assert_eq!(cart.version().as_i64(), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_saved() {
        let service = service();
        let user = UserId::new();

        service
            .add_item(user, MedicineId::new("MED-1"), 2, paracetamol())
            .await
            .unwrap();
        let err = service
            .update_item(user, MedicineId::new("MED-1"), 11)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidQuantity);
        let cart = service.get_cart(user).await.unwrap();
        assert_eq!(cart.total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_clear_resets_cart() {
        let service = service();
        let user = UserId::new();

        service
            .add_item(user, MedicineId::new("MED-1"), 2, paracetamol())
            .await
            .unwrap();
        service.apply_reward_points(user, 5).await.unwrap();
        service.clear(user).await.unwrap();

        let snapshot = service.snapshot(user).await.unwrap();
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.reward_points, 0);
    }

    #[tokio::test]
    async fn test_clear_checked_out_keeps_items_added_after_snapshot() {
        let service = service();
        let user = UserId::new();

        service
            .add_item(user, MedicineId::new("MED-1"), 2, paracetamol())
            .await
            .unwrap();
        let checked_out = service.snapshot(user).await.unwrap();
        service
            .add_item(user, MedicineId::new("MED-2"), 1, paracetamol())
            .await
            .unwrap();

        let cart = service.clear_checked_out(user, &checked_out).await.unwrap();

        assert_eq!(cart.item_count(), 1);
        assert!(cart.get_item(&MedicineId::new("MED-1")).is_none());
        assert_eq!(cart.get_item(&MedicineId::new("MED-2")).unwrap().quantity, 1);
        assert_eq!(cart.version().as_i64(), 3);
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let service = service();
        let alice = UserId::new();
        let bob = UserId::new();

        service
            .add_item(alice, MedicineId::new("MED-1"), 1, paracetamol())
            .await
            .unwrap();

        assert!(service.get_cart(bob).await.unwrap().is_empty());
    }
}
