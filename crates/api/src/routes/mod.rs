//! HTTP route handlers and the state they share.

pub mod carts;
pub mod events;
pub mod health;
pub mod medicines;
pub mod metrics;
pub mod orders;

use axum::http::HeaderMap;
use common::{OrderId, UserId};
use domain::Actor;
use fulfillment::{BroadcastPublisher, CheckoutCoordinator, OrderDesk};
use store::{DocumentStore, StockLedger};

use crate::error::ApiError;

/// Header carrying the calling customer's ID.
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the calling admin's ID.
pub const ADMIN_HEADER: &str = "x-admin-id";
/// Header carrying the calling delivery partner's ID.
pub const PARTNER_HEADER: &str = "x-partner-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore, L: StockLedger> {
    pub checkout: CheckoutCoordinator<S, L>,
    pub desk: OrderDesk<S, L>,
    /// Status change channels behind the event stream endpoints.
    pub notifications: BroadcastPublisher,
}

pub(crate) fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid user ID: {e}")))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}

/// Resolves the caller from identity headers.
///
/// Authentication happens upstream; requests without an identity header
/// act as the system.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let header = |name: &str| -> Result<Option<String>, ApiError> {
        headers
            .get(name)
            .map(|value| {
                value
                    .to_str()
                    .map(|s| s.trim().to_string())
                    .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header")))
            })
            .transpose()
    };

    if let Some(user) = header(USER_HEADER)? {
        return Ok(Actor::Customer(parse_user_id(&user)?));
    }
    if let Some(admin) = header(ADMIN_HEADER)? {
        return Ok(Actor::Admin(admin));
    }
    if let Some(partner) = header(PARTNER_HEADER)? {
        return Ok(Actor::DeliveryPartner(partner));
    }
    Ok(Actor::System)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_actor_defaults_to_system() {
        assert_eq!(actor_from_headers(&HeaderMap::new()).unwrap(), Actor::System);
    }

    #[test]
    fn test_actor_from_user_header() {
        let user = UserId::new();
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_str(&user.to_string()).unwrap());
        assert_eq!(actor_from_headers(&headers).unwrap(), Actor::Customer(user));
    }

    #[test]
    fn test_actor_rejects_bad_user_id() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            actor_from_headers(&headers),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_actor_from_staff_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(PARTNER_HEADER, HeaderValue::from_static("ravi"));
        assert_eq!(
            actor_from_headers(&headers).unwrap(),
            Actor::DeliveryPartner("ravi".to_string())
        );
    }
}
