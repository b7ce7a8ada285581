//! Server-sent event streams of order status changes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use domain::{Actor, DomainError, OrderError};
use fulfillment::StatusChange;
use futures_util::stream::{self, Stream};
use store::{DocumentStore, StockLedger};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{AppState, actor_from_headers, parse_order_id, parse_user_id};
use crate::error::ApiError;

/// GET /orders/:id/events
#[tracing::instrument(skip(state, headers))]
pub async fn order<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let actor = actor_from_headers(&headers)?;

    // Loading checks both that the order exists and that the caller may see it.
    state.desk.get_order(order_id, &actor).await?;

    let receiver = state.notifications.subscribe_order(order_id);
    Ok(Sse::new(changes(receiver)).keep_alive(KeepAlive::default()))
}

/// GET /users/:user_id/events
#[tracing::instrument(skip(state, headers))]
pub async fn user<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let actor = actor_from_headers(&headers)?;

    if matches!(&actor, Actor::Customer(caller) if *caller != user_id) {
        return Err(DomainError::from(OrderError::Forbidden { actor }).into());
    }

    let receiver = state.notifications.subscribe_user(user_id);
    Ok(Sse::new(changes(receiver)).keep_alive(KeepAlive::default()))
}

/// Turns a subscription into `status` events until the channel closes.
fn changes(
    receiver: broadcast::Receiver<StatusChange>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(change) => match Event::default().event("status").json_data(&change) {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(e) => tracing::warn!(error = %e, "Status change not encoded"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    metrics::counter!("sse_lagged_total").increment(skipped);
                    tracing::warn!(skipped, "Subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
