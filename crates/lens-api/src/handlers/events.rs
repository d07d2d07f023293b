use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tracing::warn;

use lens_common::sync::{Scope, SyncError};

use crate::auth::AuthUser;
use crate::SharedState;

/// Server-sent change feed scoped to the caller's entities. Each mutation
/// arrives as a `change` event carrying the full entity snapshot; a `refetch`
/// event means the subscriber fell behind and must reload current state.
pub async fn stream_events(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.bus.subscribe(Scope::AllForOwner(auth.subject));

    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        loop {
            match subscription.next().await {
                Ok(change) => {
                    let event = match serde_json::to_string(&change) {
                        Ok(json) => Event::default().event("change").data(json),
                        Err(err) => {
                            warn!(error = %err, "failed to serialize change event");
                            continue;
                        }
                    };
                    return Some((Ok(event), subscription));
                }
                Err(SyncError::Lagged(dropped)) => {
                    warn!(dropped, "subscriber lagged; instructing refetch");
                    let event = Event::default().event("refetch").data("{}");
                    return Some((Ok(event), subscription));
                }
                Err(SyncError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
