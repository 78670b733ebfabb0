use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::SessionId;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, increasing session id. Ascending ids are join order, which
/// the tick engine uses as its advance order.
pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}
