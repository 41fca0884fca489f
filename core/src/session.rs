//! The acting party and the session-scoped idempotency guard
//!
//! Identity and the "already processed" list are passed explicitly into every
//! entry point instead of being read from ambient storage.

use crate::booking::{BookingId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Role of the signed-in party
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorRole {
    /// Regular traveller
    Customer,
    /// Discounted partner (travel agency)
    Agency,
    /// Service host
    Host,
    /// Administrator
    Admin,
    /// Anything the backend adds later
    Other(String),
}

impl ActorRole {
    /// Parse a backend role name, case-insensitively
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" | "user" | "tourist" => ActorRole::Customer,
            "agency" => ActorRole::Agency,
            "host" => ActorRole::Host,
            "admin" => ActorRole::Admin,
            _ => ActorRole::Other(raw.trim().to_string()),
        }
    }

    /// True for the role that receives the fixed partner discount
    #[must_use]
    pub const fn is_discounted_partner(&self) -> bool {
        matches!(self, ActorRole::Agency)
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRole::Customer => write!(f, "customer"),
            ActorRole::Agency => write!(f, "agency"),
            ActorRole::Host => write!(f, "host"),
            ActorRole::Admin => write!(f, "admin"),
            ActorRole::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Explicit session context for one checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Signed-in user, if known
    pub user_id: Option<UserId>,
    /// Role of the signed-in user
    pub role: ActorRole,
}

impl Session {
    /// Create a session for a signed-in user
    #[must_use]
    pub const fn new(user_id: UserId, role: ActorRole) -> Self {
        Self {
            user_id: Some(user_id),
            role,
        }
    }

    /// Anonymous customer session
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user_id: None,
            role: ActorRole::Customer,
        }
    }
}

/// Idempotency-key store guarding the one-time loyalty spend update
///
/// Read-then-append, not compare-and-set: it protects a single session from
/// double counting, not concurrent writers.
pub trait ProcessedBookings: Send + Sync {
    /// Has the side effect already been applied for this booking?
    fn has_processed(&self, booking_id: BookingId) -> bool;

    /// Record that the side effect has been applied for this booking
    fn mark_processed(&self, booking_id: BookingId);
}

/// Process-lifetime [`ProcessedBookings`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessedBookings {
    ids: Arc<Mutex<HashSet<BookingId>>>,
}

impl InMemoryProcessedBookings {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded bookings
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProcessedBookings for InMemoryProcessedBookings {
    fn has_processed(&self, booking_id: BookingId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&booking_id)
    }

    fn mark_processed(&self, booking_id: BookingId) {
        self.ids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(booking_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(ActorRole::parse("Agency"), ActorRole::Agency);
        assert_eq!(ActorRole::parse(" ADMIN "), ActorRole::Admin);
        assert_eq!(ActorRole::parse("auditor"), ActorRole::Other("auditor".into()));
        assert!(ActorRole::parse("agency").is_discounted_partner());
        assert!(!ActorRole::parse("customer").is_discounted_partner());
    }

    #[test]
    fn in_memory_store_remembers_marks() {
        let store = InMemoryProcessedBookings::new();
        assert!(!store.has_processed(BookingId(7)));
        store.mark_processed(BookingId(7));
        store.mark_processed(BookingId(7));
        assert!(store.has_processed(BookingId(7)));
        assert_eq!(store.len(), 1);
    }
}
