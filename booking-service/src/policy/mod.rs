//! Role-based access scopes.
//!
//! Handlers never branch on roles themselves: they ask [`scope_for`] what the
//! caller may see of a resource and turn the answer into repository filters
//! or a per-record check.

use crate::models::Role;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Payment,
    Reservation,
    Receipt,
    /// The caller's own inbox.
    Notification,
    /// Venue-administration notices.
    AdminNotification,
    /// Managing venues; public listing needs no scope.
    Venue,
    /// Managing services; public listing needs no scope.
    Service,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    All,
    /// Records attached to venues owned by this admin.
    OwnedVenues(Uuid),
    /// Records belonging to this user.
    Own(Uuid),
    Denied,
}

pub fn scope_for(role: Role, user_id: Uuid, resource: Resource) -> AccessScope {
    use Resource::*;

    match (role, resource) {
        (_, Notification) => AccessScope::Own(user_id),
        (Role::SuperAdmin, _) => AccessScope::All,
        (Role::Admin, User) => AccessScope::Denied,
        (Role::Admin, _) => AccessScope::OwnedVenues(user_id),
        (Role::User, Payment | Reservation | Receipt) => AccessScope::Own(user_id),
        (Role::User, AdminNotification | Venue | Service | User) => AccessScope::Denied,
    }
}

impl AccessScope {
    pub fn ensure_allowed(self) -> Result<Self, AppError> {
        match self {
            AccessScope::Denied => Err(AppError::Forbidden(anyhow::anyhow!(
                "Insufficient permissions"
            ))),
            scope => Ok(scope),
        }
    }

    /// `user_id` filter for list queries.
    pub fn user_filter(self) -> Option<Uuid> {
        match self {
            AccessScope::Own(id) => Some(id),
            _ => None,
        }
    }

    /// `venue_owner_id` filter for list queries.
    pub fn venue_owner_filter(self) -> Option<Uuid> {
        match self {
            AccessScope::OwnedVenues(id) => Some(id),
            _ => None,
        }
    }

    /// Whether a single record owned by `user_id` at a venue owned by
    /// `venue_owner_id` is visible.
    pub fn permits(self, user_id: Uuid, venue_owner_id: Option<Uuid>) -> bool {
        match self {
            AccessScope::All => true,
            AccessScope::Own(id) => id == user_id,
            AccessScope::OwnedVenues(id) => venue_owner_id == Some(id),
            AccessScope::Denied => false,
        }
    }

    /// Like [`AccessScope::permits`] but as a handler error.
    pub fn check(self, user_id: Uuid, venue_owner_id: Option<Uuid>) -> Result<(), AppError> {
        if self.permits(user_id, venue_owner_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "You do not have access to this resource"
            )))
        }
    }
}
