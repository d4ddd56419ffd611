use super::{PageRequest, UnknownVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationAudience {
    /// A single user, identified by `user_id`.
    User,
    /// Venue administrators, scoped by `venue_id`.
    Admin,
}

impl NotificationAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAudience::User => "USER",
            NotificationAudience::Admin => "ADMIN",
        }
    }
}

impl FromStr for NotificationAudience {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(NotificationAudience::User),
            "ADMIN" => Ok(NotificationAudience::Admin),
            other => Err(UnknownVariant::new("notification audience", other)),
        }
    }
}

impl TryFrom<String> for NotificationAudience {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PaymentConfirmed,
    PaymentFailed,
    PaymentRefunded,
    ReservationConfirmed,
    ReservationCancelled,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PaymentConfirmed => "PAYMENT_CONFIRMED",
            NotificationKind::PaymentFailed => "PAYMENT_FAILED",
            NotificationKind::PaymentRefunded => "PAYMENT_REFUNDED",
            NotificationKind::ReservationConfirmed => "RESERVATION_CONFIRMED",
            NotificationKind::ReservationCancelled => "RESERVATION_CANCELLED",
            NotificationKind::System => "SYSTEM",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_CONFIRMED" => Ok(NotificationKind::PaymentConfirmed),
            "PAYMENT_FAILED" => Ok(NotificationKind::PaymentFailed),
            "PAYMENT_REFUNDED" => Ok(NotificationKind::PaymentRefunded),
            "RESERVATION_CONFIRMED" => Ok(NotificationKind::ReservationConfirmed),
            "RESERVATION_CANCELLED" => Ok(NotificationKind::ReservationCancelled),
            "SYSTEM" => Ok(NotificationKind::System),
            other => Err(UnknownVariant::new("notification kind", other)),
        }
    }
}

impl TryFrom<String> for NotificationKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub audience: NotificationAudience,
    pub user_id: Option<Uuid>,
    pub venue_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub audience: NotificationAudience,
    pub user_id: Option<Uuid>,
    pub venue_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub email_sent: bool,
}

/// Selects notifications by audience and access scope.
///
/// `ids` narrows a mark-as-read update; listing ignores it.
#[derive(Debug, Clone)]
pub struct ListNotificationsFilter {
    pub audience: NotificationAudience,
    pub user_id: Option<Uuid>,
    pub venue_owner_id: Option<Uuid>,
    pub unread_only: bool,
    pub kind: Option<NotificationKind>,
    pub ids: Option<Vec<Uuid>>,
    pub page: PageRequest,
}

impl ListNotificationsFilter {
    pub fn new(audience: NotificationAudience) -> Self {
        Self {
            audience,
            user_id: None,
            venue_owner_id: None,
            unread_only: false,
            kind: None,
            ids: None,
            page: PageRequest::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
    pub email_sent: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub last_7_days: u64,
}
