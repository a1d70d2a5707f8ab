use chrono::NaiveDateTime;
use sqlx::FromRow;

/// Raw box row. The subscriber is stored inline as nullable columns and is
/// folded into the [`Subscriber`] enum when converting to the domain type.
#[derive(Debug, Clone, FromRow)]
pub struct BoxRow {
    pub box_id: String,
    pub box_name: String,
    pub client_id: String,
    pub application_id: Option<String>,
    pub subscription_type: Option<String>,
    pub callback_url: Option<String>,
    pub subscribed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// The consumer binding of a box: either the hub calls out (push) or the
/// consumer polls (pull). A box without a subscriber behaves as pull-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscriber {
    Push {
        callback_url: String,
        subscribed_at: NaiveDateTime,
    },
    Pull {
        subscribed_at: NaiveDateTime,
    },
}

impl Subscriber {
    /// The callback URL, when this is a push subscriber with a usable URL.
    pub fn push_callback_url(&self) -> Option<&str> {
        match self {
            Subscriber::Push { callback_url, .. } if !callback_url.is_empty() => {
                Some(callback_url)
            }
            _ => None,
        }
    }

    pub(crate) fn type_column(&self) -> &'static str {
        match self {
            Subscriber::Push { .. } => "push",
            Subscriber::Pull { .. } => "pull",
        }
    }
}

/// A named mailbox owned by an API client.
#[derive(Debug, Clone)]
pub struct NotificationBox {
    pub box_id: String,
    pub box_name: String,
    pub client_id: String,
    pub application_id: Option<String>,
    pub subscriber: Option<Subscriber>,
    pub created_at: NaiveDateTime,
}

impl NotificationBox {
    /// Callback URL of a valid push subscriber, if the box has one.
    pub fn push_callback_url(&self) -> Option<&str> {
        self.subscriber
            .as_ref()
            .and_then(Subscriber::push_callback_url)
    }
}

impl BoxRow {
    pub fn into_domain(self) -> NotificationBox {
        let subscribed_at = self.subscribed_at.unwrap_or(self.created_at);
        let subscriber = match self.subscription_type.as_deref() {
            Some("push") => Some(Subscriber::Push {
                callback_url: self.callback_url.unwrap_or_default(),
                subscribed_at,
            }),
            Some("pull") => Some(Subscriber::Pull { subscribed_at }),
            Some(other) => {
                tracing::warn!(
                    "Box {} has unknown subscription type '{}', treating as unsubscribed",
                    self.box_id,
                    other
                );
                None
            }
            None => None,
        };

        NotificationBox {
            box_id: self.box_id,
            box_name: self.box_name,
            client_id: self.client_id,
            application_id: self.application_id,
            subscriber,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(subscription_type: Option<&str>, callback_url: Option<&str>) -> BoxRow {
        BoxRow {
            box_id: "b-1".to_string(),
            box_name: "inventory-events".to_string(),
            client_id: "client-1".to_string(),
            application_id: None,
            subscription_type: subscription_type.map(str::to_string),
            callback_url: callback_url.map(str::to_string),
            subscribed_at: Some(Utc::now().naive_utc()),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn push_subscriber_with_url_is_pushable() {
        let b = row(Some("push"), Some("https://example.com/cb")).into_domain();
        assert_eq!(b.push_callback_url(), Some("https://example.com/cb"));
    }

    #[test]
    fn push_subscriber_with_empty_url_is_not_pushable() {
        let b = row(Some("push"), Some("")).into_domain();
        assert_eq!(b.push_callback_url(), None);
    }

    #[test]
    fn pull_subscriber_and_no_subscriber_are_not_pushable() {
        assert_eq!(row(Some("pull"), None).into_domain().push_callback_url(), None);
        assert_eq!(row(None, None).into_domain().push_callback_url(), None);
    }

    #[test]
    fn unknown_subscription_type_degrades_to_unsubscribed() {
        let b = row(Some("smoke-signal"), None).into_domain();
        assert!(b.subscriber.is_none());
    }
}
