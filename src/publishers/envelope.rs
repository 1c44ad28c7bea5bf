use lapin::types::{FieldTable, ShortShortUInt, ShortString, Timestamp};
use lapin::BasicProperties;

/// AMQP properties attached to published messages.
///
/// A publisher is configured with a default set of options; every call to
/// [`publish_object`](crate::publishers::JsonPublisher::publish_object) may
/// supply per-call overrides which win field by field (see [`merge`]).
///
/// The content type and content encoding are not configurable: the envelope
/// convention pins them to `application/json` / `UTF-8`, and a publisher that
/// could be configured to lie about its body format would be a footgun.
///
/// [`merge`]: EnvelopeOptions::merge
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvelopeOptions {
    /// AMQP headers attached to the message.
    pub headers: Option<FieldTable>,
    pub priority: Option<ShortShortUInt>,
    pub correlation_id: Option<ShortString>,
    pub reply_to: Option<ShortString>,
    /// Per-message TTL, in milliseconds, as a string.
    pub expiration: Option<ShortString>,
    pub message_id: Option<ShortString>,
    pub timestamp: Option<Timestamp>,
    /// The AMQP `type` property.
    pub kind: Option<ShortString>,
    pub user_id: Option<ShortString>,
    pub app_id: Option<ShortString>,
}

impl EnvelopeOptions {
    /// Merge `overrides` over `self`: every field set on `overrides` wins,
    /// every unset field keeps the configured value.
    #[must_use]
    pub fn merge(self, overrides: EnvelopeOptions) -> Self {
        Self {
            headers: overrides.headers.or(self.headers),
            priority: overrides.priority.or(self.priority),
            correlation_id: overrides.correlation_id.or(self.correlation_id),
            reply_to: overrides.reply_to.or(self.reply_to),
            expiration: overrides.expiration.or(self.expiration),
            message_id: overrides.message_id.or(self.message_id),
            timestamp: overrides.timestamp.or(self.timestamp),
            kind: overrides.kind.or(self.kind),
            user_id: overrides.user_id.or(self.user_id),
            app_id: overrides.app_id.or(self.app_id),
        }
    }

    /// Build the wire properties, stamping the JSON envelope content type and
    /// encoding on top of whatever was configured.
    pub(crate) fn into_properties(self) -> BasicProperties {
        let mut properties = BasicProperties::default();
        if let Some(headers) = self.headers {
            properties = properties.with_headers(headers);
        }
        if let Some(priority) = self.priority {
            properties = properties.with_priority(priority);
        }
        if let Some(correlation_id) = self.correlation_id {
            properties = properties.with_correlation_id(correlation_id);
        }
        if let Some(reply_to) = self.reply_to {
            properties = properties.with_reply_to(reply_to);
        }
        if let Some(expiration) = self.expiration {
            properties = properties.with_expiration(expiration);
        }
        if let Some(message_id) = self.message_id {
            properties = properties.with_message_id(message_id);
        }
        if let Some(timestamp) = self.timestamp {
            properties = properties.with_timestamp(timestamp);
        }
        if let Some(kind) = self.kind {
            properties = properties.with_kind(kind);
        }
        if let Some(user_id) = self.user_id {
            properties = properties.with_user_id(user_id);
        }
        if let Some(app_id) = self.app_id {
            properties = properties.with_app_id(app_id);
        }
        properties
            .with_content_type("application/json".into())
            .with_content_encoding("UTF-8".into())
    }
}

#[cfg(test)]
mod tests {
    use super::EnvelopeOptions;

    #[test]
    fn per_call_overrides_win_over_configured_defaults() {
        let defaults = EnvelopeOptions {
            app_id: Some("billing".into()),
            correlation_id: Some("configured".into()),
            ..EnvelopeOptions::default()
        };
        let overrides = EnvelopeOptions {
            correlation_id: Some("per-call".into()),
            reply_to: Some("replies".into()),
            ..EnvelopeOptions::default()
        };

        let merged = defaults.merge(overrides);

        assert_eq!(merged.correlation_id, Some("per-call".into()));
        assert_eq!(merged.reply_to, Some("replies".into()));
        // Untouched defaults survive the merge.
        assert_eq!(merged.app_id, Some("billing".into()));
    }

    #[test]
    fn the_json_envelope_metadata_is_always_stamped() {
        let properties = EnvelopeOptions::default().into_properties();

        assert_eq!(
            properties.content_type().as_ref().map(|ct| ct.as_str()),
            Some("application/json")
        );
        assert_eq!(
            properties.content_encoding().as_ref().map(|ce| ce.as_str()),
            Some("UTF-8")
        );
    }

    #[test]
    fn configured_fields_end_up_on_the_wire_properties() {
        let options = EnvelopeOptions {
            message_id: Some("msg-1".into()),
            priority: Some(4),
            ..EnvelopeOptions::default()
        };

        let properties = options.into_properties();

        assert_eq!(
            properties.message_id().as_ref().map(|id| id.as_str()),
            Some("msg-1")
        );
        assert_eq!(properties.priority(), &Some(4));
    }
}
