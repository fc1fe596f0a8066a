use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::models::{
    event::{DomainEvent, EventType},
    notification::Channel,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub title: String,
    pub body: String,
}

impl Template {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub title: String,
    pub body: String,
}

/// Notification content keyed by event type and channel.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<(EventType, Channel), Template>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateCatalog {
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::empty()
            .with_template(
                EventType::UserCreated,
                Channel::Email,
                Template::new(
                    "Welcome, {{name}}!",
                    "Hi {{name}},\n\nYour account has been created for {{email}}. We're glad to have you on board.",
                ),
            )
            .with_template(
                EventType::UserUpdated,
                Channel::Email,
                Template::new(
                    "Your profile was updated",
                    "Hi {{name}},\n\nThe following details on your account were changed: {{changes}}.\nIf you did not make this change, please contact support.",
                ),
            )
            .with_template(
                EventType::OrderCreated,
                Channel::Email,
                Template::new(
                    "Order {{orderId}} confirmed",
                    "Hi {{name}},\n\nThank you for your order {{orderId}}. Order total: {{totalAmount}}.\nWe will let you know as soon as it ships.",
                ),
            )
            .with_template(
                EventType::OrderCreated,
                Channel::Sms,
                Template::new(
                    "Order confirmed",
                    "Your order {{orderId}} ({{totalAmount}}) is confirmed. Thank you!",
                ),
            )
            .with_template(
                EventType::OrderUpdated,
                Channel::Email,
                Template::new(
                    "Order {{orderId}} updated",
                    "Hi {{name}},\n\nYour order {{orderId}} was updated. Changed: {{changes}}.",
                ),
            )
            .with_template(
                EventType::OrderShipped,
                Channel::Email,
                Template::new(
                    "Order {{orderId}} has shipped",
                    "Hi {{name}},\n\nYour order {{orderId}} is on its way with {{carrier}}.\nTracking number: {{trackingNumber}}\nTrack your package: {{trackingUrl}}",
                ),
            )
            .with_template(
                EventType::OrderShipped,
                Channel::Sms,
                Template::new(
                    "Order shipped",
                    "Order {{orderId}} shipped via {{carrier}}. Tracking: {{trackingNumber}} {{trackingUrl}}",
                ),
            )
            .with_template(
                EventType::OrderDelivered,
                Channel::Email,
                Template::new(
                    "Order {{orderId}} delivered",
                    "Hi {{name}},\n\nYour order {{orderId}} has been delivered. Enjoy!",
                ),
            )
            .with_template(
                EventType::OrderDelivered,
                Channel::Push,
                Template::new("Order delivered", "Your order {{orderId}} has arrived."),
            )
            .with_template(
                EventType::OrderCancelled,
                Channel::Email,
                Template::new(
                    "Order {{orderId}} cancelled",
                    "Hi {{name}},\n\nYour order {{orderId}} ({{totalAmount}}) has been cancelled.\nReason: {{reason}}",
                ),
            )
            .with_template(
                EventType::OrderCancelled,
                Channel::Sms,
                Template::new(
                    "Order cancelled",
                    "Your order {{orderId}} was cancelled. Reason: {{reason}}",
                ),
            )
    }

    pub fn with_template(mut self, event_type: EventType, channel: Channel, template: Template) -> Self {
        self.templates.insert((event_type, channel), template);
        self
    }

    pub fn get(&self, event_type: EventType, channel: Channel) -> Option<&Template> {
        self.templates.get(&(event_type, channel))
    }

    pub fn render(
        &self,
        event_type: EventType,
        channel: Channel,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<RenderedContent, Error> {
        let template = self
            .get(event_type, channel)
            .ok_or_else(|| anyhow!("No template for {} on channel {}", event_type, channel))?;

        debug!(
            event_type = %event_type,
            channel = %channel,
            variable_count = variables.len(),
            "Rendering template"
        );

        let title = replace_variables(&template.title, variables)?;
        let body = replace_variables(&template.body, variables)?;

        Ok(RenderedContent { title, body })
    }
}

/// Substitutes every `{{name}}` placeholder in one pass. Substituted values
/// are never rescanned, so user data containing braces is left alone.
pub fn replace_variables(
    template: &str,
    variables: &HashMap<String, JsonValue>,
) -> Result<String, Error> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };

        result.push_str(&rest[..start]);

        let key = rest[start + 2..start + 2 + len].trim();
        let value = variables.get(key).ok_or_else(|| {
            warn!(missing_variable = %key, "Template contains unreplaced variable");
            anyhow!("Missing variable in template: {{{{{}}}}}", key)
        })?;

        let replacement = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Null => String::new(),
            _ => {
                return Err(anyhow!("Unsupported variable type for key '{}'", key));
            }
        };

        result.push_str(&replacement);
        rest = &rest[start + 2 + len + 2..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Template variables for an event. Every variant is matched explicitly so a
/// new event type cannot be dispatched without deciding its variables.
pub fn template_variables(event: &DomainEvent) -> HashMap<String, JsonValue> {
    let user = event.user();
    let mut variables = HashMap::new();

    variables.insert("name".to_string(), JsonValue::from(user.display_name()));
    variables.insert("email".to_string(), JsonValue::from(user.email.as_str()));

    if let Some(order) = event.order() {
        variables.insert("orderId".to_string(), JsonValue::from(order.id.as_str()));
        variables.insert(
            "totalAmount".to_string(),
            JsonValue::from(format!("{:.2}", order.total_amount)),
        );
    }

    match event {
        DomainEvent::UserCreated(_)
        | DomainEvent::OrderCreated(_)
        | DomainEvent::OrderDelivered(_) => {}
        DomainEvent::UserUpdated(payload) => {
            variables.insert("changes".to_string(), describe_changes(&payload.changes));
        }
        DomainEvent::OrderUpdated(payload) => {
            variables.insert("changes".to_string(), describe_changes(&payload.changes));
        }
        DomainEvent::OrderShipped(payload) => {
            let tracking = &payload.tracking;
            variables.insert(
                "trackingNumber".to_string(),
                JsonValue::from(tracking.tracking_number.as_str()),
            );
            variables.insert("carrier".to_string(), JsonValue::from(tracking.carrier.as_str()));
            variables.insert(
                "trackingUrl".to_string(),
                JsonValue::from(tracking.tracking_url.as_deref().unwrap_or("not available")),
            );
        }
        DomainEvent::OrderCancelled(payload) => {
            variables.insert(
                "reason".to_string(),
                JsonValue::from(payload.reason.as_deref().unwrap_or("not specified")),
            );
        }
    }

    variables
}

fn describe_changes(changes: &serde_json::Map<String, JsonValue>) -> JsonValue {
    if changes.is_empty() {
        return JsonValue::from("account details");
    }

    let fields: Vec<&str> = changes.keys().map(String::as_str).collect();
    JsonValue::from(fields.join(", "))
}
