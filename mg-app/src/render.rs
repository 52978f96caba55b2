//! Fulfillment messages → Send API messages.

use mg_messenger::{OutboundMessage, QuickReplyOption, TemplateButton, TemplateElement};
use mg_nlu::{CardButton, FulfillmentMessage};

/// Render agent messages in order. Consecutive cards are merged into one
/// generic-template carousel.
pub fn render_messages(messages: &[FulfillmentMessage]) -> Vec<OutboundMessage> {
    let mut out = Vec::with_capacity(messages.len());
    let mut cards: Vec<TemplateElement> = Vec::new();

    for message in messages {
        if let FulfillmentMessage::Card {
            title,
            subtitle,
            image_uri,
            buttons,
        } = message
        {
            cards.push(TemplateElement {
                title: title.clone(),
                subtitle: non_empty(subtitle),
                image_url: non_empty(image_uri),
                buttons: buttons.iter().map(card_button).collect(),
            });
            continue;
        }
        flush_cards(&mut cards, &mut out);

        match message {
            FulfillmentMessage::Text { lines } => {
                out.extend(
                    lines
                        .iter()
                        .filter(|line| !line.trim().is_empty())
                        .map(OutboundMessage::text),
                );
            }
            FulfillmentMessage::QuickReplies { title, replies } => {
                out.push(OutboundMessage::QuickReplies {
                    text: title.clone(),
                    replies: replies
                        .iter()
                        .map(|reply| QuickReplyOption {
                            title: reply.clone(),
                            payload: reply.clone(),
                        })
                        .collect(),
                });
            }
            FulfillmentMessage::Image { image_uri } => {
                if let Some(url) = non_empty(image_uri) {
                    out.push(OutboundMessage::Image { url });
                }
            }
            FulfillmentMessage::Payload { payload } => {
                let message = payload.get("facebook").unwrap_or(payload).clone();
                out.push(OutboundMessage::Raw { message });
            }
            FulfillmentMessage::Unsupported { raw } => {
                tracing::debug!(raw = %raw, "skipping unsupported fulfillment message");
            }
            FulfillmentMessage::Card { .. } => {}
        }
    }
    flush_cards(&mut cards, &mut out);
    out
}

fn flush_cards(cards: &mut Vec<TemplateElement>, out: &mut Vec<OutboundMessage>) {
    if cards.is_empty() {
        return;
    }
    out.push(OutboundMessage::GenericTemplate {
        elements: std::mem::take(cards),
    });
}

fn card_button(button: &CardButton) -> TemplateButton {
    let target = button.postback.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        return TemplateButton::WebUrl {
            title: button.text.clone(),
            url: target.to_string(),
        };
    }
    TemplateButton::Postback {
        title: button.text.clone(),
        payload: if target.is_empty() {
            button.text.clone()
        } else {
            target.to_string()
        },
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
