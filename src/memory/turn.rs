use serde::{Deserialize, Serialize};

use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    High,
    Low,
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::High => "high",
            ImageDetail::Low => "low",
            ImageDetail::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// `data:image/png;base64,…`
    pub data_uri: String,
    pub detail: ImageDetail,
}

impl ImageAttachment {
    pub fn new(data_uri: String, detail: ImageDetail) -> Self {
        Self { data_uri, detail }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurnContent {
    Text(String),
    WithImages {
        text: String,
        images: Vec<ImageAttachment>,
    },
}

impl From<String> for TurnContent {
    fn from(text: String) -> Self {
        TurnContent::Text(text)
    }
}

/// One message in the conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn with_images(role: Role, text: impl Into<String>, images: Vec<ImageAttachment>) -> Self {
        Self {
            role,
            content: TurnContent::WithImages {
                text: text.into(),
                images,
            },
        }
    }

    pub fn text_content(&self) -> &str {
        match &self.content {
            TurnContent::Text(t) => t,
            TurnContent::WithImages { text, .. } => text,
        }
    }

    pub fn image_count(&self) -> usize {
        match &self.content {
            TurnContent::Text(_) => 0,
            TurnContent::WithImages { images, .. } => images.len(),
        }
    }

    /// `role: text`, images dropped. Used when folding turns into a summary.
    pub fn render_plain(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.text_content())
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        let content = match &self.content {
            TurnContent::Text(t) => MessageContent::Text(t.clone()),
            TurnContent::WithImages { text, images } => {
                let mut parts = vec![ContentPart::Text { text: text.clone() }];
                parts.extend(images.iter().map(|img| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: img.data_uri.clone(),
                        detail: Some(img.detail.as_str().to_string()),
                    },
                }));
                MessageContent::Parts(parts)
            }
        };
        ChatMessage {
            role: self.role.as_str().to_string(),
            content,
        }
    }
}
