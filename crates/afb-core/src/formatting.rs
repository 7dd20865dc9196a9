use crate::domain::{BotIdentity, UserId};

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Clickable mention of a user, HTML parse mode.
pub fn mention_html(me: &BotIdentity) -> String {
    mention_user_html(me.id, &me.first_name)
}

pub fn mention_user_html(id: UserId, name: &str) -> String {
    format!("<a href=\"tg://user?id={}\">{}</a>", id.0, escape_html(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_html("<b>&\"</b>"), "&lt;b&gt;&amp;&quot;&lt;/b&gt;");
    }

    #[test]
    fn mention_escapes_name() {
        let me = BotIdentity {
            id: UserId(42),
            username: "filter_bot".to_string(),
            first_name: "A<B".to_string(),
        };
        assert_eq!(
            mention_html(&me),
            "<a href=\"tg://user?id=42\">A&lt;B</a>"
        );
    }
}
