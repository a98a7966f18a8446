//! Splitting replies to fit the platform message cap

/// Maximum characters per outbound message (Discord caps at 2000)
pub const MESSAGE_LIMIT: usize = 1900;

/// Split `text` into consecutive chunks of at most `limit` characters
///
/// Splits on character boundaries only; chunk edges carry no meaning.
/// Empty input yields no chunks. A `limit` of 0 uses [`MESSAGE_LIMIT`].
#[must_use]
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = if limit == 0 { MESSAGE_LIMIT } else { limit };

    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == limit {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    chunks.push(current);

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(chunk_text("hello", MESSAGE_LIMIT), vec!["hello"]);
    }

    #[test]
    fn test_empty() {
        assert!(chunk_text("", MESSAGE_LIMIT).is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        let text = "a".repeat(3800);
        let chunks = chunk_text(&text, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 1900));
    }

    #[test]
    fn test_order_preserved() {
        let chunks = chunk_text("abcdefg", 3);
        assert_eq!(chunks, vec!["abc", "def", "g"]);
        assert_eq!(chunks.concat(), "abcdefg");
    }

    #[test]
    fn test_multibyte_boundaries() {
        let chunks = chunk_text("ééééé", 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_zero_limit_uses_default() {
        let text = "x".repeat(2000);
        assert_eq!(chunk_text(&text, 0).len(), 2);
    }
}
