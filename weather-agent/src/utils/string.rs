/// Keep the head and tail of `text`, joined by `...`, when it is longer than
/// `width` characters.
pub fn shorten_middle(text: &str, width: usize, remove_newline: bool) -> String {
    let cleaned = if remove_newline {
        text.replace(['\n', '\r'], " ")
    } else {
        text.to_string()
    };
    let len = cleaned.chars().count();
    if len <= width {
        return cleaned;
    }
    let half = width / 2;
    let head: String = cleaned.chars().take(half).collect();
    let tail: String = cleaned.chars().skip(len - half).collect();
    format!("{head}...{tail}")
}
