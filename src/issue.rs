use once_cell::sync::Lazy;
use regex::Regex;

/// descriptionの先頭にあるJiraの課題キーにマッチする正規表現。
static ISSUE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+-\d+)\b").unwrap());

/// descriptionの先頭から課題キーを取り出す。
///
/// 先頭にない課題キーは対象外とする。
///
/// # Arguments
///
/// * `description` - time entryのdescription
///
/// # Examples
///
/// ```
/// assert_eq!(extract_issue_key("ABC-123 did work"), Some("ABC-123"));
/// assert_eq!(extract_issue_key("did ABC-123"), None);
/// ```
pub fn extract_issue_key(description: &str) -> Option<&str> {
    ISSUE_KEY
        .captures(description)
        .and_then(|captures| captures.get(1))
        .map(|key| key.as_str())
}

/// descriptionから先頭の課題キーと前後の空白を取り除き、worklogのコメントにする。
///
/// 残りが空の場合は`None`を返す。
pub fn strip_issue_key<'a>(description: &'a str, issue_key: &str) -> Option<&'a str> {
    let comment = description
        .strip_prefix(issue_key)
        .unwrap_or(description)
        .trim();
    if comment.is_empty() {
        None
    } else {
        Some(comment)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{extract_issue_key, strip_issue_key};

    #[rstest]
    #[case::key_only("ABC-123", Some("ABC-123"))]
    #[case::key_with_text("ABC-1 did work", Some("ABC-1"))]
    #[case::key_with_colon("PROJ-42: review", Some("PROJ-42"))]
    #[case::single_letter("X-9 fix", Some("X-9"))]
    #[case::trailing_word_char("ABC-123x", None)]
    #[case::trailing_underscore("ABC-123_draft", None)]
    #[case::lowercase("abc-123 did work", None)]
    #[case::mid_string("did ABC-123", None)]
    #[case::leading_space(" ABC-123", None)]
    #[case::no_digits("ABC- work", None)]
    #[case::digits_in_project("AB1-2", None)]
    #[case::empty("", None)]
    fn test_extract_issue_key(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(extract_issue_key(input), expected);
    }

    #[rstest]
    #[case::with_text("ABC-1 did work", "ABC-1", Some("did work"))]
    #[case::surrounding_spaces("ABC-1    did work  ", "ABC-1", Some("did work"))]
    #[case::key_only("ABC-1", "ABC-1", None)]
    #[case::key_and_spaces("ABC-1   ", "ABC-1", None)]
    fn test_strip_issue_key(
        #[case] description: &str,
        #[case] issue_key: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(strip_issue_key(description, issue_key), expected);
    }
}
