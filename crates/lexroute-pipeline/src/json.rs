//! Extraction of JSON payloads from model replies, which often arrive wrapped
//! in markdown fences or surrounded by prose.

use serde::de::DeserializeOwned;

/// The outermost JSON object or array in `reply`, if any.
pub(crate) fn extract_json(reply: &str) -> Option<&str> {
  let body = strip_fences(reply.trim());
  let start = body.find(['{', '['])?;
  let close = match body.as_bytes()[start] {
    b'{' => '}',
    _ => ']',
  };
  let end = body.rfind(close)?;
  (end > start).then(|| &body[start..=end])
}

fn strip_fences(s: &str) -> &str {
  let Some(rest) = s.strip_prefix("```") else {
    return s;
  };
  // Drop the info string (e.g. `json`) on the opening fence line.
  let rest = rest.split_once('\n').map_or(rest, |(_, body)| body);
  rest.rfind("```").map_or(rest, |i| &rest[..i]).trim()
}

/// Parse a model reply into `T`.
pub(crate) fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T, String> {
  let json = extract_json(reply).ok_or_else(|| "reply contains no JSON".to_string())?;
  serde_json::from_str(json).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fenced_reply_is_unwrapped() {
    let reply = "```json\n{\"a\": 1}\n```";
    assert_eq!(extract_json(reply), Some("{\"a\": 1}"));
  }

  #[test]
  fn prose_around_object_is_ignored() {
    let reply = "Here is the report:\n{\"a\": {\"b\": 2}}\nHope this helps.";
    assert_eq!(extract_json(reply), Some("{\"a\": {\"b\": 2}}"));
  }

  #[test]
  fn arrays_are_extracted() {
    let v: Vec<String> = parse_reply("Sure! [\"one\", \"two\"]").unwrap();
    assert_eq!(v, vec!["one", "two"]);
  }

  #[test]
  fn missing_json_is_an_error() {
    assert!(parse_reply::<serde_json::Value>("no structured content").is_err());
  }
}
