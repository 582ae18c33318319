use clap::ValueEnum;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// How the runtime that produced a set of test ids represented text.
///
/// The tag values are part of the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(try_from = "u8", into = "u8")]
pub enum TextRegime {
  /// Strings are byte sequences unless stated otherwise.
  Bytes,
  /// Strings are unicode text unless stated otherwise.
  Unicode,
}

impl TextRegime {
  pub const fn tag(self) -> u8 {
    match self {
      TextRegime::Bytes => 2,
      TextRegime::Unicode => 3,
    }
  }

  pub const fn from_tag(tag: u8) -> Option<Self> {
    match tag {
      2 => Some(TextRegime::Bytes),
      3 => Some(TextRegime::Unicode),
      _ => None,
    }
  }

  /// The regime of this process. Rust strings are always UTF-8 text.
  pub const fn native() -> Self {
    TextRegime::Unicode
  }

  /// The id a host running in this regime produces for `raw`.
  pub fn node_id(self, raw: &str) -> NodeId {
    match self {
      TextRegime::Bytes => NodeId::Bytes(raw.as_bytes().to_vec()),
      TextRegime::Unicode => NodeId::Text(raw.to_string()),
    }
  }
}

impl Default for TextRegime {
  fn default() -> Self {
    TextRegime::native()
  }
}

impl From<TextRegime> for u8 {
  fn from(regime: TextRegime) -> u8 {
    regime.tag()
  }
}

impl TryFrom<u8> for TextRegime {
  type Error = String;

  fn try_from(tag: u8) -> std::result::Result<Self, Self::Error> {
    TextRegime::from_tag(tag).ok_or_else(|| format!("unknown text regime tag {tag}"))
  }
}

impl fmt::Display for TextRegime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TextRegime::Bytes => f.write_str("bytes"),
      TextRegime::Unicode => f.write_str("unicode"),
    }
  }
}

/// A test node id, e.g. `module.py::test_func`, in the form its producer
/// stored it.
///
/// Text ids serialize as msgpack `str`, byte ids as `bin`. Two ids in
/// different forms never compare equal, even when their bytes agree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
  Text(String),
  Bytes(Vec<u8>),
}

impl NodeId {
  pub fn is_empty(&self) -> bool {
    match self {
      NodeId::Text(text) => text.is_empty(),
      NodeId::Bytes(bytes) => bytes.is_empty(),
    }
  }

  pub fn as_bytes(&self) -> &[u8] {
    match self {
      NodeId::Text(text) => text.as_bytes(),
      NodeId::Bytes(bytes) => bytes,
    }
  }
}

impl From<&str> for NodeId {
  fn from(raw: &str) -> Self {
    NodeId::Text(raw.to_string())
  }
}

impl From<String> for NodeId {
  fn from(raw: String) -> Self {
    NodeId::Text(raw)
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeId::Text(text) => f.write_str(text),
      NodeId::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
    }
  }
}

impl Serialize for NodeId {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match self {
      NodeId::Text(text) => serializer.serialize_str(text),
      NodeId::Bytes(bytes) => serializer.serialize_bytes(bytes),
    }
  }
}

impl<'de> Deserialize<'de> for NodeId {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    struct NodeIdVisitor;

    impl<'de> Visitor<'de> for NodeIdVisitor {
      type Value = NodeId;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or byte string test id")
      }

      fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<NodeId, E> {
        Ok(NodeId::Text(v.to_string()))
      }

      fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<NodeId, E> {
        Ok(NodeId::Text(v))
      }

      fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<NodeId, E> {
        Ok(NodeId::Bytes(v.to_vec()))
      }

      fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<NodeId, E> {
        Ok(NodeId::Bytes(v))
      }
    }

    deserializer.deserialize_any(NodeIdVisitor)
  }
}

/// Returns the alternate form of `id` a reader in regime `reader` may see for
/// an id written by a `writer`-regime runtime, transcoding through latin-1.
///
/// Returns `None` when both regimes agree, when `id` is not in the writer's
/// native form, or when the id cannot be transcoded (text with a code point
/// above U+00FF has no latin-1 encoding).
pub fn bridge(id: &NodeId, writer: TextRegime, reader: TextRegime) -> Option<NodeId> {
  match (writer, reader, id) {
    (TextRegime::Bytes, TextRegime::Unicode, NodeId::Bytes(bytes)) => {
      Some(NodeId::Text(bytes.iter().map(|&b| char::from(b)).collect()))
    }
    (TextRegime::Unicode, TextRegime::Bytes, NodeId::Text(text)) => text
      .chars()
      .map(|c| u8::try_from(u32::from(c)).ok())
      .collect::<Option<Vec<u8>>>()
      .map(NodeId::Bytes),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_regime_has_no_alternate() {
    let id = NodeId::from("mod.py::test_a");
    assert_eq!(bridge(&id, TextRegime::Unicode, TextRegime::Unicode), None);
    let id = NodeId::Bytes(b"mod.py::test_a".to_vec());
    assert_eq!(bridge(&id, TextRegime::Bytes, TextRegime::Bytes), None);
  }

  #[test]
  fn bytes_writer_decodes_as_latin1() {
    let id = NodeId::Bytes("mödule.py::x".as_bytes().to_vec());
    let bridged = bridge(&id, TextRegime::Bytes, TextRegime::Unicode).unwrap();
    assert_eq!(bridged, NodeId::Text("mÃ¶dule.py::x".to_string()));

    let ascii = NodeId::Bytes(b"mod.py::test_a".to_vec());
    assert_eq!(
      bridge(&ascii, TextRegime::Bytes, TextRegime::Unicode),
      Some(NodeId::from("mod.py::test_a"))
    );
  }

  #[test]
  fn unicode_writer_encodes_as_latin1_when_possible() {
    let id = NodeId::from("mödule.py::x");
    assert_eq!(
      bridge(&id, TextRegime::Unicode, TextRegime::Bytes),
      Some(NodeId::Bytes(b"m\xf6dule.py::x".to_vec()))
    );

    let wide = NodeId::from("模块.py::x");
    assert_eq!(bridge(&wide, TextRegime::Unicode, TextRegime::Bytes), None);
  }

  #[test]
  fn mismatched_form_is_left_alone() {
    let id = NodeId::from("mod.py::test_a");
    assert_eq!(bridge(&id, TextRegime::Bytes, TextRegime::Unicode), None);
  }

  #[test]
  fn host_ids_follow_regime() {
    assert_eq!(
      TextRegime::Bytes.node_id("a::b"),
      NodeId::Bytes(b"a::b".to_vec())
    );
    assert_eq!(TextRegime::Unicode.node_id("a::b"), NodeId::from("a::b"));
    assert_eq!(TextRegime::from_tag(TextRegime::Bytes.tag()), Some(TextRegime::Bytes));
    assert_eq!(TextRegime::from_tag(7), None);
  }
}
