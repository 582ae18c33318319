use crate::regime::{bridge, NodeId, TextRegime};
use crate::warning::{Warning, WarningSink};
use crate::{ExpectError, Result};
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{btree_set, BTreeSet};
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Marks a file as an expectation file. Followed by the format version and
/// the writer's text regime tag.
pub const MAGIC: &[u8; 8] = b"XFAILEXP";

/// The only layout this build reads or writes. Versions 1 to 3 were the line
/// oriented text format and the two headerless msgpack formats.
pub const FORMAT_VERSION: u32 = 4;

const HEADER_LEN: usize = MAGIC.len() + 4 + 1;
const LEGACY_TEXT_MAGIC: &[u8] = b"pytest-expect file v";
const LOAD_WARNING: &str = "W1";

/// The set of test ids expected to fail, plus the metadata of the document it
/// was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationSet {
  format_version: u32,
  writer_text_regime: TextRegime,
  identifiers: BTreeSet<NodeId>,
}

impl ExpectationSet {
  pub fn new(regime: TextRegime) -> Self {
    Self {
      format_version: FORMAT_VERSION,
      writer_text_regime: regime,
      identifiers: BTreeSet::new(),
    }
  }

  pub fn format_version(&self) -> u32 {
    self.format_version
  }

  pub fn writer_text_regime(&self) -> TextRegime {
    self.writer_text_regime
  }

  /// Adds `id`. Empty ids are never stored.
  pub fn insert(&mut self, id: NodeId) -> bool {
    if id.is_empty() {
      return false;
    }
    self.identifiers.insert(id)
  }

  pub fn remove(&mut self, id: &NodeId) -> bool {
    self.identifiers.remove(id)
  }

  pub fn contains(&self, id: &NodeId) -> bool {
    self.identifiers.contains(id)
  }

  pub fn len(&self) -> usize {
    self.identifiers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.identifiers.is_empty()
  }

  pub fn iter(&self) -> btree_set::Iter<'_, NodeId> {
    self.identifiers.iter()
  }

  pub fn identifiers(&self) -> &BTreeSet<NodeId> {
    &self.identifiers
  }
}

impl Extend<NodeId> for ExpectationSet {
  fn extend<T: IntoIterator<Item = NodeId>>(&mut self, iter: T) {
    for id in iter {
      self.insert(id);
    }
  }
}

impl<'a> IntoIterator for &'a ExpectationSet {
  type Item = &'a NodeId;
  type IntoIter = btree_set::Iter<'a, NodeId>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

#[derive(Debug, Serialize)]
struct DocumentRef<'a> {
  version: u32,
  writer_text_regime: TextRegime,
  expect_xfail: Vec<&'a NodeId>,
}

#[derive(Debug, Deserialize)]
struct Document {
  version: u32,
  writer_text_regime: TextRegime,
  expect_xfail: Vec<NodeId>,
}

/// The headerless msgpack formats all carried a top-level `version` key.
/// Only a map qualifies; a bare array is not a legacy document.
#[derive(Debug)]
struct LegacyProbe {
  version: u32,
}

impl<'de> Deserialize<'de> for LegacyProbe {
  fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    struct ProbeVisitor;

    impl<'de> Visitor<'de> for ProbeVisitor {
      type Value = LegacyProbe;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with a version key")
      }

      fn visit_map<A>(self, mut map: A) -> std::result::Result<LegacyProbe, A::Error>
      where
        A: MapAccess<'de>,
      {
        let mut version = None;
        while let Some(key) = map.next_key::<String>()? {
          if key == "version" {
            version = Some(map.next_value::<u32>()?);
          } else {
            map.next_value::<IgnoredAny>()?;
          }
        }
        let version = version.ok_or_else(|| de::Error::missing_field("version"))?;
        Ok(LegacyProbe { version })
      }
    }

    deserializer.deserialize_map(ProbeVisitor)
  }
}

/// Reads and writes the expectation file at one path.
#[derive(Debug, Clone)]
pub struct ExpectationStore {
  path: PathBuf,
  regime: TextRegime,
}

impl ExpectationStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      regime: TextRegime::native(),
    }
  }

  /// Reads and writes as if this process ran in `regime`.
  pub fn with_regime(mut self, regime: TextRegime) -> Self {
    self.regime = regime;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn regime(&self) -> TextRegime {
    self.regime
  }

  /// Loads the expectation set. A missing file is an empty set.
  ///
  /// When the file was written in a different text regime, each id's latin-1
  /// transcoding is added next to the stored form.
  pub fn load(&self) -> Result<ExpectationSet> {
    let bytes = match fs::read(&self.path) {
      Ok(bytes) => bytes,
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "no expectation file");
        return Ok(ExpectationSet::new(self.regime));
      }
      Err(source) => {
        return Err(ExpectError::Unreadable {
          path: self.path.clone(),
          source,
        })
      }
    };

    let set = self.decode(&bytes)?;
    debug!(
      path = %self.path.display(),
      writer = %set.writer_text_regime,
      count = set.len(),
      "loaded expectation file"
    );
    Ok(set)
  }

  /// Like [`load`](Self::load), but any failure becomes a single warning and
  /// an empty set.
  pub fn load_or_warn(&self, sink: &dyn WarningSink) -> ExpectationSet {
    match self.load() {
      Ok(set) => set,
      Err(err) => {
        sink.warn(Warning::new(
          LOAD_WARNING,
          format!("failed to load expectation file: {err}"),
        ));
        ExpectationSet::new(self.regime)
      }
    }
  }

  /// Replaces the file with `set` in the current format, ids sorted.
  ///
  /// The document is written to a temporary file beside the target and renamed
  /// over it, so readers never observe a partial file.
  pub fn save(&self, set: &ExpectationSet) -> Result<()> {
    let bytes = self.encode(set)?;
    let dir = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(|source| self.write_failure(source))?;
    if let Some(permissions) = self.target_permissions() {
      file
        .as_file()
        .set_permissions(permissions)
        .map_err(|source| self.write_failure(source))?;
    }
    file
      .write_all(&bytes)
      .map_err(|source| self.write_failure(source))?;
    file.flush().map_err(|source| self.write_failure(source))?;
    file
      .persist(&self.path)
      .map_err(|err| self.write_failure(err.error))?;

    debug!(
      path = %self.path.display(),
      count = set.len(),
      "saved expectation file"
    );
    Ok(())
  }

  /// Keeps the mode of the file being replaced. A new file is created
  /// world-readable rather than with the temp file's owner-only mode.
  fn target_permissions(&self) -> Option<fs::Permissions> {
    match fs::metadata(&self.path) {
      Ok(meta) => Some(meta.permissions()),
      Err(_) => new_file_permissions(),
    }
  }

  fn encode(&self, set: &ExpectationSet) -> Result<Vec<u8>> {
    let document = DocumentRef {
      version: FORMAT_VERSION,
      writer_text_regime: self.regime,
      expect_xfail: set.iter().collect(),
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + set.len() * 32);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    bytes.push(self.regime.tag());
    rmp_serde::encode::write_named(&mut bytes, &document).map_err(|err| ExpectError::Encode {
      path: self.path.clone(),
      reason: err.to_string(),
    })?;
    Ok(bytes)
  }

  fn decode(&self, bytes: &[u8]) -> Result<ExpectationSet> {
    if let Some(rest) = bytes.strip_prefix(LEGACY_TEXT_MAGIC) {
      let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
      let found = std::str::from_utf8(&rest[..line_end])
        .ok()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .ok_or_else(|| self.corrupt("malformed text header"))?;
      return Err(self.unsupported(found, true));
    }

    if !bytes.starts_with(MAGIC) {
      if let Ok(probe) = rmp_serde::from_slice::<LegacyProbe>(bytes) {
        return Err(self.unsupported(probe.version, true));
      }
      return Err(self.corrupt("missing file marker"));
    }

    if bytes.len() < HEADER_LEN {
      return Err(self.corrupt("truncated header"));
    }

    let (header, body) = bytes.split_at(HEADER_LEN);
    let version = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    if version != FORMAT_VERSION {
      return Err(self.unsupported(version, false));
    }

    let writer = TextRegime::from_tag(header[12])
      .ok_or_else(|| self.corrupt(format!("unknown text regime tag {}", header[12])))?;

    let mut cursor = Cursor::new(body);
    let document = Document::deserialize(&mut rmp_serde::Deserializer::new(&mut cursor))
      .map_err(|err| self.corrupt(format!("undecodable body: {err}")))?;
    let trailing = body.len() as u64 - cursor.position();
    if trailing != 0 {
      return Err(self.corrupt(format!("{trailing} trailing byte(s) after body")));
    }
    if document.version != version {
      return Err(self.corrupt(format!(
        "body version {} does not match header version {version}",
        document.version
      )));
    }
    if document.writer_text_regime != writer {
      return Err(self.corrupt(format!(
        "body text regime {} does not match header text regime {writer}",
        document.writer_text_regime
      )));
    }

    let mut set = ExpectationSet {
      format_version: version,
      writer_text_regime: writer,
      identifiers: BTreeSet::new(),
    };
    for id in document.expect_xfail {
      if id.is_empty() {
        continue;
      }
      if let Some(alternate) = bridge(&id, writer, self.regime) {
        set.insert(alternate);
      }
      set.insert(id);
    }

    Ok(set)
  }

  fn corrupt(&self, reason: impl Into<String>) -> ExpectError {
    ExpectError::CorruptFile {
      path: self.path.clone(),
      reason: reason.into(),
    }
  }

  fn unsupported(&self, found: u32, legacy: bool) -> ExpectError {
    ExpectError::UnsupportedVersion {
      path: self.path.clone(),
      found,
      supported: FORMAT_VERSION,
      legacy,
    }
  }

  fn write_failure(&self, source: io::Error) -> ExpectError {
    ExpectError::WriteFailure {
      path: self.path.clone(),
      source,
    }
  }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
  use std::os::unix::fs::PermissionsExt;
  Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
  None
}
