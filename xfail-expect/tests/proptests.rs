use proptest::prelude::*;
use std::collections::BTreeSet;
use tempfile::tempdir;
use xfail_expect::{ExpectationSet, ExpectationStore, NodeId, TextRegime};

fn node_ids() -> impl Strategy<Value = BTreeSet<String>> {
  prop::collection::btree_set("\\PC{1,24}", 0..16)
}

fn text_regime() -> impl Strategy<Value = TextRegime> {
  prop_oneof![Just(TextRegime::Bytes), Just(TextRegime::Unicode)]
}

fn build(regime: TextRegime, raw: &BTreeSet<String>) -> ExpectationSet {
  let mut set = ExpectationSet::new(regime);
  set.extend(raw.iter().map(|id| regime.node_id(id)));
  set
}

proptest! {
  #[test]
  fn save_then_load_round_trips(raw in node_ids(), regime in text_regime()) {
    let dir = tempdir().unwrap();
    let store = ExpectationStore::new(dir.path().join(".xfail-expect")).with_regime(regime);
    let original = build(regime, &raw);

    store.save(&original).unwrap();
    let loaded = store.load().unwrap();
    prop_assert_eq!(loaded, original);
  }

  #[test]
  fn cross_regime_load_is_a_superset(raw in node_ids(), writer in text_regime()) {
    let reader = match writer {
      TextRegime::Bytes => TextRegime::Unicode,
      TextRegime::Unicode => TextRegime::Bytes,
    };
    let dir = tempdir().unwrap();
    let path = dir.path().join(".xfail-expect");
    let original = build(writer, &raw);
    ExpectationStore::new(&path).with_regime(writer).save(&original).unwrap();

    let loaded = ExpectationStore::new(&path).with_regime(reader).load().unwrap();
    prop_assert!(loaded.identifiers().is_superset(original.identifiers()));
    prop_assert!(loaded.len() <= original.len() * 2);
  }

  #[test]
  fn ascii_ids_match_in_both_regimes(raw in prop::collection::btree_set("[a-z_./:]{1,16}", 1..8)) {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".xfail-expect");
    ExpectationStore::new(&path)
      .with_regime(TextRegime::Bytes)
      .save(&build(TextRegime::Bytes, &raw))
      .unwrap();

    let loaded = ExpectationStore::new(&path).with_regime(TextRegime::Unicode).load().unwrap();
    for id in &raw {
      prop_assert!(loaded.contains(&NodeId::from(id.as_str())));
    }
  }
}
