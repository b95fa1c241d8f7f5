use biotag::{Alphabet, Error, FeatureConfig, ModelKind, Sentence, Tagger, TrainOpts, Unit};

fn labeled(tokens: &[(&str, &str)]) -> Sentence {
    let mut s = Sentence::default();
    let mut begin = 0;
    for (text, label) in tokens {
        s.push(Unit::with_label(begin, begin + text.len(), text, label));
        begin += text.len() + 1;
    }
    s
}

fn trained(mode: ModelKind) -> Tagger {
    let sentences = vec![
        labeled(&[("IL-2", "GENE"), ("binds", "O"), ("cells", "O")]),
        labeled(&[("the", "O"), ("TNF", "GENE"), ("receptor", "O")]),
    ];
    let mut config = FeatureConfig::new();
    config.set("suffix_sizes", "2,3");
    config.set("offset_conjunctions", "(-1) (1)");
    Tagger::train(
        &sentences,
        Alphabet::new(),
        config,
        &TrainOpts {
            mode,
            ..Default::default()
        },
    )
    .unwrap()
}

fn decode_labels(tagger: &Tagger, tokens: &[&str]) -> Vec<String> {
    tagger
        .predict(Sentence::from_tokens(tokens), true)
        .unwrap()
        .units()
        .iter()
        .map(|u| u.label().unwrap().to_string())
        .collect()
}

#[test]
fn test_round_trip_chain() {
    let tagger = trained(ModelKind::Chain);
    let mut buf = Vec::new();
    tagger.save(&mut buf).unwrap();
    let restored = Tagger::load(buf.as_slice()).unwrap();

    assert_eq!(restored.kind(), ModelKind::Chain);
    assert_eq!(restored.config(), tagger.config());
    let tokens = ["TNF", "binds", "cells"];
    assert_eq!(decode_labels(&restored, &tokens), decode_labels(&tagger, &tokens));
}

#[test]
fn test_round_trip_per_unit() {
    let tagger = trained(ModelKind::PerUnit);
    let mut buf = Vec::new();
    tagger.save(&mut buf).unwrap();
    let restored = Tagger::load(buf.as_slice()).unwrap();

    assert_eq!(restored.kind(), ModelKind::PerUnit);
    let tokens = ["IL-2", "binds"];
    assert_eq!(decode_labels(&restored, &tokens), decode_labels(&tagger, &tokens));
}

#[test]
fn test_restored_confidences_match() {
    let tagger = trained(ModelKind::Chain);
    let mut buf = Vec::new();
    tagger.save(&mut buf).unwrap();
    let restored = Tagger::load(buf.as_slice()).unwrap();

    let tokens = ["IL-2", "binds", "TNF"];
    let a = tagger.predict(Sentence::from_tokens(&tokens), true).unwrap();
    let b = restored.predict(Sentence::from_tokens(&tokens), true).unwrap();
    for (ua, ub) in a.units().iter().zip(b.units()) {
        assert_eq!(ua.label(), ub.label());
        match (ua.confidence(), ub.confidence()) {
            (Some(x), Some(y)) => assert!((x - y).abs() < 1e-12),
            (None, None) => {}
            other => panic!("confidence mismatch: {other:?}"),
        }
    }
}

#[test]
fn test_load_garbage_does_not_panic() {
    for bytes in [&b""[..], b"abcdefg", b"bTAG", b"bTAG\x01\x00\x00\x00junk"] {
        match Tagger::load(bytes) {
            Err(Error::InvalidModel(..)) => {}
            Err(other) => panic!("expected InvalidModel, got {other}"),
            Ok(_) => panic!("garbage loaded as a model"),
        }
    }
}

#[test]
fn test_wrong_version_is_rejected() {
    let tagger = trained(ModelKind::Chain);
    let mut buf = Vec::new();
    tagger.save(&mut buf).unwrap();
    buf[4] = 99; // clobber the version field
    match Tagger::load(buf.as_slice()) {
        Err(Error::InvalidModel(msg)) => assert!(msg.contains("version")),
        Err(other) => panic!("expected InvalidModel, got {other}"),
        Ok(_) => panic!("clobbered version loaded anyway"),
    }
}

#[test]
fn test_divergent_config_is_rejected() {
    let tagger = trained(ModelKind::Chain);
    let mut buf = Vec::new();
    tagger.save(&mut buf).unwrap();
    let restored = Tagger::load(buf.as_slice()).unwrap();

    assert!(restored.ensure_config(tagger.config()).is_ok());
    let mut divergent = tagger.config().clone();
    divergent.set("token_ngrams", "2");
    assert!(matches!(
        restored.ensure_config(&divergent),
        Err(Error::ConfigMismatch)
    ));
}
